// Throw grading: heuristic grade first, advisor upgrade second.

use serde::{Deserialize, Serialize};

use crate::advisor::{Advisor, ChatMessage};
use crate::metrics;

pub const GRADE_TEMPERATURE: f32 = 0.2;

pub const GRADES: [&str; 7] = [
    "Great",
    "Good",
    "OK",
    "Risky",
    "Late",
    "Missed hot",
    "Wrong read",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    pub concept_id: String,
    pub coverage: String,
    pub target: String,
    /// Release point as a fraction of the play clock, 0..1.
    pub time: f64,
    pub formation: Option<String>,
    pub play_id: Option<i64>,
    pub window_score: Option<f64>,
    pub nearest_sep_yds: Option<f64>,
    pub nearest_defender: Option<String>,
    pub hold_ms: Option<f64>,
    pub throw_area: Option<String>,
    pub target_break_ms: Option<f64>,
    pub held_vs_break_ms: Option<f64>,
    pub first_open_id: Option<String>,
    pub first_open_ms: Option<f64>,
    pub catch_window_score: Option<f64>,
    pub catch_sep_yds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub grade: String,
    pub rationale: String,
    pub next_read: String,
    pub coaching_tip: String,
}

impl Grade {
    fn is_valid(&self) -> bool {
        GRADES.contains(&self.grade.as_str()) && !self.rationale.trim().is_empty()
    }

    /// Grade returned when the request body cannot be read.
    pub fn grader_error(msg: &str) -> Self {
        Self {
            grade: "OK".into(),
            rationale: format!("Grader error: {msg}"),
            next_read: "Retry the rep.".into(),
            coaching_tip: "Reset & breathe.".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingHint {
    Early,
    OnTime,
    Late,
    Unknown,
}

impl TimingHint {
    pub fn from_held_vs_break(held: Option<f64>) -> Self {
        match held {
            None => TimingHint::Unknown,
            Some(h) if h < -180.0 => TimingHint::Early,
            Some(h) if h > 220.0 => TimingHint::Late,
            Some(_) => TimingHint::OnTime,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimingHint::Early => "early",
            TimingHint::OnTime => "on-time",
            TimingHint::Late => "late",
            TimingHint::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowHint {
    VeryOpen,
    Open,
    Tight,
    Covered,
    Unknown,
}

impl WindowHint {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            None => WindowHint::Unknown,
            Some(s) if s >= 0.75 => WindowHint::VeryOpen,
            Some(s) if s >= 0.6 => WindowHint::Open,
            Some(s) if s >= 0.45 => WindowHint::Tight,
            Some(_) => WindowHint::Covered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowHint::VeryOpen => "very-open",
            WindowHint::Open => "open",
            WindowHint::Tight => "tight",
            WindowHint::Covered => "covered",
            WindowHint::Unknown => "unknown",
        }
    }
}

/// Heuristic grade from timing and window alone.
pub fn fallback_grade(req: &GradeRequest) -> Grade {
    let timing = TimingHint::from_held_vs_break(req.held_vs_break_ms);
    let window = WindowHint::from_score(req.window_score);

    let grade = if timing == TimingHint::Late {
        "Late"
    } else if window == WindowHint::Covered {
        "Risky"
    } else {
        "OK"
    };

    let rationale = if timing != TimingHint::Unknown {
        format!("Timing {}.", timing.as_str())
    } else {
        format!("Window {}.", window.as_str())
    };

    let next_read = match &req.first_open_id {
        Some(id) => format!("Find {id} earlier."),
        None => "Reset to first in progression.".to_string(),
    };

    let coaching_tip = if timing == TimingHint::Late {
        "Speed up progression; throw on the break."
    } else if window == WindowHint::Tight {
        "Keep ball safe; find earlier window."
    } else {
        "Keep base quiet; quick eyes."
    };

    Grade {
        grade: grade.to_string(),
        rationale,
        next_read,
        coaching_tip: coaching_tip.to_string(),
    }
}

fn or_na<T: ToString>(v: &Option<T>) -> String {
    v.as_ref()
        .map(|x| x.to_string())
        .unwrap_or_else(|| "(n/a)".to_string())
}

pub fn grade_prompt(req: &GradeRequest) -> String {
    let timing = TimingHint::from_held_vs_break(req.held_vs_break_ms);
    let window = WindowHint::from_score(req.window_score);
    let catch_window = req
        .catch_window_score
        .map(|s| format!("{s:.2}"))
        .unwrap_or_else(|| "(n/a)".to_string());

    format!(
        "You are grading a QB decision in a play simulator.\n\n\
         CONCEPT: {concept}\n\
         COVERAGE: {coverage}\n\
         PLAY TIME: {time:.2} (0..1)\n\
         TARGET CHOSEN: {target}\n\
         PLAY ID: {play_id}\n\
         FORMATION: {formation}\n\n\
         THROW WINDOW:\n\
         windowScore: {window_score}\n\
         nearestDefender: {nearest_defender}\n\
         nearestSepYds: {nearest_sep}\n\
         holdMs: {hold_ms}\n\
         throwArea: {throw_area}\n\
         targetBreakMs: {target_break}\n\
         heldVsBreakMs: {held}\n\
         timingHint: {timing}\n\
         windowHint: {window}\n\
         firstOpen: {first_open} @ {first_open_ms}ms\n\
         opennessAtCatch: {catch_window} ({catch_sep} yds)\n\n\
         Your grading rubric:\n\
         - Great: on-time rhythm/anticipation, window open enough, correct read progression, safe ball.\n\
         - Good: adequate timing, minor hitch but ball out before window closes.\n\
         - OK: acceptable but could be faster/better window.\n\
         - Risky: window tight/closing, defender proximity high.\n\
         - Late: significantly after break; throws into closing window.\n\
         - Missed hot: pressure/quick answer ignored.\n\
         - Wrong read: threw against progression or leverage.\n\n\
         Return STRICT JSON ONLY (no markdown/code fences) with keys:\n\
         {{\"grade\": \"Great|Good|OK|Risky|Late|Missed hot|Wrong read\",\"rationale\": \"<=120 chars\",\"nextRead\": \"<=100 chars\",\"coachingTip\": \"<=100 chars\"}}",
        concept = req.concept_id,
        coverage = req.coverage,
        time = req.time,
        target = req.target,
        play_id = or_na(&req.play_id),
        formation = or_na(&req.formation),
        window_score = or_na(&req.window_score),
        nearest_defender = or_na(&req.nearest_defender),
        nearest_sep = or_na(&req.nearest_sep_yds),
        hold_ms = or_na(&req.hold_ms),
        throw_area = or_na(&req.throw_area),
        target_break = or_na(&req.target_break_ms),
        held = or_na(&req.held_vs_break_ms),
        timing = timing.as_str(),
        window = window.as_str(),
        first_open = or_na(&req.first_open_id),
        first_open_ms = or_na(&req.first_open_ms),
        catch_window = catch_window,
        catch_sep = or_na(&req.catch_sep_yds),
    )
}

/// Parse model output as a grade. Accepts bare JSON or JSON embedded in
/// surrounding text.
pub fn parse_grade(text: &str) -> Option<Grade> {
    let text = text.trim();
    let parsed = serde_json::from_str::<Grade>(text).ok().or_else(|| {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<Grade>(&text[start..=end]).ok()
    })?;
    parsed.is_valid().then_some(parsed)
}

/// Grade a throw. The heuristic grade is always computed; the advisor can
/// only replace it with a valid grade.
pub async fn grade(advisor: Option<&Advisor>, req: &GradeRequest) -> Grade {
    let fallback = fallback_grade(req);

    let Some(advisor) = advisor else {
        metrics::GRADES_TOTAL.with_label_values(&["fallback"]).inc();
        return fallback;
    };

    let messages = [
        ChatMessage::system("You are an elite QB coach. Be precise, concise, and actionable."),
        ChatMessage::user(grade_prompt(req)),
    ];
    match advisor.complete(&messages, GRADE_TEMPERATURE, true).await {
        Ok(text) => match parse_grade(&text) {
            Some(g) => {
                metrics::GRADES_TOTAL.with_label_values(&["advisor"]).inc();
                g
            }
            None => {
                tracing::warn!("Advisor grade was not usable, using heuristic grade");
                metrics::GRADES_TOTAL.with_label_values(&["fallback"]).inc();
                fallback
            }
        },
        Err(e) => {
            tracing::warn!("Advisor unavailable for grading: {e}");
            metrics::GRADES_TOTAL.with_label_values(&["fallback"]).inc();
            fallback
        }
    }
}
