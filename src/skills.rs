// Skill tracking heuristics and drill recommendations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How many recent skill rows feed a summary.
pub const SUMMARY_WINDOW: i64 = 200;

/// Throw details the skill heuristics look at.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowSignals {
    pub window_score: Option<f64>,
    pub catch_window_score: Option<f64>,
    pub held_vs_break_ms: Option<f64>,
    pub first_open_id: Option<String>,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDelta {
    pub skill: String,
    pub delta: i32,
    pub reason: String,
}

impl SkillDelta {
    fn new(skill: &str, delta: i32, reason: &str) -> Self {
        Self {
            skill: skill.to_string(),
            delta,
            reason: reason.to_string(),
        }
    }
}

/// Score one throw against the tracked skills.
pub fn deltas_for_throw(throw: &ThrowSignals, coverage: Option<&str>) -> Vec<SkillDelta> {
    let mut deltas = Vec::new();

    if let Some(w) = throw.catch_window_score.or(throw.window_score) {
        if w >= 0.75 {
            deltas.push(SkillDelta::new("zone_window_find", 1, "Found good window at catch"));
        }
        if w < 0.45 {
            deltas.push(SkillDelta::new("zone_window_find", -1, "Tight window at catch"));
        }
    }

    if let Some(held) = throw.held_vs_break_ms {
        if held > 200.0 {
            deltas.push(SkillDelta::new("timing_rhythm", -1, "Late vs break timing"));
        }
        if held < -150.0 {
            deltas.push(SkillDelta::new("timing_rhythm", -1, "Too early vs break"));
        }
        if held.abs() <= 160.0 {
            deltas.push(SkillDelta::new("timing_rhythm", 1, "On-time rhythm"));
        }
    }

    if let (Some(first_open), Some(target)) = (&throw.first_open_id, &throw.target) {
        if first_open == target {
            deltas.push(SkillDelta::new("first_open_eye_speed", 1, "Hit first-open"));
        } else {
            deltas.push(SkillDelta::new("first_open_eye_speed", -1, "Missed first-open"));
        }
    }

    if coverage.is_some_and(|c| c.contains("C3")) {
        deltas.push(SkillDelta::new("c3_rotation_id", 0, "Exposure to C3 rep"));
    }

    deltas
}

/// Sum stored skill rows (`{skill, delta, ...}` blobs) per skill.
pub fn aggregate(rows: &[Value]) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for row in rows {
        let skill = match row.get("skill") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => continue,
        };
        let delta = row
            .get("delta")
            .and_then(|d| d.as_f64())
            .map(|d| d as i64)
            .unwrap_or(0);
        *totals.entry(skill).or_insert(0) += delta;
    }
    totals
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub skill: String,
    pub coverage: String,
    pub reason: String,
}

pub fn recommend_for_skill(skill: &str) -> Recommendation {
    let (coverage, reason) = match skill {
        "timing_rhythm" => ("C3", "Throw on rhythm vs curl/flat spacing (stick/flat timing)."),
        "first_open_eye_speed" => ("C2", "Two-high forces decisive first-open throws on rhythm."),
        "zone_window_find" => ("TAMPA2", "Work curl/hook windows and sit in space."),
        "c3_rotation_id" => ("C3", "Identify SKY/BUZZ/CLOUD rotation pre/post."),
        "banjo_match_awareness" => (
            "C9",
            "Match/banjo reps vs trips/bunch looks (practice switches).",
        ),
        "hot_rules_pressure" => ("C3", "Practice fire-zone hot/replace vs 3-under."),
        "press_release_plan" => ("C1", "Boundary press reps; plan releases; timing adjustments."),
        _ => ("C3", "Balanced drill to reinforce reads and timing."),
    };
    Recommendation {
        skill: skill.to_string(),
        coverage: coverage.to_string(),
        reason: reason.to_string(),
    }
}

/// Recommendations for the three weakest skills, lowest total first.
/// Ties keep alphabetical order.
pub fn recommendations(totals: &BTreeMap<String, i64>) -> Vec<Recommendation> {
    let mut order: Vec<(&String, &i64)> = totals.iter().collect();
    order.sort_by_key(|(_, total)| **total);
    order
        .into_iter()
        .take(3)
        .map(|(skill, _)| recommend_for_skill(skill))
        .collect()
}

// ── Adaptive drill ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Motion {
    pub rid: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub dir: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FireZone {
    pub on: bool,
    pub preset: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Drill {
    pub suggested_coverage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_formation: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motions: Option<Vec<Motion>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fire_zone: Option<FireZone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub recs: Vec<Recommendation>,
}

/// Shape the next drill around the weakest skill. Coverage comes from the
/// top recommendation, then the requested coverage, then `C3`.
pub fn next_drill(recs: Vec<Recommendation>, requested_coverage: Option<&str>) -> Drill {
    let top = recs.first().cloned();
    let mut drill = Drill {
        suggested_coverage: top
            .as_ref()
            .map(|r| r.coverage.clone())
            .or_else(|| requested_coverage.map(str::to_string))
            .unwrap_or_else(|| "C3".to_string()),
        suggested_formation: None,
        motions: None,
        fire_zone: None,
        reason: top.as_ref().map(|r| r.reason.clone()),
        recs,
    };

    let weakest = top.as_ref().map(|r| r.skill.as_str()).unwrap_or("");
    match weakest {
        "banjo_match_awareness" => {
            drill.suggested_formation = Some("BUNCH_LEFT");
            drill.motions = Some(vec![Motion {
                rid: "SLOT",
                kind: "short",
                dir: "left",
            }]);
        }
        "press_release_plan" | "leverage_read_in_out" => {
            drill.suggested_formation = Some("DOUBLES");
        }
        "motion_usage" | "c3_rotation_id" => {
            drill.suggested_formation = Some("TRIPS_RIGHT");
            drill.motions = Some(vec![Motion {
                rid: "SLOT",
                kind: "jet",
                dir: "right",
            }]);
        }
        "hot_rules_pressure" => {
            drill.suggested_coverage = "C3".to_string();
            drill.fire_zone = Some(FireZone {
                on: true,
                preset: "NICKEL",
            });
            drill.suggested_formation = Some("TRIPS_RIGHT");
        }
        "mof_identification" => {
            drill.suggested_coverage = "C6".to_string();
            drill.suggested_formation = Some("TRIPS_RIGHT");
            drill.motions = Some(vec![Motion {
                rid: "SLOT",
                kind: "short",
                dir: "right",
            }]);
        }
        _ => {}
    }
    drill
}
