// Rule engine: deterministic coaching decisions for the Smash concept.

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit JSON `null` like a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Incoming coaching question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingRequest {
    pub concept_id: String,
    pub coverage: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rotate_strong: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nickel_blitz: bool,
}

/// A single coaching sentence, the body of every decision response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachingDecision {
    pub decision: String,
}

impl CoachingDecision {
    pub fn new(decision: impl Into<String>) -> Self {
        Self {
            decision: decision.into(),
        }
    }
}

pub const NICKEL_BLITZ_HOT: &str = "Hot: Replace nickel blitz with quick hitch to #2 (H).";

pub const ROTATE_STRONG_ALERT: &str = "MOF safety rotating strong → Alert glance/now weak to X; else work hitch (H) if corner sinks, then corner (Z).";

/// Which situational read applies. Order of the variants is the precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    /// Nickel pressure: throw hot to #2.
    HotReplace,
    /// Middle safety rotates strong: alert weak, then the base read.
    RotationAlert,
    /// Cloud corner / flat defender read.
    BaseSmash,
}

impl Read {
    pub fn select(req: &CoachingRequest) -> Self {
        if req.nickel_blitz {
            Read::HotReplace
        } else if req.rotate_strong {
            Read::RotationAlert
        } else {
            Read::BaseSmash
        }
    }
}

/// Derive the rule-based decision. The coverage label is used verbatim.
pub fn decide(req: &CoachingRequest) -> CoachingDecision {
    let text = match Read::select(req) {
        Read::HotReplace => NICKEL_BLITZ_HOT.to_string(),
        Read::RotationAlert => ROTATE_STRONG_ALERT.to_string(),
        Read::BaseSmash => format!(
            "Base Smash vs {}: If cloud corner sinks with #1, throw hitch (H) now. If flat widens with hitch, throw corner (Z).",
            req.coverage
        ),
    };
    CoachingDecision::new(text)
}
