// Decision orchestration: rule fallback first, advisor upgrade second.

use crate::advisor::Advisor;
use crate::metrics;
use crate::rules::{self, CoachingDecision, CoachingRequest};

/// Where a decision string came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Rules,
    Advisor,
    ParseError,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Rules => "rules",
            DecisionSource::Advisor => "advisor",
            DecisionSource::ParseError => "parse_error",
        }
    }
}

/// Decode a raw request body and produce a decision. Never fails: a body
/// that does not decode yields a `Rules: ` diagnostic string.
pub async fn decide_from_body(
    advisor: Option<&Advisor>,
    body: &[u8],
) -> (CoachingDecision, DecisionSource) {
    let req: CoachingRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!("Malformed coaching request: {e}");
            return record(
                CoachingDecision::new(format!("Rules: {e}")),
                DecisionSource::ParseError,
            );
        }
    };
    decide(advisor, &req).await
}

/// Compute the rule decision, then try the advisor if one is configured.
pub async fn decide(
    advisor: Option<&Advisor>,
    req: &CoachingRequest,
) -> (CoachingDecision, DecisionSource) {
    let fallback = rules::decide(req);

    let Some(advisor) = advisor else {
        return record(fallback, DecisionSource::Rules);
    };

    match advisor.decide(req).await {
        Ok(text) => record(CoachingDecision::new(text), DecisionSource::Advisor),
        Err(e) => {
            tracing::warn!(
                coverage = %req.coverage,
                "Advisor unavailable, using rule decision: {e}"
            );
            record(fallback, DecisionSource::Rules)
        }
    }
}

fn record(
    decision: CoachingDecision,
    source: DecisionSource,
) -> (CoachingDecision, DecisionSource) {
    metrics::DECISIONS_TOTAL
        .with_label_values(&[source.as_str()])
        .inc();
    (decision, source)
}
