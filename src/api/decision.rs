// Coaching decision and throw grading handlers. Both always answer 200.

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};

use super::AppState;
use crate::coach;
use crate::grading::{self, Grade, GradeRequest};
use crate::rules::CoachingDecision;

pub async fn football_chat(State(state): State<AppState>, body: Bytes) -> Json<CoachingDecision> {
    let (decision, source) = coach::decide_from_body(state.advisor.as_ref(), &body).await;
    tracing::debug!(source = source.as_str(), "Coaching decision served");
    Json(decision)
}

pub async fn football_grade(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let grade = match serde_json::from_slice::<GradeRequest>(&body) {
        Ok(req) => grading::grade(state.advisor.as_ref(), &req).await,
        Err(e) => {
            tracing::warn!("Malformed grade request: {e}");
            Grade::grader_error(&e.to_string())
        }
    };
    ([(header::CACHE_CONTROL, "no-store")], Json(grade))
}
