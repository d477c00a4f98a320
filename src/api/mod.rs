// HTTP API routes (coaching decisions, grading, persistence, telemetry).

pub mod decision;
pub mod memory;
pub mod telemetry;

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::advisor::{Advisor, AdvisorError};
use crate::config::Config;
use crate::db::Database;
use crate::metrics;
use crate::webhook::Webhook;

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when no store is configured.
    pub store: Option<Arc<Database>>,
    /// `None` when no advisor credential is configured.
    pub advisor: Option<Advisor>,
    pub webhook: Webhook,
}

impl AppState {
    pub fn new(config: Config, store: Option<Arc<Database>>) -> Result<Self, AdvisorError> {
        let advisor = Advisor::from_config(&config.advisor)?;
        let webhook = Webhook::new(config.log_webhook_url.clone())?;
        Ok(Self {
            config: Arc::new(config),
            store,
            advisor,
            webhook,
        })
    }
}

// ── Response helpers ──────────────────────────────────────────────────

/// 200 with a JSON body.
fn ok_json(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// `{ ok: false, error }` with status 200.
fn ok_false(msg: impl Display) -> Response {
    ok_json(json!({ "ok": false, "error": msg.to_string() }))
}

fn store_error(e: sqlx::Error) -> Response {
    tracing::error!("Store error: {e}");
    ok_false(e)
}

/// Decode a JSON body, answering `{ ok: false, error }` when it does not.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("Malformed request body: {e}");
        ok_false(e)
    })
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        .route("/api/_diag", get(diag))
        // Coaching
        .route("/api/football-chat", post(decision::football_chat))
        .route("/api/football-grade", post(decision::football_grade))
        // Sessions
        .route("/api/session/save", post(memory::session_save))
        .route("/api/session/load", post(memory::session_load))
        // Routines
        .route("/api/routine/save", post(memory::routine_save))
        .route("/api/routine/list", post(memory::routine_list))
        .route("/api/routine/rename", post(memory::routine_rename))
        .route("/api/routine/delete", post(memory::routine_delete))
        // Skills
        .route("/api/skills/track", post(memory::skills_track))
        .route("/api/skills/summary", post(memory::skills_summary))
        .route("/api/adaptive/next", post(memory::adaptive_next))
        // Telemetry
        .route("/api/snap-log", post(telemetry::snap_log))
        .route("/api/throw-log", post(telemetry::throw_log))
        .route("/api/metrics/throw-summary", get(telemetry::throw_summary))
        .with_state(state)
        .layer(middleware::from_fn(track_requests))
}

/// Label for requests that hit no route.
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Count and time every request by its route template.
async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());
    let started = Instant::now();

    let response = next.run(req).await;

    metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .observe(started.elapsed().as_secs_f64());
    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    response
}

// ── Service handlers ──────────────────────────────────────────────────

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "playbook-backend" }))
}

async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

async fn diag(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "hasKey": state.config.advisor.has_key(),
        "model": state.advisor.as_ref().map(|a| a.model().to_string()),
        "storeConfigured": state.store.is_some(),
        "webhookConfigured": state.webhook.is_configured(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
