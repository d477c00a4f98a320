// Snap/throw telemetry and the aggregate throw-metrics query.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ok_json, parse_body, AppState};
use crate::db::{MemoryKind, ThrowMetricsFilter, ThrowRecord};
use crate::identity::HeaderUser;
use crate::metrics;
use crate::webhook;

pub const DEFAULT_SUMMARY_LIMIT: i64 = 20;
pub const MAX_SUMMARY_LIMIT: i64 = 500;

fn str_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn num_field(body: &Value, key: &str) -> Option<f64> {
    body.get(key).and_then(Value::as_f64)
}

/// Present, non-null values are copied as-is.
fn raw_field(body: &Value, key: &str) -> Value {
    body.get(key).cloned().unwrap_or(Value::Null)
}

/// Split a `"<horiz>_<band>"` throw area such as `"L_SHORT"`.
pub fn split_area(area: &str) -> (Option<String>, Option<String>) {
    match area.split_once('_') {
        Some((h, b)) => (
            Some(h.to_string()),
            Some(b.split('_').next().unwrap_or(b).to_string()),
        ),
        None => (None, None),
    }
}

/// Build the stored snap row from a logged snapshot.
pub fn snap_row(body: &Value, user_id: Option<&str>) -> Value {
    json!({
        "user_id": user_id,
        "concept_id": raw_field(body, "conceptId"),
        "coverage": raw_field(body, "coverage"),
        "formation": raw_field(body, "formation"),
        "play_id": raw_field(body, "playId"),
        "rng_seed": raw_field(body, "rngSeed"),
        "c3_rotation": raw_field(body, "c3Rotation"),
        "press": raw_field(body, "press"),
        "roles": raw_field(body, "roles"),
        "leverage": raw_field(body, "leverage"),
        "created_at": chrono::Utc::now().to_rfc3339(),
    })
}

/// Build a throw row from a logged throw and request headers.
pub fn throw_record(body: &Value, headers: &HeaderMap, user_id: Option<String>) -> ThrowRecord {
    let throw_area = str_field(body, "throwArea");
    let (area_horiz, area_band) = throw_area
        .as_deref()
        .map(split_area)
        .unwrap_or((None, None));
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    ThrowRecord {
        user_id,
        concept_id: str_field(body, "conceptId"),
        coverage: str_field(body, "coverage"),
        formation: str_field(body, "formation"),
        target: str_field(body, "target"),
        time_frac: num_field(body, "time"),
        play_id: body.get("playId").and_then(Value::as_i64),
        hold_ms: num_field(body, "holdMs"),
        throw_area,
        area_horiz,
        area_band,
        depth_yds: num_field(body, "depthYds"),
        window_score: num_field(body, "windowScore"),
        nearest_sep_yds: num_field(body, "nearestSepYds"),
        grade: str_field(body, "grade"),
        user_agent: header_str(header::USER_AGENT),
        referer: header_str(header::REFERER),
        extra: body.get("extra").filter(|v| !v.is_null()).cloned(),
    }
}

fn user_from_body(body: &Value) -> Option<&str> {
    body.get("userId").and_then(Value::as_str)
}

/// Forward in the background so the caller never waits on the webhook.
fn spawn_forward(state: &AppState, label: &'static str, payload: Value) {
    if !state.webhook.is_configured() {
        return;
    }
    let hook = state.webhook.clone();
    tokio::spawn(async move {
        hook.forward(label, &payload).await;
    });
}

pub async fn snap_log(State(state): State<AppState>, user: HeaderUser, body: Bytes) -> Response {
    let body: Value = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    tracing::info!(payload = %body, "Snap logged");
    metrics::TELEMETRY_EVENTS_TOTAL
        .with_label_values(&["snap"])
        .inc();

    spawn_forward(&state, "snap-log", webhook::tagged("snap", &body));

    if let Some(store) = &state.store {
        let user_id = user.resolve(user_from_body(&body));
        let row = snap_row(&body, user_id.as_deref());
        if let Err(e) = store
            .insert_memory(user_id.as_deref(), MemoryKind::Snap, &row)
            .await
        {
            tracing::warn!("Snap insert failed: {e}");
        }
    }

    ok_json(json!({ "ok": true }))
}

pub async fn throw_log(
    State(state): State<AppState>,
    user: HeaderUser,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    tracing::info!(payload = %body, "Throw logged");
    metrics::TELEMETRY_EVENTS_TOTAL
        .with_label_values(&["throw"])
        .inc();

    spawn_forward(&state, "throw-log", body.clone());

    if let Some(store) = &state.store {
        let user_id = user.resolve(user_from_body(&body));
        let record = throw_record(&body, &headers, user_id);
        if let Err(e) = store.insert_throw(&record).await {
            tracing::warn!("Throw insert failed: {e}");
        }
    }

    ok_json(json!({ "ok": true }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrowSummaryParams {
    pub coverage: Option<String>,
    pub concept_id: Option<String>,
    pub area_horiz: Option<String>,
    pub area_band: Option<String>,
    pub user_id: Option<String>,
    pub limit: Option<String>,
}

/// Parse the `limit` query value: non-numeric falls back to the default,
/// numbers are truncated and clamped.
pub fn summary_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| (v as i64).clamp(1, MAX_SUMMARY_LIMIT))
        .unwrap_or(DEFAULT_SUMMARY_LIMIT)
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

impl ThrowSummaryParams {
    pub fn into_filter(self) -> ThrowMetricsFilter {
        let limit = summary_limit(self.limit.as_deref());
        ThrowMetricsFilter {
            coverage: non_empty(self.coverage),
            concept_id: non_empty(self.concept_id),
            area_horiz: non_empty(self.area_horiz),
            area_band: non_empty(self.area_band),
            user_id: non_empty(self.user_id),
            limit,
        }
    }
}

/// The one endpoint that reports a store failure with 500: it has no
/// meaningful fallback content.
pub async fn throw_summary(
    State(state): State<AppState>,
    Query(params): Query<ThrowSummaryParams>,
) -> Response {
    let Some(store) = &state.store else {
        return ok_json(json!({ "rows": [], "available": false }));
    };

    match store.throw_metrics(&params.into_filter()).await {
        Ok(rows) => (
            [(header::CACHE_CONTROL, "no-store")],
            Json(json!({ "rows": rows, "available": true })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Throw metrics query failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
