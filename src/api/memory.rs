// Session, routine and skill persistence handlers.
//
// Without a configured store every handler answers 200 with a "not stored"
// flag or an empty result. Store errors come back as `{ ok: false, error }`.

use std::collections::BTreeMap;

use axum::{body::Bytes, extract::State, response::Response};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ok_false, ok_json, parse_body, store_error, AppState};
use crate::db::{Database, MemoryKind};
use crate::identity::HeaderUser;
use crate::metrics;
use crate::rules::null_as_default;
use crate::skills::{self, Recommendation, ThrowSignals};

/// Routines returned by a list call.
pub const ROUTINE_LIST_LIMIT: i64 = 30;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOnlyRequest {
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSaveRequest {
    pub user_id: Option<String>,
    pub session: Option<Value>,
}

#[derive(Deserialize)]
pub struct RoutineBody {
    pub name: Option<String>,
    pub drill: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineSaveRequest {
    pub user_id: Option<String>,
    pub routine: Option<RoutineBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineRenameRequest {
    pub user_id: Option<String>,
    pub old_name: String,
    pub new_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineDeleteRequest {
    pub user_id: Option<String>,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillTrackRequest {
    pub user_id: Option<String>,
    pub concept_id: Option<String>,
    pub coverage: Option<String>,
    #[serde(rename = "throw", default, deserialize_with = "null_as_default")]
    pub throw_signals: ThrowSignals,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveRequest {
    pub user_id: Option<String>,
    pub coverage: Option<String>,
}

// ── Sessions ──────────────────────────────────────────────────────────

pub async fn session_save(
    State(state): State<AppState>,
    user: HeaderUser,
    body: Bytes,
) -> Response {
    let req: SessionSaveRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let (Some(store), Some(user_id)) = (&state.store, user.resolve(req.user_id.as_deref())) else {
        return ok_json(json!({ "ok": true, "stored": false }));
    };

    let session = req.session.unwrap_or_else(|| json!({}));
    match store
        .insert_memory(Some(&user_id), MemoryKind::Session, &session)
        .await
    {
        Ok(()) => ok_json(json!({ "ok": true, "stored": true })),
        Err(e) => store_error(e),
    }
}

pub async fn session_load(
    State(state): State<AppState>,
    user: HeaderUser,
    body: Bytes,
) -> Response {
    let req: UserOnlyRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let (Some(store), Some(user_id)) = (&state.store, user.resolve(req.user_id.as_deref())) else {
        return ok_json(json!({ "ok": true, "session": {} }));
    };

    match store.latest_memory(&user_id, MemoryKind::Session).await {
        Ok(session) => ok_json(json!({
            "ok": true,
            "session": session.unwrap_or_else(|| json!({})),
        })),
        Err(e) => store_error(e),
    }
}

// ── Routines ──────────────────────────────────────────────────────────

pub async fn routine_save(
    State(state): State<AppState>,
    user: HeaderUser,
    body: Bytes,
) -> Response {
    let req: RoutineSaveRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(store) = &state.store else {
        return ok_json(json!({ "ok": true, "stored": false }));
    };

    let user_id = user.resolve(req.user_id.as_deref());
    let (name, drill) = match req.routine {
        Some(r) => (r.name, r.drill),
        None => (None, None),
    };
    let data = json!({
        "name": name.unwrap_or_else(|| "Routine".to_string()),
        "drill": drill.unwrap_or_else(|| json!({})),
    });

    match store
        .insert_memory(user_id.as_deref(), MemoryKind::Routine, &data)
        .await
    {
        Ok(()) => ok_json(json!({ "ok": true, "stored": true })),
        Err(e) => store_error(e),
    }
}

pub async fn routine_list(
    State(state): State<AppState>,
    user: HeaderUser,
    body: Bytes,
) -> Response {
    let req: UserOnlyRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(store) = &state.store else {
        return ok_json(json!({ "ok": true, "routines": [] }));
    };

    let user_id = user.resolve(req.user_id.as_deref());
    match store
        .list_memory(user_id.as_deref(), MemoryKind::Routine, ROUTINE_LIST_LIMIT)
        .await
    {
        Ok(routines) => ok_json(json!({ "ok": true, "routines": routines })),
        Err(e) => store_error(e),
    }
}

/// Copy the newest routine stored under `oldName` to `newName`. The old
/// record is kept.
pub async fn routine_rename(
    State(state): State<AppState>,
    user: HeaderUser,
    body: Bytes,
) -> Response {
    let req: RoutineRenameRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(store) = &state.store else {
        return ok_json(json!({ "ok": true, "stored": false }));
    };

    let user_id = user.resolve(req.user_id.as_deref());
    let existing = match store.latest_routine(user_id.as_deref(), &req.old_name).await {
        Ok(r) => r,
        Err(e) => return store_error(e),
    };
    let drill = match existing.and_then(|r| r.get("drill").cloned()) {
        Some(d) if !d.is_null() => d,
        _ => return ok_false("routine_not_found"),
    };

    let data = json!({ "name": req.new_name, "drill": drill });
    match store
        .insert_memory(user_id.as_deref(), MemoryKind::Routine, &data)
        .await
    {
        Ok(()) => ok_json(json!({ "ok": true, "stored": true })),
        Err(e) => store_error(e),
    }
}

pub async fn routine_delete(
    State(state): State<AppState>,
    user: HeaderUser,
    body: Bytes,
) -> Response {
    let req: RoutineDeleteRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(store) = &state.store else {
        return ok_json(json!({ "ok": true, "deleted": false }));
    };

    let user_id = user.resolve(req.user_id.as_deref());
    match store.delete_routines(user_id.as_deref(), &req.name).await {
        Ok(n) => {
            tracing::debug!(removed = n, "Routines deleted");
            ok_json(json!({ "ok": true, "deleted": true }))
        }
        Err(e) => store_error(e),
    }
}

// ── Skills ────────────────────────────────────────────────────────────

pub async fn skills_track(
    State(state): State<AppState>,
    user: HeaderUser,
    body: Bytes,
) -> Response {
    let req: SkillTrackRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let deltas = skills::deltas_for_throw(&req.throw_signals, req.coverage.as_deref());

    let Some(store) = &state.store else {
        return ok_json(json!({ "ok": true, "stored": false, "deltas": deltas }));
    };

    let user_id = user.resolve(req.user_id.as_deref());
    let at = chrono::Utc::now().to_rfc3339();
    for d in &deltas {
        let data = json!({
            "skill": d.skill,
            "delta": d.delta,
            "reason": d.reason,
            "coverage": req.coverage,
            "conceptId": req.concept_id,
            "at": at,
        });
        if let Err(e) = store
            .insert_memory(user_id.as_deref(), MemoryKind::Skill, &data)
            .await
        {
            tracing::warn!("Skill insert failed: {e}");
        }
    }
    metrics::TELEMETRY_EVENTS_TOTAL
        .with_label_values(&["skill"])
        .inc_by(deltas.len() as u64);

    ok_json(json!({ "ok": true, "stored": true, "deltas": deltas }))
}

/// Per-skill totals and the recommendations they imply.
async fn skill_summary(
    store: &Database,
    user_id: &str,
) -> Result<(BTreeMap<String, i64>, Vec<Recommendation>), sqlx::Error> {
    let rows = store
        .list_memory(Some(user_id), MemoryKind::Skill, skills::SUMMARY_WINDOW)
        .await?;
    let totals = skills::aggregate(&rows);
    let recs = skills::recommendations(&totals);
    Ok((totals, recs))
}

pub async fn skills_summary(
    State(state): State<AppState>,
    user: HeaderUser,
    body: Bytes,
) -> Response {
    let req: UserOnlyRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let (Some(store), Some(user_id)) = (&state.store, user.resolve(req.user_id.as_deref())) else {
        return ok_json(json!({ "ok": true, "skills": {}, "recs": [] }));
    };

    match skill_summary(store, &user_id).await {
        Ok((totals, recs)) => ok_json(json!({ "ok": true, "skills": totals, "recs": recs })),
        Err(e) => store_error(e),
    }
}

pub async fn adaptive_next(
    State(state): State<AppState>,
    user: HeaderUser,
    body: Bytes,
) -> Response {
    let req: AdaptiveRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return ok_json(json!({ "suggestedCoverage": "C3", "reason": format!("fallback: {e}") }));
        }
    };

    let mut recs = Vec::new();
    if let (Some(store), Some(user_id)) = (&state.store, user.resolve(req.user_id.as_deref())) {
        match skill_summary(store, &user_id).await {
            Ok((_, r)) => recs = r,
            Err(e) => tracing::warn!("Skill summary unavailable for adaptive drill: {e}"),
        }
    }

    let drill = skills::next_drill(recs, req.coverage.as_deref());
    ok_json(json!(drill))
}
