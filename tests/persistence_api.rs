// Integration tests for sessions, routines, skills, telemetry and the
// service endpoints, backed by an in-memory SQLite store.

mod common;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{body::Body, http::Request, http::StatusCode};
use serde_json::json;

use common::{app, get, memory_store, post_json, post_raw, send};
use playbook_backend::config::Config;
use playbook_backend::db::Database;

// ── Service ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_diag() {
    let app = app(Config::default(), None);

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (_, diag) = get(&app, "/api/_diag").await;
    assert_eq!(diag["ok"], true);
    assert_eq!(diag["hasKey"], false);
    assert_eq!(diag["storeConfigured"], false);
    assert!(diag["model"].is_null());
}

// ── Unconfigured store ───────────────────────────────────────────────

#[tokio::test]
async fn test_unconfigured_store_flags() {
    let app = app(Config::default(), None);

    let (_, body) = post_json(&app, "/api/session/save", json!({ "userId": "u1", "session": {"a": 1} })).await;
    assert_eq!(body, json!({ "ok": true, "stored": false }));

    let (_, body) = post_json(&app, "/api/session/load", json!({ "userId": "u1" })).await;
    assert_eq!(body, json!({ "ok": true, "session": {} }));

    let (_, body) = post_json(&app, "/api/routine/list", json!({ "userId": "u1" })).await;
    assert_eq!(body, json!({ "ok": true, "routines": [] }));

    let (_, body) = post_json(&app, "/api/routine/delete", json!({ "userId": "u1", "name": "x" })).await;
    assert_eq!(body, json!({ "ok": true, "deleted": false }));

    let (status, body) = get(&app, "/api/metrics/throw-summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "rows": [], "available": false }));
}

// ── Sessions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_session_load_without_user() {
    let app = app(Config::default(), Some(memory_store().await));
    let (status, body) = post_json(&app, "/api/session/load", json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "session": {} }));
}

#[tokio::test]
async fn test_session_roundtrip_returns_latest() {
    let app = app(Config::default(), Some(memory_store().await));

    post_json(&app, "/api/session/save", json!({ "userId": "u1", "session": {"rep": 1} })).await;
    let (_, saved) =
        post_json(&app, "/api/session/save", json!({ "userId": "u1", "session": {"rep": 2} })).await;
    assert_eq!(saved, json!({ "ok": true, "stored": true }));

    let (_, body) = post_json(&app, "/api/session/load", json!({ "userId": "u1" })).await;
    assert_eq!(body["session"], json!({"rep": 2}));

    let (_, other) = post_json(&app, "/api/session/load", json!({ "userId": "u2" })).await;
    assert_eq!(other["session"], json!({}));
}

#[tokio::test]
async fn test_session_user_from_header() {
    let app = app(Config::default(), Some(memory_store().await));
    post_json(&app, "/api/session/save", json!({ "userId": "hdr", "session": {"k": true} })).await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/session/load")
        .header("x-user-id", "hdr")
        .body(Body::from("{}"))
        .unwrap();
    let (_, body) = send(&app, req).await;
    assert_eq!(body["session"], json!({"k": true}));
}

#[tokio::test]
async fn test_malformed_session_body() {
    let app = app(Config::default(), Some(memory_store().await));
    let (status, body) = post_raw(&app, "/api/session/save", "nope").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert!(body["error"].is_string());
}

// ── Routines ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_routine_save_list_rename_delete() {
    let app = app(Config::default(), Some(memory_store().await));

    let (_, saved) = post_json(
        &app,
        "/api/routine/save",
        json!({ "userId": "u1", "routine": { "name": "Red zone", "drill": {"coverage": "C3"} } }),
    )
    .await;
    assert_eq!(saved["stored"], true);

    let (_, renamed) = post_json(
        &app,
        "/api/routine/rename",
        json!({ "userId": "u1", "oldName": "Red zone", "newName": "Goal line" }),
    )
    .await;
    assert_eq!(renamed["ok"], true);

    let (_, listed) = post_json(&app, "/api/routine/list", json!({ "userId": "u1" })).await;
    let routines = listed["routines"].as_array().unwrap();
    assert_eq!(routines.len(), 2);
    assert_eq!(routines[0]["name"], "Goal line");
    assert_eq!(routines[0]["drill"], json!({"coverage": "C3"}));

    let (_, deleted) =
        post_json(&app, "/api/routine/delete", json!({ "userId": "u1", "name": "Red zone" })).await;
    assert_eq!(deleted, json!({ "ok": true, "deleted": true }));

    let (_, listed) = post_json(&app, "/api/routine/list", json!({ "userId": "u1" })).await;
    assert_eq!(listed["routines"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_routine_save_defaults() {
    let app = app(Config::default(), Some(memory_store().await));
    post_json(&app, "/api/routine/save", json!({ "userId": "u1" })).await;

    let (_, listed) = post_json(&app, "/api/routine/list", json!({ "userId": "u1" })).await;
    assert_eq!(listed["routines"][0], json!({ "name": "Routine", "drill": {} }));
}

#[tokio::test]
async fn test_rename_missing_routine() {
    let app = app(Config::default(), Some(memory_store().await));
    let (status, body) = post_json(
        &app,
        "/api/routine/rename",
        json!({ "userId": "u1", "oldName": "ghost", "newName": "x" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": false, "error": "routine_not_found" }));
}

// ── Telemetry ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_throw_log_feeds_summary() {
    let app = app(Config::default(), Some(memory_store().await));

    for (area, grade, window) in [("L_SHORT", "Good", 0.8), ("L_SHORT", "Late", 0.4), ("R_DEEP", "Great", 0.9)] {
        let (status, body) = post_json(
            &app,
            "/api/throw-log",
            json!({
                "userId": "u1",
                "conceptId": "smash",
                "coverage": "C3",
                "target": "H",
                "time": 0.5,
                "throwArea": area,
                "windowScore": window,
                "grade": grade,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    let (status, body) = get(&app, "/api/metrics/throw-summary?coverage=C3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);

    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["area_horiz"], "L");
    assert_eq!(rows[0]["area_band"], "SHORT");
    assert_eq!(rows[0]["n_throws"], 2);
    assert_eq!(rows[0]["completion_rate"], 0.5);

    let (_, filtered) = get(&app, "/api/metrics/throw-summary?areaBand=DEEP&limit=abc").await;
    assert_eq!(filtered["rows"].as_array().unwrap().len(), 1);

    let (_, none) = get(&app, "/api/metrics/throw-summary?coverage=C2").await;
    assert!(none["rows"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_throw_summary_query_failure_is_500() {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let path = std::env::temp_dir().join(format!("playbook-summary-{}-{nanos}.db", std::process::id()));
    let url = format!("sqlite:{}?mode=rwc", path.display());
    let store = Arc::new(Database::new(&url).await.unwrap());

    let side = sqlx::SqlitePool::connect(&url).await.unwrap();
    sqlx::query("DROP TABLE throws").execute(&side).await.unwrap();
    side.close().await;

    let app = app(Config::default(), Some(store));
    let (status, body) = get(&app, "/api/metrics/throw-summary").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("throws"));
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_snap_log_accepts_any_object() {
    let app = app(Config::default(), Some(memory_store().await));
    let (status, body) = post_json(
        &app,
        "/api/snap-log",
        json!({ "conceptId": "smash", "coverage": "C3", "rngSeed": 7, "roles": {"X": "go"} }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn test_snap_log_malformed() {
    let app = app(Config::default(), None);
    let (status, body) = post_raw(&app, "/api/snap-log", "{").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
}

// ── Skills ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_skills_track_and_summary() {
    let app = app(Config::default(), Some(memory_store().await));

    let (_, tracked) = post_json(
        &app,
        "/api/skills/track",
        json!({
            "userId": "u1",
            "conceptId": "smash",
            "coverage": "C2",
            "throw": { "catchWindowScore": 0.3, "heldVsBreakMs": 400, "firstOpenId": "Z", "target": "H" },
        }),
    )
    .await;
    assert_eq!(tracked["stored"], true);
    assert_eq!(tracked["deltas"].as_array().unwrap().len(), 3);

    let (_, summary) = post_json(&app, "/api/skills/summary", json!({ "userId": "u1" })).await;
    assert_eq!(summary["skills"]["zone_window_find"], -1);
    assert_eq!(summary["skills"]["timing_rhythm"], -1);
    assert_eq!(summary["skills"]["first_open_eye_speed"], -1);
    assert!(!summary["recs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_skills_track_null_throw() {
    let app = app(Config::default(), Some(memory_store().await));
    let (status, tracked) = post_json(
        &app,
        "/api/skills/track",
        json!({ "userId": "u1", "coverage": "C3", "throw": null }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(tracked["ok"], true);
    let deltas = tracked["deltas"].as_array().unwrap();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0]["skill"], "c3_rotation_id");
}

#[tokio::test]
async fn test_skills_summary_without_user() {
    let app = app(Config::default(), Some(memory_store().await));
    let (_, summary) = post_json(&app, "/api/skills/summary", json!({})).await;
    assert_eq!(summary, json!({ "ok": true, "skills": {}, "recs": [] }));
}

#[tokio::test]
async fn test_adaptive_next_defaults() {
    let app = app(Config::default(), None);

    let (_, drill) = post_json(&app, "/api/adaptive/next", json!({ "coverage": "C2" })).await;
    assert_eq!(drill["suggestedCoverage"], "C2");

    let (_, drill) = post_json(&app, "/api/adaptive/next", json!({})).await;
    assert_eq!(drill["suggestedCoverage"], "C3");

    let (status, fallback) = post_raw(&app, "/api/adaptive/next", "garbage").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fallback["suggestedCoverage"], "C3");
    assert!(fallback["reason"].as_str().unwrap().starts_with("fallback: "));
}
