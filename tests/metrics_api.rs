// Request metrics are labelled by route template, never by raw path.

mod common;

use axum::http::StatusCode;
use prometheus::core::Collector;
use serde_json::json;

use common::{app, get, post_json};
use playbook_backend::api::UNMATCHED_ENDPOINT;
use playbook_backend::config::Config;
use playbook_backend::metrics::API_REQUESTS_TOTAL;

fn endpoint_labels() -> Vec<String> {
    API_REQUESTS_TOTAL
        .collect()
        .iter()
        .flat_map(|family| family.get_metric().to_vec())
        .flat_map(|metric| metric.get_label().to_vec())
        .filter(|label| label.get_name() == "endpoint")
        .map(|label| label.get_value().to_string())
        .collect()
}

#[tokio::test]
async fn test_unknown_paths_share_one_series() {
    let app = app(Config::default(), None);
    let before = API_REQUESTS_TOTAL
        .with_label_values(&["GET", UNMATCHED_ENDPOINT, "404"])
        .get();

    for i in 0..3 {
        let (status, _) = get(&app, &format!("/no-such-route-x{i}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    assert_eq!(
        API_REQUESTS_TOTAL
            .with_label_values(&["GET", UNMATCHED_ENDPOINT, "404"])
            .get(),
        before + 3
    );
    assert!(endpoint_labels().iter().all(|l| !l.starts_with("/no-such-route")));
}

#[tokio::test]
async fn test_routes_use_their_template() {
    let app = app(Config::default(), None);
    post_json(
        &app,
        "/api/football-chat",
        json!({ "conceptId": "smash", "coverage": "C2" }),
    )
    .await;

    assert!(API_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/football-chat", "200"])
        .get()
        >= 1);
}
