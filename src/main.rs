use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use playbook_backend::{api, config::Config, db, metrics};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let store = match config.database_url.as_deref() {
        Some(url) => {
            let db = db::Database::new(url)
                .await
                .expect("Failed to initialize database");
            Some(Arc::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; persistence endpoints will not store anything");
            None
        }
    };

    let port = config.port;
    let state = api::AppState::new(config, store).expect("Failed to build HTTP clients");
    match &state.advisor {
        Some(advisor) => tracing::info!("Advisor enabled: {}", advisor.describe()),
        None => tracing::info!("No advisor credential; serving rule-based decisions only"),
    }

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Playbook backend listening on port {port}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
