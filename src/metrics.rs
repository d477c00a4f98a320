// Prometheus metrics definitions for the playbook backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Counters ─────────────────────────────────────────────────────

    /// Coaching decisions served, by source (rules, advisor, parse_error).
    pub static ref DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("playbook_decisions_total", "Coaching decisions served"),
        &["source"],
    )
    .unwrap();

    /// Advisor calls that failed, by reason.
    pub static ref ADVISOR_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("playbook_advisor_failures_total", "Failed advisor calls"),
        &["reason"],
    )
    .unwrap();

    /// Throw grades served, by source.
    pub static ref GRADES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("playbook_grades_total", "Throw grades served"),
        &["source"],
    )
    .unwrap();

    /// Telemetry events accepted, by kind (snap, throw, skill).
    pub static ref TELEMETRY_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("playbook_telemetry_events_total", "Telemetry events accepted"),
        &["kind"],
    )
    .unwrap();

    /// Webhook forwards that failed.
    pub static ref WEBHOOK_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "playbook_webhook_failures_total",
        "Failed telemetry webhook forwards",
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("playbook_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Advisor round-trip time in seconds, successful or not.
    pub static ref ADVISOR_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("playbook_advisor_latency_seconds", "Advisor call duration in seconds")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 12.0, 15.0]),
    )
    .unwrap();

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "playbook_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 15.0]),
        &["endpoint"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
/// Registering twice is harmless; duplicates are skipped.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(DECISIONS_TOTAL.clone()),
        Box::new(ADVISOR_FAILURES_TOTAL.clone()),
        Box::new(GRADES_TOTAL.clone()),
        Box::new(TELEMETRY_EVENTS_TOTAL.clone()),
        Box::new(WEBHOOK_FAILURES_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(ADVISOR_LATENCY_SECONDS.clone()),
        Box::new(API_REQUEST_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::debug!("Metric already registered: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
