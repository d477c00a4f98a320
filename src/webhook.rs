// Optional fire-and-forget forwarding of telemetry payloads.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::metrics;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Webhook {
    client: Client,
    url: Option<String>,
}

impl Webhook {
    pub fn new(url: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(FORWARD_TIMEOUT).build()?;
        Ok(Self { client, url })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// POST `payload` to the configured URL. Failures are logged and
    /// counted, never returned.
    pub async fn forward(&self, label: &str, payload: &Value) {
        let Some(url) = &self.url else {
            return;
        };
        let result = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = result {
            metrics::WEBHOOK_FAILURES_TOTAL.inc();
            tracing::warn!("{label} webhook failed: {e}");
        }
    }
}

/// Merge a `type` tag into an object payload. Non-object payloads are
/// wrapped as `{type, payload}`.
pub fn tagged(kind: &str, body: &Value) -> Value {
    match body {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len() + 1);
            out.insert("type".to_string(), Value::String(kind.to_string()));
            for (k, v) in map {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }
        other => serde_json::json!({ "type": kind, "payload": other }),
    }
}
