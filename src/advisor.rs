// HTTP client for an OpenAI-compatible chat-completion endpoint.
//
// One attempt per call, bounded by the configured timeout. Callers treat
// every error as "no upgrade available" and keep their own fallback.

use std::time::Instant;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AdvisorConfig;
use crate::metrics;
use crate::rules::CoachingRequest;

/// Temperature used for one-sentence coaching decisions.
pub const DECISION_TEMPERATURE: f32 = 0.4;

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("advisor request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("advisor returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("advisor response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("advisor returned no content")]
    EmptyContent,
}

impl AdvisorError {
    /// Short label for the failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            AdvisorError::Http(e) if e.is_timeout() => "timeout",
            AdvisorError::Http(_) => "transport",
            AdvisorError::Status { .. } => "status",
            AdvisorError::Decode(_) => "decode",
            AdvisorError::EmptyContent => "empty",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Render the one-sentence coaching prompt for a request.
pub fn decision_prompt(req: &CoachingRequest) -> String {
    format!(
        "You are \"Football Playbook Coach\". Be concise and accurate.\n\
         Concept: Smash. Coverage: {}. rotateStrong={}. nickelBlitz={}.\n\
         Return one sentence with the best coaching decision (mention route letter if helpful, e.g., H or Z).",
        req.coverage, req.rotate_strong, req.nickel_blitz
    )
}

/// Chat-completion advisor. Only exists when a credential is configured.
#[derive(Debug, Clone)]
pub struct Advisor {
    client: Client,
    api_key: String,
    url: String,
    model: String,
}

impl Advisor {
    /// Build an advisor from configuration. Returns `Ok(None)` when no
    /// credential is set.
    pub fn from_config(config: &AdvisorConfig) -> Result<Option<Self>, AdvisorError> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Some(Self {
            client,
            api_key,
            url: config.url.clone(),
            model: config.model.clone(),
        }))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask for a one-sentence coaching decision.
    pub async fn decide(&self, req: &CoachingRequest) -> Result<String, AdvisorError> {
        let messages = [ChatMessage::user(decision_prompt(req))];
        self.complete(&messages, DECISION_TEMPERATURE, false).await
    }

    /// Run a single chat completion and return the trimmed content of the
    /// first choice. `json_mode` asks the model for a JSON object.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        json_mode: bool,
    ) -> Result<String, AdvisorError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            temperature,
            messages,
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let started = Instant::now();
        let result = self.send(&body).await;
        metrics::ADVISOR_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            metrics::ADVISOR_FAILURES_TOTAL
                .with_label_values(&[e.reason()])
                .inc();
        }
        result
    }

    async fn send(&self, body: &ChatCompletionRequest<'_>) -> Result<String, AdvisorError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: ChatCompletionResponse = serde_json::from_slice(&bytes)?;
        first_content(parsed).ok_or(AdvisorError::EmptyContent)
    }

    /// Model and endpoint, for startup logging.
    pub fn describe(&self) -> String {
        format!("{} via {}", self.model, self.url)
    }
}

fn first_content(resp: ChatCompletionResponse) -> Option<String> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
