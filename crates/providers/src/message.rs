//! Delay message text.
//!
//! [`OpenAiMessageWriter`] asks an OpenAI-compatible chat completions
//! endpoint for a short customer-facing sentence. [`TemplateMessageWriter`]
//! renders fixed text and is used when no API key is configured, and as the
//! fallback when the model returns nothing.

use std::time::Duration;

use async_trait::async_trait;
use delaywatch_core::activities::{ActivityError, DelayMessageRequest, MessageWriter};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Chat completions error ({status}): {body}")]
    Api { status: u16, body: String },
}

impl From<MessageError> for ActivityError {
    fn from(e: MessageError) -> Self {
        let transient = match &e {
            MessageError::Request(_) => true,
            MessageError::Api { status, .. } => *status == 429 || *status >= 500,
        };
        if transient {
            ActivityError::Transient(e.to_string())
        } else {
            ActivityError::Permanent(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// MessageConfig
// ---------------------------------------------------------------------------

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const MAX_TOKENS: u32 = 200;

const SYSTEM_PROMPT: &str = "You write short, friendly notices for delivery customers. \
    Explain that traffic is delaying their delivery by the given number of minutes. \
    Two sentences at most. No greeting, no sign-off.";

#[derive(Debug, Clone)]
pub struct MessageConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl MessageConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `OPENAI_API_KEY` is not set; callers then fall back
    /// to [`TemplateMessageWriter`].
    ///
    /// | Variable          | Required | Default                  |
    /// |-------------------|----------|--------------------------|
    /// | `OPENAI_API_KEY`  | yes      | —                        |
    /// | `OPENAI_BASE_URL` | no       | `https://api.openai.com` |
    /// | `OPENAI_MODEL`    | no       | `gpt-4o-mini`            |
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let mut config = Self::new(
            api_key,
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        );
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config.model = model;
        }
        Some(config)
    }

    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// Fixed delay text.
pub fn template_message(request: &DelayMessageRequest) -> String {
    format!(
        "Heavy traffic between {} and {} is holding up your delivery. \
         It is currently running about {} minutes behind schedule, \
         and we will let you know if that changes.",
        request.origin, request.destination, request.delay_minutes
    )
}

/// [`MessageWriter`] that never calls out.
pub struct TemplateMessageWriter;

#[async_trait]
impl MessageWriter for TemplateMessageWriter {
    async fn generate_delay_message(
        &self,
        request: &DelayMessageRequest,
    ) -> Result<String, ActivityError> {
        Ok(template_message(request))
    }
}

// ---------------------------------------------------------------------------
// OpenAiMessageWriter
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiMessageWriter {
    client: reqwest::Client,
    config: MessageConfig,
}

impl OpenAiMessageWriter {
    pub fn new(config: MessageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Ask the model for delay text. Blank output falls back to the template.
    pub async fn generate(&self, request: &DelayMessageRequest) -> Result<String, MessageError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": MAX_TOKENS,
            "temperature": 0.3,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!(
                        "Route: {} to {}. Current delay: {} minutes.",
                        request.origin, request.destination, request.delay_minutes
                    ),
                },
            ],
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .timeout(self.config.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessageError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(match text {
            Some(text) => text,
            None => {
                tracing::warn!(model = %self.config.model, "Empty completion, using template");
                template_message(request)
            }
        })
    }
}

#[async_trait]
impl MessageWriter for OpenAiMessageWriter {
    async fn generate_delay_message(
        &self,
        request: &DelayMessageRequest,
    ) -> Result<String, ActivityError> {
        Ok(self.generate(request).await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
