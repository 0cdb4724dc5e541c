//! HTTP transport for the `LlmClient` seam, speaking a messages-style API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use relay_core::domain::usage::TokenUsage;

use crate::llm::{ChatRequest, ChatResponse, ContentBlock, LlmClient, ProviderError, StopReason};

const MESSAGES_PATH: &str = "/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpLlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ProviderError::Http(error.to_string()))?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self { http, base_url, api_key })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}{MESSAGES_PATH}", self.base_url);
        let body = serde_json::json!({
            "model": request.model.wire_id(),
            "system": request.system,
            "messages": request.messages,
            "tools": request.tools,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let response = self
            .http
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::Unauthorized);
        }
        if !status.is_success() {
            // Body is intentionally dropped: provider error payloads can echo
            // request headers.
            return Err(ProviderError::Http(format!("unexpected status {status}")));
        }

        let payload: WireResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::Malformed(error.to_string()))?;
        payload.try_into()
    }
}

fn classify_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Http(error.without_url().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireBlock>,
    usage: WireUsage,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

impl TryFrom<WireResponse> for ChatResponse {
    type Error = ProviderError;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        let stop_reason = match wire.stop_reason.as_deref() {
            Some("end_turn") | None => StopReason::EndTurn,
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            Some(other) => {
                return Err(ProviderError::Malformed(format!("unknown stop_reason `{other}`")))
            }
        };

        let content = wire
            .content
            .into_iter()
            .map(|block| match block {
                WireBlock::Text { text } => ContentBlock::Text { text },
                WireBlock::ToolUse { id, name, input } => {
                    ContentBlock::ToolUse { id, name, input }
                }
            })
            .collect();

        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                input: wire.usage.input_tokens,
                output: wire.usage.output_tokens,
                cache_write: wire.usage.cache_creation_input_tokens,
                cache_read: wire.usage.cache_read_input_tokens,
            },
            stop_reason,
        })
    }
}
