//! Provider abstraction: the message model for one conversational completion
//! and the `LlmClient` seam behind which concrete transports live.
//!
//! The shapes mirror a messages-style tool-use API: a turn is a list of
//! content blocks, and a reply either ends the turn with text or requests
//! tool invocations that the engine must execute and feed back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use relay_core::domain::model::Model;
use relay_core::domain::usage::TokenUsage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One block of a conversation turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// The model asks the engine to run a tool. `id` is the correlation id
    /// results must be matched back to.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// A tool outcome fed back to the model. `is_error` lets the model see a
    /// failure as distinct from a successful-but-empty result.
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![ContentBlock::Text { text: text.into() }] }
    }
}

/// A tool as advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: Model,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatResponse {
    pub content: Vec<ContentBlock>,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

impl ChatResponse {
    pub fn tool_calls(&self) -> Vec<&ContentBlock> {
        self.content
            .iter()
            .filter(|block| matches!(block, ContentBlock::ToolUse { .. }))
            .collect()
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }
}

/// Transport failures, split so callers can tell throttling (retryable at
/// their layer) from hard errors (terminal for the request).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProviderError {
    #[error("provider throttled the request")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("provider rejected the credentials")]
    Unauthorized,
    #[error("provider call timed out")]
    Timeout,
    #[error("provider returned a malformed response: {0}")]
    Malformed(String),
    #[error("provider transport failure: {0}")]
    Http(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}
