use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::model::Model;

/// One executed tool invocation as surfaced to the caller, in the order the
/// model requested them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
}

/// Outbound response shape. `Chat` when the model answered directly,
/// `Actions` when at least one tool ran; partial tool failure is still an
/// overall success.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineResponse {
    Chat {
        text: String,
        model: Model,
        cost: Decimal,
        latency_ms: u64,
        cache_hit: bool,
    },
    Actions {
        text: String,
        actions: Vec<ActionOutcome>,
        model: Model,
        cost: Decimal,
        latency_ms: u64,
    },
}

impl EngineResponse {
    pub fn text(&self) -> &str {
        match self {
            Self::Chat { text, .. } | Self::Actions { text, .. } => text,
        }
    }

    pub fn cost(&self) -> Decimal {
        match self {
            Self::Chat { cost, .. } | Self::Actions { cost, .. } => *cost,
        }
    }

    pub fn cache_hit(&self) -> bool {
        match self {
            Self::Chat { cache_hit, .. } => *cache_hit,
            Self::Actions { .. } => false,
        }
    }
}
