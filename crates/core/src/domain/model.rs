use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// The model tiers the engine can route to, cheapest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "claude-3-5-haiku")]
    Haiku35,
    #[serde(rename = "claude-sonnet-4")]
    Sonnet4,
    #[serde(rename = "claude-opus-4")]
    Opus4,
}

impl Model {
    /// Stable identifier used on the provider wire, in usage records, and in
    /// cache fingerprints.
    pub fn wire_id(&self) -> &'static str {
        match self {
            Self::Haiku35 => "claude-3-5-haiku",
            Self::Sonnet4 => "claude-sonnet-4",
            Self::Opus4 => "claude-opus-4",
        }
    }

    /// Output token budget for the tier.
    pub fn max_output_tokens(&self) -> u32 {
        match self {
            Self::Haiku35 => 1_024,
            Self::Sonnet4 => 4_096,
            Self::Opus4 => 8_192,
        }
    }

    /// One step up the capability ladder; the top tier stays put.
    pub fn promoted(&self) -> Self {
        match self {
            Self::Haiku35 => Self::Sonnet4,
            Self::Sonnet4 | Self::Opus4 => Self::Opus4,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_id())
    }
}

impl FromStr for Model {
    type Err = EngineError;

    /// Unknown model ids are a configuration fault, never a retry condition.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "claude-3-5-haiku" => Ok(Self::Haiku35),
            "claude-sonnet-4" => Ok(Self::Sonnet4),
            "claude-opus-4" => Ok(Self::Opus4),
            other => Err(EngineError::Configuration(format!("unknown model id `{other}`"))),
        }
    }
}

/// Resolved routing decision: which model to call and with what budget.
/// Derived deterministically; carries no state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub model: Model,
    pub max_tokens: u32,
    pub temperature: f32,
}
