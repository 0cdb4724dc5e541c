use chrono::{DateTime, Utc};
use thiserror::Error;

/// Request-level failures. Tool-level failures are not errors at this layer:
/// they are recovered into `ToolResult { success: false }` and fed back to
/// the model as data.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EngineError {
    /// Malformed or incomplete request, rejected before any paid call.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Tenant allowance exhausted (or zero). Terminal; never retried.
    #[error("monthly request allowance exhausted, resets at {resets_at}")]
    QuotaExceeded { remaining: u64, resets_at: DateTime<Utc> },
    /// Provider throttling. Retryable by the caller, never retried here.
    #[error("provider rate limited{}", retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },
    /// Hard provider failure (auth, malformed response, transport). Terminal
    /// for the request; the message never carries credentials.
    #[error("provider error: {0}")]
    Provider(String),
    /// The model kept requesting tools past the round-trip cap.
    #[error("model did not converge within {round_trips} round-trips")]
    LoopBoundExceeded { round_trips: u32 },
    /// Fatal misconfiguration (unknown model id, bad price table, missing
    /// key). Not a runtime retry condition.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Usage/quota/cache store failure.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    /// Whether the caller may usefully retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Message safe to show to the end user (no internals, no provider
    /// detail).
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(_) => {
                "The request could not be processed. Check inputs and try again.".to_string()
            }
            Self::QuotaExceeded { resets_at, .. } => format!(
                "Your plan's monthly AI allowance is used up. It resets on {}. Upgrade your plan for a higher allowance.",
                resets_at.format("%Y-%m-%d")
            ),
            Self::RateLimited { .. } => {
                "The assistant is briefly over capacity. Please retry in a moment.".to_string()
            }
            Self::Provider(_) | Self::Configuration(_) | Self::Persistence(_) => {
                "An unexpected internal error occurred.".to_string()
            }
            Self::LoopBoundExceeded { .. } => {
                "The assistant could not complete this request. Try rephrasing it.".to_string()
            }
        }
    }
}
