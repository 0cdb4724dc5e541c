//! Core domain for the relay orchestration engine.
//!
//! Everything in this crate is pure and synchronous: request/response types,
//! deterministic model routing, token pricing, prompt assembly, cache
//! fingerprinting, configuration, and the request-level error taxonomy.
//! I/O (provider calls, tool execution, persistence) lives in `relay-agent`
//! and `relay-db`.

pub mod config;
pub mod domain;
pub mod errors;
pub mod fingerprint;
pub mod pricing;
pub mod prompt;
pub mod routing;

pub use domain::cache::CacheEntry;
pub use domain::model::{Model, ModelSelection};
pub use domain::quota::{QuotaAllowance, QuotaDecision, SubscriptionQuota};
pub use domain::request::{
    AssistRequest, CachePolicy, Complexity, EntityContext, Feature, PlanTier, RelatedRecord,
    RequestOptions, TenantId, UserId,
};
pub use domain::response::{ActionOutcome, EngineResponse};
pub use domain::usage::{TokenUsage, UsageRecord};
pub use errors::EngineError;
pub use fingerprint::{catalog_digest, fingerprint, Fingerprint};
pub use pricing::{cost_of, price_of, ModelPrice};
pub use prompt::{PromptBuilder, PromptBundle};
pub use routing::ModelRouter;
