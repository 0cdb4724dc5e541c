//! Agent runtime - provider transport and tool-calling orchestration
//!
//! This crate is the engine of the relay system: it takes a validated
//! `AssistRequest` from `relay-core` through quota, routing, caching, and a
//! bounded tool-calling conversation with the model provider.
//!
//! # Architecture
//!
//! One request flows through a fixed pipeline:
//! 1. **Quota debit** (`orchestrator`) - atomic check-and-consume, before any
//!    paid call
//! 2. **Routing and prompt assembly** - pure `relay-core` logic
//! 3. **Cache replay** (`orchestrator`) - fingerprint lookup for cacheable
//!    features
//! 4. **Round-trip loop** (`orchestrator` + `executor`) - provider calls with
//!    concurrent tool fan-out between trips, bounded by `max_round_trips`
//! 5. **Accounting** - exactly one `UsageRecord` per logical request
//!
//! # Key Types
//!
//! - `Orchestrator` - the loop itself (see `orchestrator` module)
//! - `LlmClient` - pluggable provider seam; `HttpLlmClient` is the shipped
//!   transport
//! - `Tool` / `ToolRegistry` - the capability contract advertised to the model
//!
//! # Safety Principle
//!
//! The model never executes anything directly. Every requested action passes
//! through schema validation and the caller's tenant identity before a tool
//! runs, and tool failures flow back to the model as data rather than
//! aborting the request.

pub mod crm_tools;
pub mod executor;
pub mod llm;
pub mod orchestrator;
pub mod provider;
pub mod tools;

pub use crm_tools::{builtin_registry, CrmStore, InMemoryCrmStore};
pub use executor::ToolExecutor;
pub use llm::{ChatRequest, ChatResponse, ContentBlock, LlmClient, ProviderError, StopReason};
pub use orchestrator::{EngineConfig, Orchestrator};
pub use provider::HttpLlmClient;
pub use tools::{CallerContext, Tool, ToolError, ToolRegistry};
