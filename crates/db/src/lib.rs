//! Persistence for the relay engine: the usage audit trail, per-tenant quota
//! counters, and the fingerprint-keyed response cache, all backed by sqlite.
//!
//! The repository traits here are the only shared mutable state between
//! concurrent orchestration runs; both stores expose atomic primitives
//! (conditional increment, bump-and-read) instead of expecting callers to
//! serialize access.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    InMemoryQuotaRepository, InMemoryResponseCacheRepository, InMemoryUsageRepository,
    QuotaRepository, RepositoryError, ResponseCacheRepository, SqlQuotaRepository,
    SqlResponseCacheRepository, SqlUsageRepository, UsageRepository,
};
