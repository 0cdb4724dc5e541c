use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use relay_core::domain::cache::CacheEntry;
use relay_core::domain::quota::{QuotaDecision, SubscriptionQuota};
use relay_core::domain::request::TenantId;
use relay_core::domain::usage::UsageRecord;
use relay_core::fingerprint::Fingerprint;

pub mod cache;
pub mod memory;
pub mod quota;
pub mod usage;

pub use cache::SqlResponseCacheRepository;
pub use memory::{InMemoryQuotaRepository, InMemoryResponseCacheRepository, InMemoryUsageRepository};
pub use quota::SqlQuotaRepository;
pub use usage::SqlUsageRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Append-only audit/billing trail. Records are write-once.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn record(&self, record: UsageRecord) -> Result<(), RepositoryError>;

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>, RepositoryError>;
}

/// Per-tenant monthly allowance state.
#[async_trait]
pub trait QuotaRepository: Send + Sync {
    async fn find(&self, tenant_id: &TenantId)
        -> Result<Option<SubscriptionQuota>, RepositoryError>;

    async fn upsert(&self, quota: SubscriptionQuota) -> Result<(), RepositoryError>;

    /// Check and debit in one atomic step. Two concurrent calls against a
    /// quota with one remaining request must not both be allowed; there is
    /// no separate read-then-write window for the caller to misuse.
    async fn try_consume(&self, tenant_id: &TenantId) -> Result<QuotaDecision, RepositoryError>;
}

/// Fingerprint-keyed store of prior completions. TTL eviction only; entries
/// are never invalidated by upstream data changes.
#[async_trait]
pub trait ResponseCacheRepository: Send + Sync {
    /// Returns the live entry for the fingerprint, bumping its hit counter.
    /// Expired entries are treated as absent.
    async fn lookup(&self, fingerprint: &Fingerprint)
        -> Result<Option<CacheEntry>, RepositoryError>;

    async fn store(&self, entry: CacheEntry) -> Result<(), RepositoryError>;

    /// Deletes entries whose TTL elapsed before `now`; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
