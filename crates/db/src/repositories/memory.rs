use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use relay_core::domain::cache::CacheEntry;
use relay_core::domain::quota::{QuotaAllowance, QuotaDecision, SubscriptionQuota};
use relay_core::domain::request::TenantId;
use relay_core::domain::usage::UsageRecord;
use relay_core::fingerprint::Fingerprint;

use super::{
    QuotaRepository, RepositoryError, ResponseCacheRepository, UsageRepository,
};

#[derive(Default)]
pub struct InMemoryUsageRepository {
    records: RwLock<Vec<UsageRecord>>,
}

impl InMemoryUsageRepository {
    pub async fn all(&self) -> Vec<UsageRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait::async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn record(&self, record: UsageRecord) -> Result<(), RepositoryError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| &record.tenant_id == tenant_id && record.recorded_at >= since)
            .cloned()
            .collect())
    }
}

/// Quotas behind a single mutex: the check and the increment happen inside
/// one critical section, mirroring the SQL repository's conditional UPDATE.
#[derive(Default)]
pub struct InMemoryQuotaRepository {
    quotas: Mutex<HashMap<String, SubscriptionQuota>>,
}

#[async_trait::async_trait]
impl QuotaRepository for InMemoryQuotaRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<SubscriptionQuota>, RepositoryError> {
        let quotas = self.quotas.lock().await;
        Ok(quotas.get(&tenant_id.0).cloned())
    }

    async fn upsert(&self, quota: SubscriptionQuota) -> Result<(), RepositoryError> {
        let mut quotas = self.quotas.lock().await;
        quotas.insert(quota.tenant_id.0.clone(), quota);
        Ok(())
    }

    async fn try_consume(&self, tenant_id: &TenantId) -> Result<QuotaDecision, RepositoryError> {
        let mut quotas = self.quotas.lock().await;
        let Some(quota) = quotas.get_mut(&tenant_id.0) else {
            return Ok(QuotaDecision::Denied {
                reason: "no subscription quota is configured for this tenant".to_string(),
                resets_at: Utc::now(),
            });
        };

        match quota.allowance {
            QuotaAllowance::Unlimited => {
                quota.consumed = quota.consumed.saturating_add(1);
                Ok(QuotaDecision::Allowed { remaining: None })
            }
            QuotaAllowance::Limited(0) => Ok(QuotaDecision::Denied {
                reason: "this plan does not include AI requests; upgrade to enable them"
                    .to_string(),
                resets_at: quota.period_end,
            }),
            QuotaAllowance::Limited(allowance) if quota.consumed < allowance => {
                quota.consumed += 1;
                Ok(QuotaDecision::Allowed { remaining: Some(allowance - quota.consumed) })
            }
            QuotaAllowance::Limited(_) => Ok(QuotaDecision::Denied {
                reason: "monthly AI request allowance is exhausted; upgrade for a higher limit"
                    .to_string(),
                resets_at: quota.period_end,
            }),
        }
    }
}

#[derive(Default)]
pub struct InMemoryResponseCacheRepository {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

#[async_trait::async_trait]
impl ResponseCacheRepository for InMemoryResponseCacheRepository {
    async fn lookup(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<CacheEntry>, RepositoryError> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(fingerprint.as_hex()) else {
            return Ok(None);
        };
        if entry.is_expired(Utc::now()) {
            return Ok(None);
        }
        entry.hits += 1;
        Ok(Some(entry.clone()))
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.lock().await;
        entries.insert(entry.fingerprint.as_hex().to_string(), entry);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok((before - entries.len()) as u64)
    }
}
