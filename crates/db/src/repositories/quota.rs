use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::quota::{QuotaAllowance, QuotaDecision, SubscriptionQuota};
use relay_core::domain::request::{PlanTier, TenantId};

use super::{QuotaRepository, RepositoryError};
use crate::DbPool;

const UNLIMITED_SENTINEL: i64 = -1;

pub struct SqlQuotaRepository {
    pool: DbPool,
}

impl SqlQuotaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuotaRepository for SqlQuotaRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<SubscriptionQuota>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, plan, allowance, consumed, period_start, period_end
             FROM subscription_quotas
             WHERE tenant_id = ?",
        )
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(quota_from_row).transpose()
    }

    async fn upsert(&self, quota: SubscriptionQuota) -> Result<(), RepositoryError> {
        let allowance = match quota.allowance {
            QuotaAllowance::Unlimited => UNLIMITED_SENTINEL,
            QuotaAllowance::Limited(limit) => limit.min(i64::MAX as u64) as i64,
        };

        sqlx::query(
            "INSERT INTO subscription_quotas (
                tenant_id, plan, allowance, consumed, period_start, period_end
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                plan = excluded.plan,
                allowance = excluded.allowance,
                consumed = excluded.consumed,
                period_start = excluded.period_start,
                period_end = excluded.period_end",
        )
        .bind(&quota.tenant_id.0)
        .bind(quota.plan.as_key())
        .bind(allowance)
        .bind(quota.consumed.min(i64::MAX as u64) as i64)
        .bind(quota.period_start)
        .bind(quota.period_end)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_consume(&self, tenant_id: &TenantId) -> Result<QuotaDecision, RepositoryError> {
        // Single conditional increment; sqlite serializes writers, so two
        // concurrent calls cannot both pass against one remaining request.
        let outcome = sqlx::query(
            "UPDATE subscription_quotas
             SET consumed = consumed + 1
             WHERE tenant_id = ? AND (allowance = ? OR consumed < allowance)",
        )
        .bind(&tenant_id.0)
        .bind(UNLIMITED_SENTINEL)
        .execute(&self.pool)
        .await?;

        let quota = self.find(tenant_id).await?;
        let Some(quota) = quota else {
            return Ok(QuotaDecision::Denied {
                reason: "no subscription quota is configured for this tenant".to_string(),
                resets_at: Utc::now(),
            });
        };

        if outcome.rows_affected() == 1 {
            return Ok(QuotaDecision::Allowed { remaining: quota.remaining() });
        }

        let reason = match quota.allowance {
            QuotaAllowance::Limited(0) => {
                "this plan does not include AI requests; upgrade to enable them".to_string()
            }
            _ => "monthly AI request allowance is exhausted; upgrade for a higher limit"
                .to_string(),
        };
        Ok(QuotaDecision::Denied { reason, resets_at: quota.period_end })
    }
}

fn quota_from_row(row: SqliteRow) -> Result<SubscriptionQuota, RepositoryError> {
    let plan_key: String = row.get("plan");
    let allowance: i64 = row.get("allowance");
    let consumed: i64 = row.get("consumed");

    let allowance = match allowance {
        UNLIMITED_SENTINEL => QuotaAllowance::Unlimited,
        value if value >= 0 => QuotaAllowance::Limited(value as u64),
        value => {
            return Err(RepositoryError::Decode(format!("invalid allowance `{value}`")));
        }
    };

    Ok(SubscriptionQuota {
        tenant_id: TenantId(row.get("tenant_id")),
        plan: PlanTier::from_key(&plan_key)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown plan `{plan_key}`")))?,
        allowance,
        consumed: consumed.max(0) as u64,
        period_start: row.get::<DateTime<Utc>, _>("period_start"),
        period_end: row.get::<DateTime<Utc>, _>("period_end"),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use relay_core::domain::quota::{QuotaAllowance, QuotaDecision, SubscriptionQuota};
    use relay_core::domain::request::{PlanTier, TenantId};

    use super::SqlQuotaRepository;
    use crate::repositories::QuotaRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlQuotaRepository {
        // Shared cache so every pooled connection sees one database.
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 4, 5)
            .await
            .expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlQuotaRepository::new(pool)
    }

    fn quota(tenant: &str, allowance: QuotaAllowance, consumed: u64) -> SubscriptionQuota {
        let now = Utc::now();
        SubscriptionQuota {
            tenant_id: TenantId(tenant.to_string()),
            plan: PlanTier::Business,
            allowance,
            consumed,
            period_start: now,
            period_end: now + Duration::days(30),
        }
    }

    #[tokio::test]
    async fn zero_allowance_denies_unconditionally() {
        let repo = repository().await;
        repo.upsert(quota("t-zero", QuotaAllowance::Limited(0), 0)).await.expect("upsert");

        let decision = repo.try_consume(&TenantId("t-zero".to_string())).await.expect("consume");
        match decision {
            QuotaDecision::Denied { reason, .. } => assert!(reason.contains("upgrade")),
            QuotaDecision::Allowed { .. } => panic!("zero allowance must deny"),
        }
    }

    #[tokio::test]
    async fn unlimited_always_allows() {
        let repo = repository().await;
        repo.upsert(quota("t-unlim", QuotaAllowance::Unlimited, 999_999)).await.expect("upsert");

        for _ in 0..5 {
            let decision =
                repo.try_consume(&TenantId("t-unlim".to_string())).await.expect("consume");
            assert!(decision.is_allowed());
        }
    }

    #[tokio::test]
    async fn consumption_stops_exactly_at_the_allowance() {
        let repo = repository().await;
        repo.upsert(quota("t-3", QuotaAllowance::Limited(3), 0)).await.expect("upsert");
        let tenant = TenantId("t-3".to_string());

        for _ in 0..3 {
            assert!(repo.try_consume(&tenant).await.expect("consume").is_allowed());
        }
        assert!(!repo.try_consume(&tenant).await.expect("consume").is_allowed());

        let stored = repo.find(&tenant).await.expect("find").expect("exists");
        assert_eq!(stored.consumed, 3);
    }

    #[tokio::test]
    async fn unknown_tenant_is_denied_not_errored() {
        let repo = repository().await;
        let decision =
            repo.try_consume(&TenantId("t-missing".to_string())).await.expect("consume");
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn concurrent_consumption_never_exceeds_the_allowance() {
        let repo = Arc::new(repository().await);
        repo.upsert(quota("t-race", QuotaAllowance::Limited(10), 0)).await.expect("upsert");

        let mut handles = Vec::new();
        for _ in 0..25 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.try_consume(&TenantId("t-race".to_string())).await
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.expect("join").expect("consume").is_allowed() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 10, "exactly the allowance may pass");
        let stored =
            repo.find(&TenantId("t-race".to_string())).await.expect("find").expect("exists");
        assert_eq!(stored.consumed, 10);
    }
}
