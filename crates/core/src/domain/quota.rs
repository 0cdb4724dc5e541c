use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::{PlanTier, TenantId};

/// Monthly request allowance for a tenant. Persisted as `-1` for unlimited;
/// the sentinel never leaves the repository layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaAllowance {
    Unlimited,
    Limited(u64),
}

impl QuotaAllowance {
    /// Default allowance for a plan tier. Free plans have no LLM access.
    pub fn for_plan(plan: PlanTier) -> Self {
        match plan {
            PlanTier::Free => Self::Limited(0),
            PlanTier::Starter => Self::Limited(200),
            PlanTier::Business => Self::Limited(2_000),
            PlanTier::Enterprise => Self::Unlimited,
        }
    }
}

/// Per-tenant quota state. `consumed` is mutated only through the quota
/// repository's atomic conditional increment; period rollover is an external
/// scheduled process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionQuota {
    pub tenant_id: TenantId,
    pub plan: PlanTier,
    pub allowance: QuotaAllowance,
    pub consumed: u64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl SubscriptionQuota {
    pub fn remaining(&self) -> Option<u64> {
        match self.allowance {
            QuotaAllowance::Unlimited => None,
            QuotaAllowance::Limited(allowance) => Some(allowance.saturating_sub(self.consumed)),
        }
    }
}

/// Outcome of the atomic check-and-debit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum QuotaDecision {
    Allowed { remaining: Option<u64> },
    Denied { reason: String, resets_at: DateTime<Utc> },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{QuotaAllowance, SubscriptionQuota};
    use crate::domain::request::{PlanTier, TenantId};

    #[test]
    fn plan_defaults_match_tiers() {
        assert_eq!(QuotaAllowance::for_plan(PlanTier::Free), QuotaAllowance::Limited(0));
        assert_eq!(QuotaAllowance::for_plan(PlanTier::Starter), QuotaAllowance::Limited(200));
        assert_eq!(QuotaAllowance::for_plan(PlanTier::Business), QuotaAllowance::Limited(2_000));
        assert_eq!(QuotaAllowance::for_plan(PlanTier::Enterprise), QuotaAllowance::Unlimited);
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let now = Utc::now();
        let quota = SubscriptionQuota {
            tenant_id: TenantId("t-1".to_string()),
            plan: PlanTier::Starter,
            allowance: QuotaAllowance::Limited(10),
            consumed: 14,
            period_start: now,
            period_end: now + Duration::days(30),
        };
        assert_eq!(quota.remaining(), Some(0));
    }

    #[test]
    fn unlimited_has_no_remaining_bound() {
        let now = Utc::now();
        let quota = SubscriptionQuota {
            tenant_id: TenantId("t-1".to_string()),
            plan: PlanTier::Enterprise,
            allowance: QuotaAllowance::Unlimited,
            consumed: 1_000_000,
            period_start: now,
            period_end: now + Duration::days(30),
        };
        assert_eq!(quota.remaining(), None);
    }
}
