use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::model::Model;
use crate::domain::request::{Complexity, Feature, TenantId, UserId};

/// Token counts for one or more provider round-trips, split into the four
/// price categories (cache_write/cache_read are provider-side prompt caching,
/// distinct from the response cache).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_write: u64,
    pub cache_read: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64, cache_write: u64, cache_read: u64) -> Self {
        Self { input, output, cache_write, cache_read }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
        self.cache_write = self.cache_write.saturating_add(other.cache_write);
        self.cache_read = self.cache_read.saturating_add(other.cache_read);
    }

    pub fn total(&self) -> u64 {
        self.input
            .saturating_add(self.output)
            .saturating_add(self.cache_write)
            .saturating_add(self.cache_read)
    }
}

/// Write-once audit row. One record per logical request, not per round-trip;
/// written for every request that reached the provider and for cache hits,
/// so billing never silently loses an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub feature: Feature,
    pub complexity: Complexity,
    pub model: Model,
    pub usage: TokenUsage,
    pub cost: Decimal,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        feature: Feature,
        complexity: Complexity,
        model: Model,
        usage: TokenUsage,
        cost: Decimal,
        latency_ms: u64,
        cache_hit: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            user_id,
            feature,
            complexity,
            model,
            usage,
            cost,
            latency_ms,
            cache_hit,
            recorded_at: Utc::now(),
        }
    }
}
