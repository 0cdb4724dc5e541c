use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// One stored completion. Created on cache miss after a successful run,
/// read-only afterwards except for the hit counter; expires by TTL only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub response_json: String,
    pub hits: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(fingerprint: Fingerprint, response_json: String, ttl_secs: u64) -> Self {
        let created_at = Utc::now();
        let expires_at = created_at + Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64);
        Self { fingerprint, response_json, hits: 0, created_at, expires_at }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
