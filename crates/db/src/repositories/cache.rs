use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::cache::CacheEntry;
use relay_core::fingerprint::Fingerprint;

use super::{RepositoryError, ResponseCacheRepository};
use crate::DbPool;

pub struct SqlResponseCacheRepository {
    pool: DbPool,
}

impl SqlResponseCacheRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ResponseCacheRepository for SqlResponseCacheRepository {
    async fn lookup(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<CacheEntry>, RepositoryError> {
        // Bump-and-read in one statement; the RETURNING row reflects the hit
        // that was just counted. Expired entries stay untouched for purge.
        let row = sqlx::query(
            "UPDATE response_cache
             SET hits = hits + 1
             WHERE fingerprint = ? AND expires_at > ?
             RETURNING fingerprint, response_json, hits, created_at, expires_at",
        )
        .bind(fingerprint.as_hex())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(entry_from_row).transpose()
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO response_cache (
                fingerprint, response_json, hits, created_at, expires_at
             ) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(fingerprint) DO UPDATE SET
                response_json = excluded.response_json,
                hits = 0,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
        )
        .bind(entry.fingerprint.as_hex())
        .bind(&entry.response_json)
        .bind(entry.hits.min(i64::MAX as u64) as i64)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let outcome = sqlx::query("DELETE FROM response_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(outcome.rows_affected())
    }
}

fn entry_from_row(row: SqliteRow) -> Result<CacheEntry, RepositoryError> {
    Ok(CacheEntry {
        fingerprint: Fingerprint::from_hex(row.get::<String, _>("fingerprint")),
        response_json: row.get("response_json"),
        hits: row.get::<i64, _>("hits").max(0) as u64,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}
