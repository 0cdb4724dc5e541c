use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::model::Model;
use relay_core::domain::request::{Complexity, Feature, TenantId, UserId};
use relay_core::domain::usage::{TokenUsage, UsageRecord};

use super::{RepositoryError, UsageRepository};
use crate::DbPool;

pub struct SqlUsageRepository {
    pool: DbPool,
}

impl SqlUsageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UsageRepository for SqlUsageRepository {
    async fn record(&self, record: UsageRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO usage_records (
                id,
                tenant_id,
                user_id,
                feature,
                complexity,
                model,
                input_tokens,
                output_tokens,
                cache_write_tokens,
                cache_read_tokens,
                cost,
                latency_ms,
                cache_hit,
                recorded_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.tenant_id.0)
        .bind(&record.user_id.0)
        .bind(record.feature.as_key())
        .bind(record.complexity.as_key())
        .bind(record.model.wire_id())
        .bind(record.usage.input as i64)
        .bind(record.usage.output as i64)
        .bind(record.usage.cache_write as i64)
        .bind(record.usage.cache_read as i64)
        .bind(record.cost.to_string())
        .bind(record.latency_ms as i64)
        .bind(record.cache_hit)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                tenant_id,
                user_id,
                feature,
                complexity,
                model,
                input_tokens,
                output_tokens,
                cache_write_tokens,
                cache_read_tokens,
                cost,
                latency_ms,
                cache_hit,
                recorded_at
             FROM usage_records
             WHERE tenant_id = ? AND recorded_at >= ?
             ORDER BY recorded_at ASC",
        )
        .bind(&tenant_id.0)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: SqliteRow) -> Result<UsageRecord, RepositoryError> {
    let feature_key: String = row.get("feature");
    let complexity_key: String = row.get("complexity");
    let model_id: String = row.get("model");
    let cost_text: String = row.get("cost");

    Ok(UsageRecord {
        id: row.get("id"),
        tenant_id: TenantId(row.get("tenant_id")),
        user_id: UserId(row.get("user_id")),
        feature: Feature::from_key(&feature_key)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown feature `{feature_key}`")))?,
        complexity: Complexity::from_key(&complexity_key).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown complexity `{complexity_key}`"))
        })?,
        model: Model::from_str(&model_id)
            .map_err(|_| RepositoryError::Decode(format!("unknown model `{model_id}`")))?,
        usage: TokenUsage {
            input: row.get::<i64, _>("input_tokens") as u64,
            output: row.get::<i64, _>("output_tokens") as u64,
            cache_write: row.get::<i64, _>("cache_write_tokens") as u64,
            cache_read: row.get::<i64, _>("cache_read_tokens") as u64,
        },
        cost: Decimal::from_str(&cost_text)
            .map_err(|error| RepositoryError::Decode(format!("bad cost `{cost_text}`: {error}")))?,
        latency_ms: row.get::<i64, _>("latency_ms") as u64,
        cache_hit: row.get("cache_hit"),
        recorded_at: row.get("recorded_at"),
    })
}
