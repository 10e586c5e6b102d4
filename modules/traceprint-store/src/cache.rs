//! Postgres-backed cache gateway.
//!
//! Backend errors are logged and read as misses; the pipeline never fails
//! because the cache did. Expiry is enforced in the query, with a
//! separate eviction sweep for reclaiming rows.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;

use traceprint_common::{CacheGateway, CacheKey};

pub struct PgCache {
    pool: PgPool,
}

impl PgCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete expired entries. Run periodically or at startup.
    pub async fn evict_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM scan_cache WHERE expires_at IS NOT NULL AND expires_at <= now()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CacheGateway for PgCache {
    async fn get(&self, key: &CacheKey) -> Option<Value> {
        let rendered = key.render();
        let row: Result<Option<(Value,)>, sqlx::Error> = sqlx::query_as(
            "SELECT value FROM scan_cache
             WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(&rendered)
        .fetch_optional(&self.pool)
        .await;

        match row {
            Ok(Some((value,))) => {
                let pool = self.pool.clone();
                tokio::spawn(async move {
                    let _ = sqlx::query(
                        "UPDATE scan_cache SET hit_count = hit_count + 1 WHERE key = $1",
                    )
                    .bind(&rendered)
                    .execute(&pool)
                    .await;
                });
                Some(value)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(key = %key, error = %err, "Cache read failed");
                None
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: Value, ttl: Duration) {
        let expires_at: Option<DateTime<Utc>> = chrono::Duration::from_std(ttl)
            .ok()
            .map(|d| Utc::now() + d);
        let result = sqlx::query(
            "INSERT INTO scan_cache (key, value, expires_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (key)
             DO UPDATE SET value = EXCLUDED.value,
                           expires_at = EXCLUDED.expires_at,
                           hit_count = 0,
                           created_at = now()",
        )
        .bind(key.render())
        .bind(&value)
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            warn!(key = %key, error = %err, "Cache write failed");
        }
    }

    async fn invalidate(&self, key: &CacheKey) {
        let result = sqlx::query("DELETE FROM scan_cache WHERE key = $1")
            .bind(key.render())
            .execute(&self.pool)
            .await;
        if let Err(err) = result {
            warn!(key = %key, error = %err, "Cache invalidation failed");
        }
    }
}
