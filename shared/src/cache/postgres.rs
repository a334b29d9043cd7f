//! PostgreSQL cache backend (`insight_cache` table).

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

use super::{expiry_after, CacheStore};
use crate::{Error, Result};

pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the cache table and its expiry index if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS insight_cache (
                id BIGSERIAL PRIMARY KEY,
                cache_key VARCHAR(255) NOT NULL UNIQUE,
                cache_value TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_insight_cache_expires_at ON insight_cache (expires_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn unavailable(e: sqlx::Error) -> Error {
    Error::CacheUnavailable(e.to_string())
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            SELECT cache_value
            FROM insight_cache
            WHERE cache_key = $1 AND expires_at > NOW()
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = expiry_after(ttl)?;

        sqlx::query(
            r#"
            INSERT INTO insight_cache (cache_key, cache_value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (cache_key) DO UPDATE
            SET cache_value = EXCLUDED.cache_value,
                expires_at = EXCLUDED.expires_at,
                created_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn clear_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM insight_cache")
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        info!(rows = result.rows_affected(), "Cleared insight cache");
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM insight_cache WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(result.rows_affected())
    }
}
