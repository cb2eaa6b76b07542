use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use openhouse_core::store::{KvStore, StoreError, StoreResult};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};

use crate::models::DbEntry;

/// `KvStore` backed by the `kv_entries` table.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_entry(&self, key: &str) -> StoreResult<Option<DbEntry>> {
        let entry = sqlx::query_as::<_, DbEntry>(
            r#"
            SELECT key, value, updated_at
            FROM kv_entries
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(entry)
    }
}

#[async_trait]
impl KvStore for PgStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        tracing::debug!("Getting entry: key={}", key);
        let entry = self.get_entry(key).await?;
        Ok(entry.map(|entry| entry.value.0))
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Value>>> {
        tracing::debug!("Getting {} entries", keys.len());
        let entries = sqlx::query_as::<_, DbEntry>(
            r#"
            SELECT key, value, updated_at
            FROM kv_entries
            WHERE key = ANY($1)
            "#,
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut by_key: HashMap<String, Value> = entries
            .into_iter()
            .map(|entry| (entry.key, entry.value.0))
            .collect();

        Ok(keys.iter().map(|key| by_key.remove(key)).collect())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        tracing::debug!("Setting entry: key={}", key);
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key)
            DO UPDATE SET value = $2, updated_at = $3
            "#,
        )
        .bind(key)
        .bind(Json(value))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Value) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(Json(value))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        let written = result.rows_affected() == 1;
        tracing::debug!("Conditional set: key={}, written={}", key, written);
        Ok(written)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM kv_entries
            WHERE key = $1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn scan(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>(
            r#"
            SELECT key
            FROM kv_entries
            WHERE key LIKE $1 ESCAPE '\'
            ORDER BY key COLLATE "C" ASC
            "#,
        )
        .bind(like_prefix(prefix))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(keys)
    }
}

/// Builds a LIKE pattern matching every string that starts with `prefix`.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Splits sqlx failures into transient outages and everything else.
pub fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        other => StoreError::Backend(eyre::Report::new(other)),
    }
}
