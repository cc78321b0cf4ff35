//! Postgres key/value store
//!
//! All collections share the `kv_store` table, partitioned by collection name.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use super::{KeyValueStore, Result};

pub struct PostgresStore {
    pool: PgPool,
    collection: String,
}

impl PostgresStore {
    pub fn new(pool: PgPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl KeyValueStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<(Value,)> = sqlx::query_as(
            r#"
            SELECT value
            FROM kv_store
            WHERE collection = $1 AND key = $2
            "#,
        )
        .bind(&self.collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (collection, key, value, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (collection, key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&self.collection)
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM kv_store WHERE collection = $1 AND key = $2)",
        )
        .bind(&self.collection)
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE collection = $1 AND key = $2")
            .bind(&self.collection)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn values(&self) -> Result<Vec<Value>> {
        let rows: Vec<(Value,)> = sqlx::query_as(
            r#"
            SELECT value
            FROM kv_store
            WHERE collection = $1
            ORDER BY key
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(value,)| value).collect())
    }
}
