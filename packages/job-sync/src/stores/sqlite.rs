//! SQLite storage implementation.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Hosts that already ship a database file
//! - Large tracked-job histories
//! - Testing with persistent data

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::KeyValueStore;

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(Box::new(e))
}

/// SQLite-backed key-value store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://./trackruit.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Limited to one connection: every in-memory connection is its own
    /// database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode(key: &str, raw: &str) -> StoreResult<Value> {
    serde_json::from_str(raw).map_err(|e| StoreError::serde(key, e))
}

fn encode(key: &str, value: &Value) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::serde(key, e))
}

const UPSERT: &str = r#"
    INSERT INTO kv (key, value) VALUES (?, ?)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#;

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|(raw,)| decode(key, &raw)).transpose()
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let raw = encode(key, &value)?;
        sqlx::query(UPSERT)
            .bind(key)
            .bind(raw)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> StoreResult<()> {
        let encoded = entries
            .iter()
            .map(|(key, value)| Ok((key.as_str(), encode(key, value)?)))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for (key, raw) in encoded {
            sqlx::query(UPSERT)
                .bind(key)
                .bind(raw)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn snapshot(&self) -> StoreResult<Map<String, Value>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM kv ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(key, raw)| {
                let value = decode(&key, &raw)?;
                Ok((key, value))
            })
            .collect()
    }
}
