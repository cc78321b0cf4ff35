//! Repository Module
//!
//! Data access layer for the orchestrator.
//! State is kept in key/value collections (`services`, `keys`, `intents`), each
//! backed by a `KeyValueStore`. `Collection<T>` gives typed access on top of
//! the raw JSON values.

pub mod file;
#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use file::JsonFileStore;
#[cfg(test)]
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub const SERVICES: &str = "services";
pub const KEYS: &str = "keys";
pub const INTENTS: &str = "intents";

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize or parse '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable mapping from string keys to JSON values
///
/// `set` and `delete` must be durable by the time they return. There is no
/// multi-key transaction.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn has(&self, key: &str) -> Result<bool>;

    /// Removes a key, returning whether it was present
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All stored values, in no particular order
    async fn values(&self) -> Result<Vec<Value>>;
}

/// Typed view over a key/value store
pub struct Collection<T> {
    store: Arc<dyn KeyValueStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(value) => decode(key, value).map(Some),
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, value).await
    }

    pub async fn has(&self, key: &str) -> Result<bool> {
        self.store.has(key).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(key).await
    }

    pub async fn values(&self) -> Result<Vec<T>> {
        self.store
            .values()
            .await?
            .into_iter()
            .map(|value| decode("<values>", value))
            .collect()
    }
}

/// The backing stores of every collection the orchestrator keeps
#[derive(Clone)]
pub struct Stores {
    pub services: Arc<dyn KeyValueStore>,
    pub keys: Arc<dyn KeyValueStore>,
    pub intents: Arc<dyn KeyValueStore>,
}

impl Stores {
    /// Non-durable stores, one fresh map per collection
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            services: Arc::new(MemoryStore::new()),
            keys: Arc::new(MemoryStore::new()),
            intents: Arc::new(MemoryStore::new()),
        }
    }

    /// One JSON snapshot file per collection under `dir`
    pub async fn open_files(dir: &std::path::Path) -> Result<Self> {
        Ok(Self {
            services: Arc::new(JsonFileStore::open(dir, SERVICES).await?),
            keys: Arc::new(JsonFileStore::open(dir, KEYS).await?),
            intents: Arc::new(JsonFileStore::open(dir, INTENTS).await?),
        })
    }

    /// Collections partitioned inside the shared Postgres `kv_store` table
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            services: Arc::new(PostgresStore::new(pool.clone(), SERVICES)),
            keys: Arc::new(PostgresStore::new(pool.clone(), KEYS)),
            intents: Arc::new(PostgresStore::new(pool, INTENTS)),
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })
}
