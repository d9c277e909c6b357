//! Key-value store access
//!
//! The transport only needs `get`/`set`/`delete` on string values. Redis is
//! the production backend; [`MemoryStore`] backs tests and the simulator.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, IntoConnectionInfo};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Backend unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored value has the wrong shape
    #[error("Invalid value at {key}: {reason}")]
    InvalidValue {
        /// Key read
        key: String,
        /// Parse failure
        reason: String,
    },
}

/// Minimal async key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a value; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Redis-backed store
#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
}

impl RedisStore {
    /// Wrap an existing connection manager
    pub fn new(redis: ConnectionManager) -> Self {
        RedisStore { redis }
    }

    /// Connect to `url`, selecting logical database `db`
    pub async fn connect(url: &str, db: i64) -> Result<Self, StoreError> {
        let mut info = url.into_connection_info()?;
        info.redis.db = db;

        let client = redis::Client::open(info)?;
        let redis = ConnectionManager::new(client).await?;
        info!("Connected to Redis at {} (db {})", url, db);

        Ok(RedisStore { redis })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.redis.clone().get::<_, Option<String>>(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        match ttl {
            Some(ttl) => {
                let _: () = self
                    .redis
                    .clone()
                    .set_ex(key, value, ttl.as_secs().max(1))
                    .await?;
            }
            None => {
                let _: () = self.redis.clone().set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed: u64 = self.redis.clone().del(key).await?;
        Ok(removed > 0)
    }
}

/// In-process store with TTL support on the tokio clock
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
    unavailable: Mutex<bool>,
}

impl MemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    /// Live keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, (_, expires))| expires.map_or(true, |at| at > now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if *self.unavailable.lock() {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some((_, Some(at))) => *at <= Instant::now(),
            _ => false,
        };
        if expired {
            entries.remove(key);
        }

        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check_available()?;
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .remove(key)
            .map_or(false, |(_, expires)| expires.map_or(true, |at| at > now)))
    }
}
