//! KV Store Module
//!
//! Key-value storage seam used by the report cache. Values are JSON strings with an
//! optional time-to-live. The generation lock is built on `add` (atomic
//! insert-if-absent) and `delete_if_value` (owner-checked release).

use crate::utils::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvOperationError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(String),
}

pub type KvResult<T> = Result<T, KvOperationError>;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Unconditional write; `ttl` of `None` never expires.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> KvResult<()>;

    /// Write only when no live value exists. Returns whether this call stored it.
    async fn add(&self, key: &str, value: String, ttl: Option<Duration>) -> KvResult<bool>;

    async fn delete(&self, key: &str) -> KvResult<()>;

    /// Delete only while the live value equals `expected`. Returns whether it deleted.
    async fn delete_if_value(&self, key: &str, expected: &str) -> KvResult<bool>;

    async fn contains(&self, key: &str) -> KvResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Typed JSON helpers over any [`KvStore`].
#[async_trait]
pub trait KvStoreExt: KvStore {
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> KvResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put_json<T: Serialize + Send + Sync + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> KvResult<()> {
        let serialized = serde_json::to_string(value)?;
        self.put(key, serialized, ttl).await
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

/// Process-local KV store with expiry, error simulation and an operation counter.
pub struct InMemoryKvStore {
    data: Mutex<HashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
    error_simulation: Mutex<Option<String>>,
    operation_count: Mutex<u32>,
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            clock,
            error_simulation: Mutex::new(None),
            operation_count: Mutex::new(0),
        }
    }

    /// Fail subsequent operations. Recognised kinds: `kv_get_failed`, `kv_put_failed`,
    /// `kv_delete_failed`; anything else fails every operation.
    pub fn simulate_error(&self, error_type: &str) {
        *self.error_simulation.lock() = Some(error_type.to_string());
    }

    pub fn reset_error_simulation(&self) {
        *self.error_simulation.lock() = None;
    }

    pub fn operation_count(&self) -> u32 {
        *self.operation_count.lock()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_utc();
        self.data.lock().values().filter(|v| v.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = self.clock.now_utc();
        let mut keys: Vec<String> = self
            .data
            .lock()
            .iter()
            .filter(|(k, v)| k.starts_with(prefix) && v.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn check_error(&self, operation: &str) -> KvResult<()> {
        *self.operation_count.lock() += 1;
        match self.error_simulation.lock().as_deref() {
            Some(error_type) => {
                let targeted = error_type.starts_with("kv_") && error_type.ends_with("_failed");
                if !targeted || error_type == format!("kv_{}_failed", operation) {
                    Err(KvOperationError::Storage(format!(
                        "KV {} operation failed",
                        operation
                    )))
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    fn expiry(&self, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        ttl.map(|ttl| self.clock.now_utc() + ttl)
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.check_error("get")?;
        let now = self.clock.now_utc();
        let mut data = self.data.lock();
        match data.get(key) {
            Some(stored) if stored.is_live(now) => Ok(Some(stored.value.clone())),
            Some(_) => {
                data.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> KvResult<()> {
        self.check_error("put")?;
        let expires_at = self.expiry(ttl);
        self.data
            .lock()
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn add(&self, key: &str, value: String, ttl: Option<Duration>) -> KvResult<bool> {
        self.check_error("put")?;
        let now = self.clock.now_utc();
        let expires_at = self.expiry(ttl);
        let mut data = self.data.lock();
        if data.get(key).map(|v| v.is_live(now)).unwrap_or(false) {
            return Ok(false);
        }
        data.insert(key.to_string(), StoredValue { value, expires_at });
        Ok(true)
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.check_error("delete")?;
        self.data.lock().remove(key);
        Ok(())
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> KvResult<bool> {
        self.check_error("delete")?;
        let now = self.clock.now_utc();
        let mut data = self.data.lock();
        match data.get(key) {
            Some(stored) if stored.is_live(now) && stored.value == expected => {
                data.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
