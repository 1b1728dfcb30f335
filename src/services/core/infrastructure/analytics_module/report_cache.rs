// src/services/core/infrastructure/analytics_module/report_cache.rs

//! Report Cache - memoized report payloads with single-flight generation
//!
//! Entries live in a [`ReportCacheStore`] keyed by report type and the SHA-256 of the
//! canonical parameters. A miss claims a generation lock with one atomic add-if-absent;
//! a concurrent caller that loses the claim gets a `GenerationConflict` and must retry.
//! The lock value is a per-generation owner id; release is owner-checked so a
//! generation that outlives its lock never frees a lock claimed after it. The lock
//! is released on every exit path, panics included.

use super::trend_analyzer::ReportBuilder;
use super::AnalyticsModuleConfig;
use crate::services::core::infrastructure::kv::{KvOperationError, KvStore, KvStoreExt};
use crate::types::{ReportParameters, ReportType};
use crate::utils::{AnalyticsError, AnalyticsResult, Clock};
use crate::{log_debug, log_info, log_warn};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const CACHE_PREFIX: &str = "report_cache";

/// Persisted cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCacheEntry {
    pub report_type: ReportType,
    pub parameters: ReportParameters,
    pub data: Value,
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_generating: bool,
}

impl ReportCacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        !self.is_generating && self.expires_at > now
    }
}

/// `report_cache:{report_type}:{sha256 of canonical parameters}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(report_type: ReportType, parameters: &ReportParameters) -> AnalyticsResult<Self> {
        let canonical = parameters.canonical_json()?;
        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
        Ok(CacheKey(format!(
            "{}:{}:{}",
            CACHE_PREFIX,
            report_type.as_str(),
            digest
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn lock_key(&self) -> String {
        format!("{}:lock", self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage for cache rows and their generation locks.
#[async_trait]
pub trait ReportCacheStore: Send + Sync {
    /// The entry under `key` if it is unexpired and not generating.
    async fn find_fresh(&self, key: &CacheKey) -> AnalyticsResult<Option<ReportCacheEntry>>;

    async fn save(&self, key: &CacheKey, entry: &ReportCacheEntry) -> AnalyticsResult<()>;

    /// Record the exported file name on an existing entry. Returns false when absent.
    async fn set_file_path(&self, key: &CacheKey, file_path: &str) -> AnalyticsResult<bool>;

    /// Atomically claim the generation lock for `owner`. Returns false when already held.
    async fn try_acquire_lock(
        &self,
        key: &CacheKey,
        owner: Uuid,
        timeout: Duration,
    ) -> AnalyticsResult<bool>;

    /// Release the lock if `owner` still holds it. Returns false when the lock expired
    /// or passed to another owner.
    async fn release_lock(&self, key: &CacheKey, owner: Uuid) -> AnalyticsResult<bool>;

    async fn lock_held(&self, key: &CacheKey) -> AnalyticsResult<bool>;
}

/// Cache rows and locks on one [`KvStore`].
pub struct KvReportCacheStore {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl KvReportCacheStore {
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    async fn load(&self, key: &CacheKey) -> AnalyticsResult<Option<ReportCacheEntry>> {
        match self.kv.get_json::<ReportCacheEntry>(key.as_str()).await {
            Ok(entry) => Ok(entry),
            Err(KvOperationError::Serialization(e)) => {
                log_warn!(
                    "Discarding unreadable report cache entry",
                    json!({"key": key.as_str(), "error": e.to_string()})
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remaining_ttl(&self, expires_at: DateTime<Utc>) -> Duration {
        let remaining = expires_at - self.clock.now_utc();
        if remaining > Duration::zero() {
            remaining
        } else {
            Duration::seconds(1)
        }
    }
}

#[async_trait]
impl ReportCacheStore for KvReportCacheStore {
    async fn find_fresh(&self, key: &CacheKey) -> AnalyticsResult<Option<ReportCacheEntry>> {
        let now = self.clock.now_utc();
        Ok(self.load(key).await?.filter(|entry| entry.is_fresh(now)))
    }

    async fn save(&self, key: &CacheKey, entry: &ReportCacheEntry) -> AnalyticsResult<()> {
        let ttl = self.remaining_ttl(entry.expires_at);
        self.kv.put_json(key.as_str(), entry, Some(ttl)).await?;
        Ok(())
    }

    async fn set_file_path(&self, key: &CacheKey, file_path: &str) -> AnalyticsResult<bool> {
        match self.load(key).await? {
            Some(mut entry) => {
                entry.file_path = Some(file_path.to_string());
                self.save(key, &entry).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn try_acquire_lock(
        &self,
        key: &CacheKey,
        owner: Uuid,
        timeout: Duration,
    ) -> AnalyticsResult<bool> {
        Ok(self
            .kv
            .add(&key.lock_key(), owner.to_string(), Some(timeout))
            .await?)
    }

    async fn release_lock(&self, key: &CacheKey, owner: Uuid) -> AnalyticsResult<bool> {
        Ok(self
            .kv
            .delete_if_value(&key.lock_key(), &owner.to_string())
            .await?)
    }

    async fn lock_held(&self, key: &CacheKey) -> AnalyticsResult<bool> {
        Ok(self.kv.contains(&key.lock_key()).await?)
    }
}

/// Counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub generations: u64,
    pub conflicts: u64,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    generations: AtomicU64,
    conflicts: AtomicU64,
}

/// Payload plus where it came from.
#[derive(Debug, Clone)]
pub struct CachedReport {
    pub key: CacheKey,
    pub data: Value,
    pub cache_hit: bool,
}

pub struct ReportCache {
    store: Arc<dyn ReportCacheStore>,
    builder: Arc<dyn ReportBuilder>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    lock_timeout: Duration,
    counters: CacheCounters,
}

impl ReportCache {
    pub fn new(
        store: Arc<dyn ReportCacheStore>,
        builder: Arc<dyn ReportBuilder>,
        clock: Arc<dyn Clock>,
        config: &AnalyticsModuleConfig,
    ) -> AnalyticsResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            builder,
            clock,
            ttl: config.cache_ttl()?,
            lock_timeout: config.lock_timeout()?,
            counters: CacheCounters::default(),
        })
    }

    /// Cached payload for `(report_type, parameters)`, generating it on a miss.
    pub async fn get_or_generate_report(
        &self,
        report_type: ReportType,
        parameters: &ReportParameters,
        force_refresh: bool,
    ) -> AnalyticsResult<Value> {
        Ok(self
            .get_or_generate(report_type, parameters, force_refresh)
            .await?
            .data)
    }

    pub async fn get_or_generate(
        &self,
        report_type: ReportType,
        parameters: &ReportParameters,
        force_refresh: bool,
    ) -> AnalyticsResult<CachedReport> {
        let parameters = parameters.normalized();
        let key = CacheKey::new(report_type, &parameters)?;

        if !force_refresh {
            if let Some(entry) = self.store.find_fresh(&key).await? {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                log_debug!("Report cache hit", json!({"key": key.as_str()}));
                return Ok(CachedReport {
                    key,
                    data: entry.data,
                    cache_hit: true,
                });
            }
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let owner = Uuid::new_v4();
        if !self
            .store
            .try_acquire_lock(&key, owner, self.lock_timeout)
            .await?
        {
            self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
            log_warn!(
                "Report generation already in progress",
                json!({"key": key.as_str(), "report_type": report_type.as_str()})
            );
            return Err(AnalyticsError::generation_conflict(
                "Report generation already in progress",
            ));
        }

        let outcome = AssertUnwindSafe(self.generate_and_store(&key, report_type, &parameters))
            .catch_unwind()
            .await;

        match self.store.release_lock(&key, owner).await {
            Ok(true) => {}
            Ok(false) => log_warn!(
                "Report generation outlived its lock",
                json!({"key": key.as_str(), "lock_timeout_seconds": self.lock_timeout.num_seconds()})
            ),
            Err(e) => log_warn!(
                "Failed to release report generation lock",
                json!({"key": key.as_str(), "error": e.message})
            ),
        }

        match outcome {
            Ok(result) => result.map(|data| CachedReport {
                key,
                data,
                cache_hit: false,
            }),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn generate_and_store(
        &self,
        key: &CacheKey,
        report_type: ReportType,
        parameters: &ReportParameters,
    ) -> AnalyticsResult<Value> {
        let data = self.builder.build_report(report_type, parameters).await?;

        let now = self.clock.now_utc();
        let entry = ReportCacheEntry {
            report_type,
            parameters: parameters.clone(),
            data,
            file_path: None,
            created_at: now,
            expires_at: now + self.ttl,
            is_generating: false,
        };
        self.store.save(key, &entry).await?;
        self.counters.generations.fetch_add(1, Ordering::Relaxed);

        log_info!(
            "Report generated and cached",
            json!({
                "key": key.as_str(),
                "report_type": report_type.as_str(),
                "expires_at": entry.expires_at.to_rfc3339(),
            })
        );
        Ok(entry.data)
    }

    /// Whether a generation currently holds the lock for these parameters.
    pub async fn is_generating(
        &self,
        report_type: ReportType,
        parameters: &ReportParameters,
    ) -> AnalyticsResult<bool> {
        let key = CacheKey::new(report_type, &parameters.normalized())?;
        self.store.lock_held(&key).await
    }

    /// Fails with `NotFoundError` when the entry expired or was never stored.
    pub async fn record_file_path(&self, key: &CacheKey, file_path: &str) -> AnalyticsResult<()> {
        if self.store.set_file_path(key, file_path).await? {
            Ok(())
        } else {
            Err(AnalyticsError::not_found(format!(
                "No report cache entry for {}",
                key
            )))
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            generations: self.counters.generations.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
        }
    }
}
