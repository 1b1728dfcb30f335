// src/services/core/infrastructure/mod.rs

//! Infrastructure Services Module
//!
//! ## Modules:
//! 1. **KV** - key-value store seam with TTL and atomic add-if-absent
//! 2. **Database Repositories** - source records and stored daily summaries
//! 3. **Analytics Module** - aggregation, trend reports, report cache, export and charts

pub mod analytics_module;
pub mod database_repositories;
pub mod kv;

pub use analytics_module::{AnalyticsCoordinator, AnalyticsModuleConfig};
pub use database_repositories::{
    InMemorySourceRepository, InMemoryStatsRepository, SourceRepository, StatsRepository,
};
pub use kv::{InMemoryKvStore, KvOperationError, KvStore, KvStoreExt};
