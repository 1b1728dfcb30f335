// src/services/core/infrastructure/analytics_module/mod.rs

//! Analytics Module - daily rollups, trend reports, cached exports and chart data
//!
//! ## Components:
//!
//! 1. **StatsAggregator** - per-day donation, request and inventory summaries
//! 2. **TrendAnalyzer** - the six report payloads built from stored summaries
//! 3. **ReportCache** - memoized payloads with a single-flight generation lock
//! 4. **Exporter** - json, excel and pdf artifacts
//! 5. **ChartBuilder** - label/series structures for the presentation layer
//! 6. **AnalyticsCoordinator** - wires the above behind request-level operations

pub mod analytics_coordinator;
pub mod chart_builder;
pub mod exporter;
pub mod report_cache;
pub mod stats_aggregator;
pub mod time_series;
pub mod trend_analyzer;

pub use analytics_coordinator::{AnalyticsCoordinator, ReportResponse};
pub use chart_builder::{
    ChartBuilder, ChartData, ChartDataset, ChartKind, ChartQuery, ChartRequest, ChartType,
};
pub use exporter::{ExportArtifact, Exporter};
pub use report_cache::{
    CacheKey, CacheStats, CachedReport, KvReportCacheStore, ReportCache, ReportCacheEntry,
    ReportCacheStore,
};
pub use stats_aggregator::{DailyRollup, StatsAggregator};
pub use trend_analyzer::{ReportBuilder, TrendAnalyzer};

use crate::log_warn;
use crate::utils::{AnalyticsError, AnalyticsResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;

const MAX_CACHE_TTL_HOURS: u64 = 24 * 365;
const MAX_LOCK_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;
const MAX_RANGE_DAYS_LIMIT: i64 = 10 * 365;

/// Analytics Module Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsModuleConfig {
    // Report cache
    pub cache_ttl_hours: u64,
    pub lock_timeout_seconds: u64,

    // Trend analysis
    pub trend_threshold: f64,
    pub max_range_days: i64,
    pub forecast_horizon_days: u32,
    pub forecast_chart_history_days: u32,

    // Inventory
    pub low_stock_threshold: u64,
}

impl Default for AnalyticsModuleConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            lock_timeout_seconds: 300,
            trend_threshold: 0.1,
            max_range_days: 365,
            forecast_horizon_days: 7,
            forecast_chart_history_days: 30,
            low_stock_threshold: 5,
        }
    }
}

impl AnalyticsModuleConfig {
    /// Shorter cache lifetime and lock timeout for busy deployments
    pub fn high_performance() -> Self {
        Self {
            cache_ttl_hours: 6,
            lock_timeout_seconds: 120,
            ..Self::default()
        }
    }

    /// Longer cache lifetime and a generous lock timeout for slow backends
    pub fn high_reliability() -> Self {
        Self {
            cache_ttl_hours: 48,
            lock_timeout_seconds: 600,
            ..Self::default()
        }
    }

    /// Defaults overridden by `ANALYTICS_*` environment variables.
    pub fn from_env() -> AnalyticsResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> AnalyticsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        override_from(&lookup, "ANALYTICS_CACHE_TTL_HOURS", &mut config.cache_ttl_hours);
        override_from(
            &lookup,
            "ANALYTICS_LOCK_TIMEOUT_SECONDS",
            &mut config.lock_timeout_seconds,
        );
        override_from(&lookup, "ANALYTICS_TREND_THRESHOLD", &mut config.trend_threshold);
        override_from(&lookup, "ANALYTICS_MAX_RANGE_DAYS", &mut config.max_range_days);
        override_from(
            &lookup,
            "ANALYTICS_FORECAST_HORIZON_DAYS",
            &mut config.forecast_horizon_days,
        );
        override_from(
            &lookup,
            "ANALYTICS_FORECAST_HISTORY_DAYS",
            &mut config.forecast_chart_history_days,
        );
        override_from(
            &lookup,
            "ANALYTICS_LOW_STOCK_THRESHOLD",
            &mut config.low_stock_threshold,
        );
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.cache_ttl_hours == 0 {
            return Err(AnalyticsError::configuration_error(
                "cache_ttl_hours must be greater than 0",
            ));
        }
        if self.cache_ttl_hours > MAX_CACHE_TTL_HOURS {
            return Err(AnalyticsError::configuration_error(format!(
                "cache_ttl_hours cannot exceed {}",
                MAX_CACHE_TTL_HOURS
            )));
        }
        if self.lock_timeout_seconds == 0 {
            return Err(AnalyticsError::configuration_error(
                "lock_timeout_seconds must be greater than 0",
            ));
        }
        if self.lock_timeout_seconds > MAX_LOCK_TIMEOUT_SECONDS {
            return Err(AnalyticsError::configuration_error(format!(
                "lock_timeout_seconds cannot exceed {}",
                MAX_LOCK_TIMEOUT_SECONDS
            )));
        }
        if !self.trend_threshold.is_finite() || self.trend_threshold < 0.0 {
            return Err(AnalyticsError::configuration_error(
                "trend_threshold must be a non-negative number",
            ));
        }
        if self.max_range_days <= 0 || self.max_range_days > MAX_RANGE_DAYS_LIMIT {
            return Err(AnalyticsError::configuration_error(format!(
                "max_range_days must be between 1 and {}",
                MAX_RANGE_DAYS_LIMIT
            )));
        }
        if self.forecast_horizon_days == 0
            || i64::from(self.forecast_horizon_days) > self.max_range_days
        {
            return Err(AnalyticsError::configuration_error(
                "forecast_horizon_days must be between 1 and max_range_days",
            ));
        }
        if self.forecast_chart_history_days == 0
            || i64::from(self.forecast_chart_history_days) > self.max_range_days
        {
            return Err(AnalyticsError::configuration_error(
                "forecast_chart_history_days must be between 1 and max_range_days",
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> AnalyticsResult<Duration> {
        i64::try_from(self.cache_ttl_hours)
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| AnalyticsError::configuration_error("cache_ttl_hours is out of range"))
    }

    pub fn lock_timeout(&self) -> AnalyticsResult<Duration> {
        i64::try_from(self.lock_timeout_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                AnalyticsError::configuration_error("lock_timeout_seconds is out of range")
            })
    }
}

fn override_from<F, T>(lookup: &F, name: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => log_warn!(
                "Ignoring unparseable configuration value",
                json!({"variable": name, "value": raw})
            ),
        }
    }
}
