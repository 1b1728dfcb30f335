// src/services/mod.rs

// Core services organized by domain
pub mod core;

pub use core::infrastructure::analytics_module::{
    AnalyticsCoordinator, ChartBuilder, Exporter, ReportCache, StatsAggregator, TrendAnalyzer,
};
