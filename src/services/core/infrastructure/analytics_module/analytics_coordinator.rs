// src/services/core/infrastructure/analytics_module/analytics_coordinator.rs

//! Analytics Coordinator - request-level orchestration of the analytics components
//!
//! Report flow: validate -> get-or-generate through the cache -> export. Non-json
//! exports get a timestamped filename which is recorded on the cache entry.

use super::chart_builder::{ChartBuilder, ChartData, ChartRequest};
use super::exporter::{ExportArtifact, Exporter};
use super::report_cache::{CacheStats, KvReportCacheStore, ReportCache};
use super::stats_aggregator::{DailyRollup, StatsAggregator};
use super::trend_analyzer::TrendAnalyzer;
use super::AnalyticsModuleConfig;
use crate::services::core::infrastructure::database_repositories::{
    SourceRepository, StatsRepository,
};
use crate::services::core::infrastructure::kv::KvStore;
use crate::types::{DashboardMetrics, ExportFormat, ReportParameters, ReportRequest, ReportType};
use crate::utils::logger::logger;
use crate::utils::{AnalyticsResult, Clock};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one report request.
#[derive(Debug, Clone)]
pub struct ReportResponse {
    pub request_id: Uuid,
    pub report_type: ReportType,
    pub parameters: ReportParameters,
    pub cache_key: String,
    pub cache_hit: bool,
    pub artifact: ExportArtifact,
    /// Set for excel and pdf exports.
    pub filename: Option<String>,
    pub generated_at: DateTime<Utc>,
}

pub struct AnalyticsCoordinator {
    config: AnalyticsModuleConfig,
    aggregator: StatsAggregator,
    cache: ReportCache,
    exporter: Exporter,
    charts: ChartBuilder,
    clock: Arc<dyn Clock>,
}

impl AnalyticsCoordinator {
    pub fn new(
        source: Arc<dyn SourceRepository>,
        stats: Arc<dyn StatsRepository>,
        kv: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        config: AnalyticsModuleConfig,
    ) -> AnalyticsResult<Self> {
        config.validate()?;

        let analyzer = Arc::new(TrendAnalyzer::new(stats.clone(), &config));
        let store = Arc::new(KvReportCacheStore::new(kv, clock.clone()));

        Ok(Self {
            aggregator: StatsAggregator::new(source, stats.clone(), clock.clone()),
            cache: ReportCache::new(store, analyzer, clock.clone(), &config)?,
            exporter: Exporter::new(),
            charts: ChartBuilder::new(stats, clock.clone(), &config),
            clock,
            config,
        })
    }

    /// Validate a raw request, then produce its report.
    pub async fn handle_report_request(
        &self,
        request: &ReportRequest,
        force_refresh: bool,
    ) -> AnalyticsResult<ReportResponse> {
        let (report_type, parameters) = request.validate(self.config.max_range_days)?;
        self.generate_report(report_type, &parameters, force_refresh)
            .await
    }

    pub async fn generate_report(
        &self,
        report_type: ReportType,
        parameters: &ReportParameters,
        force_refresh: bool,
    ) -> AnalyticsResult<ReportResponse> {
        parameters.validate(self.config.max_range_days)?;
        let parameters = parameters.normalized();
        let request_id = Uuid::new_v4();
        let request_log = logger().child(HashMap::from([(
            "request_id".to_string(),
            json!(request_id.to_string()),
        )]));

        let cached = self
            .cache
            .get_or_generate(report_type, &parameters, force_refresh)
            .await?;
        let artifact = self.exporter.export_report(&cached.data, parameters.format)?;
        let generated_at = self.clock.now_utc();

        let filename = match parameters.format {
            ExportFormat::Json => None,
            ExportFormat::Excel | ExportFormat::Pdf => {
                let filename = artifact.filename(generated_at);
                if let Err(e) = self.cache.record_file_path(&cached.key, &filename).await {
                    request_log.warn_with_meta(
                        "Failed to record export filename",
                        Some(&json!({"filename": filename, "error": e.message})),
                    );
                }
                Some(filename)
            }
        };

        request_log.info_with_meta(
            "Report request completed",
            Some(&json!({
                "report_type": report_type.as_str(),
                "format": parameters.format.as_str(),
                "cache_hit": cached.cache_hit,
            })),
        );

        Ok(ReportResponse {
            request_id,
            report_type,
            cache_key: cached.key.as_str().to_string(),
            cache_hit: cached.cache_hit,
            artifact,
            filename,
            generated_at,
            parameters,
        })
    }

    /// Daily aggregation entry point for an external scheduler.
    pub async fn run_daily_aggregation(&self, date: Option<NaiveDate>) -> AnalyticsResult<DailyRollup> {
        self.aggregator.generate_daily_stats(date).await
    }

    pub async fn chart(&self, request: &ChartRequest) -> AnalyticsResult<ChartData> {
        let query = request.validate(self.config.max_range_days)?;
        self.charts.build(&query).await
    }

    pub async fn dashboard_metrics(&self) -> AnalyticsResult<DashboardMetrics> {
        self.aggregator.dashboard_metrics().await
    }

    pub async fn is_generating(
        &self,
        report_type: ReportType,
        parameters: &ReportParameters,
    ) -> AnalyticsResult<bool> {
        self.cache.is_generating(report_type, parameters).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn config(&self) -> &AnalyticsModuleConfig {
        &self.config
    }
}
