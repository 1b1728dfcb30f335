#[path = "../../common/mod.rs"]
mod common;

use bloodbank_analytics::services::core::infrastructure::analytics_module::{
    AnalyticsModuleConfig, TrendAnalyzer,
};
use bloodbank_analytics::services::core::infrastructure::database_repositories::{
    DonationStatsRow, InMemoryStatsRepository, StatsRepository, StoredJson,
};
use bloodbank_analytics::types::{GroupBy, ReportParameters, ReportType};
use bloodbank_analytics::utils::ErrorKind;
use common::*;
use serde_json::json;
use std::sync::Arc;

async fn seeded_donations(totals: &[u64]) -> Arc<InMemoryStatsRepository> {
    let stats = Arc::new(InMemoryStatsRepository::new());
    for (offset, total) in totals.iter().enumerate() {
        let day = date(2024, 3, 1 + offset as u32);
        stats
            .upsert_donation_stats(&donation_stats(day, *total, *total, 0))
            .await
            .unwrap();
    }
    stats
}

fn analyzer(stats: Arc<InMemoryStatsRepository>) -> TrendAnalyzer {
    TrendAnalyzer::new(stats, &AnalyticsModuleConfig::default())
}

fn march(start: u32, end: u32) -> ReportParameters {
    ReportParameters::new(date(2024, 3, start), date(2024, 3, end))
}

#[cfg(test)]
mod classification_tests {
    use super::*;

    async fn total_trend(totals: &[u64]) -> String {
        let report = analyzer(seeded_donations(totals).await)
            .generate_report(ReportType::DonationTrends, &march(1, 31))
            .await
            .unwrap();
        report["summary"]["total_trend"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_increasing_series() {
        assert_eq!(total_trend(&[1, 2, 3, 4, 5]).await, "increasing");
    }

    #[tokio::test]
    async fn test_flat_series() {
        assert_eq!(total_trend(&[3, 3, 3, 3]).await, "stable");
    }

    #[tokio::test]
    async fn test_decreasing_series() {
        assert_eq!(total_trend(&[5, 4, 3, 2, 1]).await, "decreasing");
    }
}

#[cfg(test)]
mod report_shape_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_range_returns_zeroed_payload() {
        let analyzer = analyzer(Arc::new(InMemoryStatsRepository::new()));

        let summary = analyzer
            .generate_report(ReportType::DonationSummary, &march(1, 7))
            .await
            .unwrap();
        assert_eq!(summary["summary"]["total_donations"], 0);
        assert_eq!(summary["summary"]["success_rate"], 0.0);
        assert_eq!(summary["trends"]["labels"], json!([]));
        assert_eq!(summary["blood_type_breakdown"], json!({}));

        let trends = analyzer
            .generate_report(ReportType::RequestTrends, &march(1, 7))
            .await
            .unwrap();
        assert_eq!(trends["summary"]["request_trend"], "insufficient_data");
        assert!(trends["analysis"]["peak_day"].is_null());
        assert!(trends["analysis"]["most_urgent_day"].is_null());
    }

    #[tokio::test]
    async fn test_weekly_grouping_sums_and_fills_gaps() {
        let stats = Arc::new(InMemoryStatsRepository::new());
        for (day, total) in [(4, 2), (6, 3), (20, 1)] {
            stats
                .upsert_donation_stats(&donation_stats(date(2024, 3, day), total, total, 0))
                .await
                .unwrap();
        }

        let report = analyzer(stats)
            .generate_report(
                ReportType::DonationSummary,
                &march(1, 31).with_group_by(GroupBy::Week),
            )
            .await
            .unwrap();

        assert_eq!(
            report["trends"]["labels"],
            json!(["2024-03-10", "2024-03-17", "2024-03-24"])
        );
        assert_eq!(report["trends"]["total_donations"], json!([5, 0, 1]));
        assert_eq!(report["summary"]["total_donations"], 6);
        assert_eq!(report["summary"]["success_rate"], 100.0);
    }

    #[tokio::test]
    async fn test_blood_type_filter_limits_breakdown() {
        let stats = seeded_donations(&[4, 6]).await;
        let analyzer = analyzer(stats);

        let unfiltered = analyzer
            .generate_report(ReportType::DonationSummary, &march(1, 2))
            .await
            .unwrap();
        assert_eq!(unfiltered["blood_type_breakdown"]["O+"]["total"], 10);

        let filtered = analyzer
            .generate_report(
                ReportType::DonationSummary,
                &march(1, 2).with_blood_types(["A+"]),
            )
            .await
            .unwrap();
        assert_eq!(filtered["blood_type_breakdown"], json!({}));
    }

    #[tokio::test]
    async fn test_malformed_breakdown_is_skipped() {
        let stats = seeded_donations(&[2]).await;
        stats.insert_raw_donation_row(DonationStatsRow {
            date: date(2024, 3, 2),
            total_donations: 5,
            successful_donations: 4,
            rejected_donations: 1,
            blood_type_breakdown: StoredJson::encoded("{not json"),
        });

        let report = analyzer(stats)
            .generate_report(ReportType::DonationSummary, &march(1, 2))
            .await
            .unwrap();
        assert_eq!(report["summary"]["total_donations"], 7);
        assert_eq!(report["blood_type_breakdown"]["O+"]["total"], 2);
    }

    #[tokio::test]
    async fn test_request_trends_analysis() {
        let stats = Arc::new(InMemoryStatsRepository::new());
        stats
            .upsert_request_stats(&request_stats(date(2024, 3, 1), 4, 2, 1, 1))
            .await
            .unwrap();
        stats
            .upsert_request_stats(&request_stats(date(2024, 3, 2), 8, 8, 0, 3))
            .await
            .unwrap();

        let report = analyzer(stats)
            .generate_report(ReportType::RequestTrends, &march(1, 2))
            .await
            .unwrap();
        assert_eq!(report["summary"]["total_requests"], 12);
        assert_eq!(report["summary"]["fulfillment_rate"], 83.33);
        assert_eq!(report["summary"]["fulfillment_trend"], "improving");
        assert_eq!(report["analysis"]["peak_day"], "2024-03-02");
        assert_eq!(report["analysis"]["most_urgent_day"], "2024-03-02");
        assert_eq!(report["analysis"]["urgency_analysis"]["urgent"], 4);
        assert_eq!(report["analysis"]["urgency_analysis"]["normal"], 8);
        assert_eq!(report["trends"]["datasets"][4]["data"], json!([50.0, 100.0]));
    }

    #[tokio::test]
    async fn test_rate_trend_uses_unrounded_rates() {
        // 66.666.. -> 66.774..: displayed as 66.67 -> 66.77, an actual rise above 0.1
        let stats = Arc::new(InMemoryStatsRepository::new());
        stats
            .upsert_request_stats(&request_stats(date(2024, 3, 1), 3, 2, 1, 0))
            .await
            .unwrap();
        stats
            .upsert_request_stats(&request_stats(date(2024, 3, 2), 310, 207, 103, 0))
            .await
            .unwrap();

        let report = analyzer(stats)
            .generate_report(ReportType::RequestTrends, &march(1, 2))
            .await
            .unwrap();
        assert_eq!(report["summary"]["fulfillment_trend"], "improving");
        assert_eq!(report["trends"]["datasets"][4]["data"], json!([66.67, 66.77]));
    }

    #[tokio::test]
    async fn test_inventory_summary_critical_levels() {
        let stats = Arc::new(InMemoryStatsRepository::new());
        stats
            .upsert_inventory_snapshot(&inventory_snapshot(date(2024, 3, 1), &[("A+", 10), ("O-", 8)]))
            .await
            .unwrap();
        stats
            .upsert_inventory_snapshot(&inventory_snapshot(date(2024, 3, 2), &[("A+", 9), ("O-", 2)]))
            .await
            .unwrap();

        let report = analyzer(stats)
            .generate_report(ReportType::InventorySummary, &march(1, 2))
            .await
            .unwrap();
        assert_eq!(report["summary"]["total_units"], 11);
        assert_eq!(report["summary"]["critical_levels"], json!({"O-": 2}));
        assert_eq!(report["trends"]["datasets"][0]["label"], "A+ Inventory Level");
        assert_eq!(report["trends"]["datasets"][0]["data"], json!([10, 9]));
    }

    #[tokio::test]
    async fn test_inventory_forecast_projects_line() {
        let stats = Arc::new(InMemoryStatsRepository::new());
        for (day, level) in [(1, 10), (2, 8), (3, 6)] {
            stats
                .upsert_inventory_snapshot(&inventory_snapshot(date(2024, 3, day), &[("A+", level)]))
                .await
                .unwrap();
        }

        let report = analyzer(stats)
            .generate_report(
                ReportType::InventoryForecast,
                &march(1, 3).with_blood_types(["A+", "B+"]),
            )
            .await
            .unwrap();

        assert_eq!(report["summary"]["horizon_days"], 7);
        let a_pos = &report["forecasts"]["A+"];
        assert_eq!(a_pos["trend"]["direction"], "decreasing");
        assert_eq!(a_pos["forecast"]["dates"][0], "2024-03-04");
        assert_eq!(a_pos["forecast"]["values"][0], 4.0);
        // B+ has no recorded level, so its series is all zeros
        assert_eq!(report["forecasts"]["B+"]["trend"]["direction"], "stable");
        assert_eq!(report["summary"]["series_with_data"], 2);
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let err = analyzer(Arc::new(InMemoryStatsRepository::new()))
            .generate_report(
                ReportType::DonationSummary,
                &ReportParameters::new(date(2024, 3, 10), date(2024, 3, 1)),
            )
            .await
            .unwrap_err();
        assert!(err.is_kind(ErrorKind::ValidationError));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_range_over_limit_rejected() {
        let start = date(2024, 1, 1);
        let end = start + chrono::Duration::days(400);
        let err = analyzer(Arc::new(InMemoryStatsRepository::new()))
            .generate_report(ReportType::RequestSummary, &ReportParameters::new(start, end))
            .await
            .unwrap_err();
        assert!(err.is_kind(ErrorKind::ValidationError));
        assert!(err.error_list()[0].contains("365"));
    }
}
