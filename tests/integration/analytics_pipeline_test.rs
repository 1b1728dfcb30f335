#[path = "../common/mod.rs"]
mod common;

use bloodbank_analytics::handlers::{
    handle_chart_data, handle_daily_aggregation, handle_dashboard_metrics, handle_generate_report,
};
use bloodbank_analytics::responses::ResponseStatus;
use bloodbank_analytics::services::core::infrastructure::analytics_module::{
    ChartRequest, ExportArtifact, ReportCacheEntry,
};
use bloodbank_analytics::services::core::infrastructure::kv::KvStoreExt;
use bloodbank_analytics::types::{
    BloodGroup, DonationStatus, ExportFormat, ReportParameters, ReportRequest, ReportType,
    RequestStatus,
};
use common::*;

/// Five days of rising donations and a few requests, 2024-03-11..=2024-03-15.
fn seeded_harness() -> TestHarness {
    let harness = TestHarness::new(date(2024, 3, 15));
    let mut id = 0;
    for (offset, count) in [1u32, 2, 3, 4, 5].iter().enumerate() {
        let day = date(2024, 3, 11 + offset as u32);
        for n in 0..*count {
            id += 1;
            let status = if n == 0 {
                DonationStatus::Rejected
            } else {
                DonationStatus::Approved
            };
            harness
                .source
                .add_donation(donation(id, day, BloodGroup::OPositive, status));
        }
        harness.source.add_request(request(
            id,
            day,
            BloodGroup::ANegative,
            offset % 2 == 0,
            RequestStatus::Fulfilled,
        ));
    }
    harness
        .source
        .set_inventory(inventory(BloodGroup::OPositive, 14, false));
    harness
        .source
        .set_inventory(inventory(BloodGroup::ANegative, 3, true));
    harness
}

async fn aggregate_week(harness: &TestHarness) {
    let coordinator = harness.coordinator();
    for day in 11..=15 {
        let label = format!("2024-03-{}", day);
        let response = handle_daily_aggregation(&coordinator, Some(label.as_str())).await;
        assert_eq!(response.status_code, 200);
    }
}

fn week_request(report_type: &str) -> ReportRequest {
    ReportRequest {
        report_type: Some(report_type.to_string()),
        start_date: Some("2024-03-11".to_string()),
        end_date: Some("2024-03-15".to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod report_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_aggregate_then_report() {
        let harness = seeded_harness();
        aggregate_week(&harness).await;
        let coordinator = harness.coordinator();

        let response = handle_generate_report(&coordinator, &week_request("donation_trends"), false).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body.status, ResponseStatus::Success);
        let data = response.body.data.unwrap();
        assert_eq!(data["cache_hit"], false);

        let report = &data["report"];
        assert_eq!(report["summary"]["total_donations"], 15);
        assert_eq!(report["summary"]["successful_donations"], 10);
        assert_eq!(report["summary"]["total_trend"], "increasing");
        assert_eq!(report["analysis"]["peak_day"], "2024-03-15");
        assert_eq!(report["analysis"]["lowest_day"], "2024-03-11");
        assert_eq!(
            report["analysis"]["blood_type_insights"]["O+"]["total"],
            15
        );

        let again = handle_generate_report(&coordinator, &week_request("donation_trends"), false).await;
        assert_eq!(again.body.data.unwrap()["cache_hit"], true);
        assert_eq!(coordinator.cache_stats().generations, 1);
    }

    #[tokio::test]
    async fn test_excel_export_records_filename() {
        let harness = seeded_harness();
        aggregate_week(&harness).await;
        let coordinator = harness.coordinator();

        let parameters = ReportParameters::new(date(2024, 3, 11), date(2024, 3, 15))
            .with_format(ExportFormat::Excel);
        let response = coordinator
            .generate_report(ReportType::RequestSummary, &parameters, false)
            .await
            .unwrap();

        assert!(matches!(response.artifact, ExportArtifact::Excel(_)));
        assert_eq!(
            response.filename.as_deref(),
            Some("report_20240315_120000.xlsx")
        );
        let entry: ReportCacheEntry = harness
            .kv
            .get_json(&response.cache_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.file_path, response.filename);
        assert_eq!(entry.data["summary"]["total_requests"], 5);
        assert_eq!(entry.data["summary"]["fulfillment_rate"], 100.0);
    }

    #[tokio::test]
    async fn test_pdf_handler_returns_attachment() {
        let harness = seeded_harness();
        aggregate_week(&harness).await;
        let coordinator = harness.coordinator();

        let request = ReportRequest {
            format: Some("pdf".to_string()),
            ..week_request("inventory_summary")
        };
        let response = handle_generate_report(&coordinator, &request, false).await;
        assert_eq!(response.status_code, 200);
        let attachment = response.attachment.unwrap();
        assert_eq!(attachment.content_type, "application/pdf");
        assert!(attachment.filename.ends_with(".pdf"));
        assert!(attachment.bytes.starts_with(b"%PDF"));
        let data = response.body.data.unwrap();
        assert_eq!(data["file"]["size_bytes"], attachment.bytes.len());
    }

    #[tokio::test]
    async fn test_empty_range_report() {
        let harness = TestHarness::new(date(2024, 3, 15));
        let coordinator = harness.coordinator();

        let response = handle_generate_report(&coordinator, &week_request("request_summary"), false).await;
        assert_eq!(response.status_code, 200);
        let report = &response.body.data.unwrap()["report"];
        assert_eq!(report["summary"]["total_requests"], 0);
        assert_eq!(report["summary"]["fulfillment_rate"], 0.0);
    }
}

#[cfg(test)]
mod request_error_tests {
    use super::*;

    #[tokio::test]
    async fn test_validation_errors_are_collected() {
        let harness = TestHarness::new(date(2024, 3, 15));
        let coordinator = harness.coordinator();

        let request = ReportRequest {
            report_type: Some("weekly_digest".to_string()),
            start_date: Some("2024-03-10".to_string()),
            end_date: Some("2024-03-01".to_string()),
            format: Some("docx".to_string()),
            ..Default::default()
        };
        let response = handle_generate_report(&coordinator, &request, false).await;

        assert_eq!(response.status_code, 400);
        assert_eq!(response.body.status, ResponseStatus::Error);
        assert!(response.body.data.is_none());
        let errors = response.body.errors.unwrap();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.starts_with("report_type:")));
        assert!(errors.iter().any(|e| e.starts_with("format:")));
        assert!(errors.iter().any(|e| e == "End date must be after start date"));
    }

    #[tokio::test]
    async fn test_range_limit() {
        let harness = TestHarness::new(date(2024, 3, 15));
        let coordinator = harness.coordinator();
        let request = ReportRequest {
            start_date: Some("2023-01-01".to_string()),
            end_date: Some("2024-02-05".to_string()),
            ..week_request("donation_summary")
        };
        let response = handle_generate_report(&coordinator, &request, false).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.body.errors,
            Some(vec!["Date range cannot exceed 365 days".to_string()])
        );
    }

    #[tokio::test]
    async fn test_bad_aggregation_date() {
        let harness = TestHarness::new(date(2024, 3, 15));
        let response = handle_daily_aggregation(&harness.coordinator(), Some("15/03/2024")).await;
        assert_eq!(response.status_code, 400);
    }
}

#[cfg(test)]
mod dashboard_and_chart_tests {
    use super::*;

    #[tokio::test]
    async fn test_dashboard_envelope() {
        let harness = seeded_harness();
        let response = handle_dashboard_metrics(&harness.coordinator()).await;
        assert_eq!(response.status_code, 200);
        let data = response.body.data.unwrap();
        // 2024-03-15 is a Friday: the week began on Monday the 11th
        assert_eq!(data["donations_today"], 5);
        assert_eq!(data["donations_this_week"], 15);
        assert_eq!(data["requests_this_month"], 5);
        assert_eq!(data["critical_inventory"]["A-"], 3);
    }

    #[tokio::test]
    async fn test_chart_handler() {
        let harness = seeded_harness();
        aggregate_week(&harness).await;
        let coordinator = harness.coordinator();

        let request = ChartRequest {
            chart_type: Some("blood_type_distribution".to_string()),
            ..Default::default()
        };
        let response = handle_chart_data(&coordinator, &request).await;
        assert_eq!(response.status_code, 200);
        let chart = response.body.data.unwrap();
        assert_eq!(chart["type"], "doughnut");
        assert_eq!(chart["labels"], serde_json::json!(["A-", "O+"]));
        assert_eq!(chart["datasets"][0]["data"], serde_json::json!([3.0, 14.0]));

        let missing_blood_type = ChartRequest {
            chart_type: Some("inventory_forecast".to_string()),
            ..Default::default()
        };
        let response = handle_chart_data(&coordinator, &missing_blood_type).await;
        assert_eq!(response.status_code, 400);
    }
}
