//! Framework-agnostic analytics handlers. Each returns a status code and the
//! `{status, message, data | errors}` envelope; binary exports also carry an attachment.

use crate::responses::ApiResponse;
use crate::services::core::infrastructure::analytics_module::{
    AnalyticsCoordinator, ChartRequest, ExportArtifact,
};
use crate::types::ReportRequest;
use crate::utils::{AnalyticsError, AnalyticsResult};
use crate::{log_error, log_warn};
use chrono::NaiveDate;
use serde_json::{json, Value};

/// Binary export handed back alongside the envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status_code: u16,
    pub body: ApiResponse<Value>,
    pub attachment: Option<Attachment>,
}

impl HandlerResponse {
    fn ok(message: &str, data: Value) -> Self {
        Self {
            status_code: 200,
            body: ApiResponse::success(message, data),
            attachment: None,
        }
    }

    /// Status comes from the error kind: 400 validation, 409 conflict, 404 not found,
    /// 500 otherwise.
    pub fn from_error(err: &AnalyticsError) -> Self {
        let status_code = err.status_code();
        if status_code >= 500 {
            log_error!(
                "Analytics request failed",
                json!({"kind": format!("{:?}", err.kind), "error": err.message})
            );
        } else {
            log_warn!(
                "Analytics request rejected",
                json!({"status": status_code, "error": err.message})
            );
        }

        let mut errors = err.error_list();
        if errors.is_empty() {
            errors.push(err.message.clone());
        }
        Self {
            status_code,
            body: ApiResponse::error(err.message.clone(), errors),
            attachment: None,
        }
    }

    fn from_result(result: AnalyticsResult<Self>) -> Self {
        result.unwrap_or_else(|e| Self::from_error(&e))
    }
}

pub async fn handle_generate_report(
    coordinator: &AnalyticsCoordinator,
    request: &ReportRequest,
    force_refresh: bool,
) -> HandlerResponse {
    HandlerResponse::from_result(generate_report(coordinator, request, force_refresh).await)
}

pub async fn handle_chart_data(
    coordinator: &AnalyticsCoordinator,
    request: &ChartRequest,
) -> HandlerResponse {
    HandlerResponse::from_result(chart_data(coordinator, request).await)
}

pub async fn handle_dashboard_metrics(coordinator: &AnalyticsCoordinator) -> HandlerResponse {
    HandlerResponse::from_result(dashboard_metrics(coordinator).await)
}

/// Trigger the daily rollup; `date` is `YYYY-MM-DD`, today when absent.
pub async fn handle_daily_aggregation(
    coordinator: &AnalyticsCoordinator,
    date: Option<&str>,
) -> HandlerResponse {
    HandlerResponse::from_result(daily_aggregation(coordinator, date).await)
}

async fn generate_report(
    coordinator: &AnalyticsCoordinator,
    request: &ReportRequest,
    force_refresh: bool,
) -> AnalyticsResult<HandlerResponse> {
    let response = coordinator
        .handle_report_request(request, force_refresh)
        .await?;

    let mut data = json!({
        "request_id": response.request_id.to_string(),
        "report_type": response.report_type.as_str(),
        "parameters": response.parameters,
        "cache_hit": response.cache_hit,
        "generated_at": response.generated_at.to_rfc3339(),
    });

    let attachment = match (&response.artifact, &response.filename) {
        (ExportArtifact::Json(payload), _) => {
            data["report"] = payload.clone();
            None
        }
        (artifact, Some(filename)) => {
            let bytes = artifact.to_bytes()?;
            data["file"] = json!({
                "filename": filename,
                "content_type": artifact.content_type(),
                "size_bytes": bytes.len(),
            });
            Some(Attachment {
                filename: filename.clone(),
                content_type: artifact.content_type(),
                bytes,
            })
        }
        (artifact, None) => {
            return Err(AnalyticsError::export_error(format!(
                "Missing filename for {} export",
                artifact.extension()
            )))
        }
    };

    Ok(HandlerResponse {
        attachment,
        ..HandlerResponse::ok("Report generated successfully", data)
    })
}

async fn chart_data(
    coordinator: &AnalyticsCoordinator,
    request: &ChartRequest,
) -> AnalyticsResult<HandlerResponse> {
    let chart = coordinator.chart(request).await?;
    Ok(HandlerResponse::ok(
        "Chart data generated successfully",
        serde_json::to_value(chart)?,
    ))
}

async fn dashboard_metrics(coordinator: &AnalyticsCoordinator) -> AnalyticsResult<HandlerResponse> {
    let metrics = coordinator.dashboard_metrics().await?;
    Ok(HandlerResponse::ok(
        "Dashboard metrics retrieved successfully",
        serde_json::to_value(metrics)?,
    ))
}

async fn daily_aggregation(
    coordinator: &AnalyticsCoordinator,
    date: Option<&str>,
) -> AnalyticsResult<HandlerResponse> {
    let date = date
        .map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                AnalyticsError::validation_failed(vec![format!(
                    "date: Invalid date format '{}'. Use YYYY-MM-DD",
                    raw
                )])
            })
        })
        .transpose()?;
    let rollup = coordinator.run_daily_aggregation(date).await?;
    Ok(HandlerResponse::ok(
        "Daily statistics generated successfully",
        serde_json::to_value(rollup)?,
    ))
}
