// src/services/core/infrastructure/analytics_module/trend_analyzer.rs

//! Trend Analyzer - report payloads over daily summaries
//!
//! Loads the summaries in a date range, buckets them by day/week/month, fits a
//! least-squares line over the bucket index and classifies the slope. One generator
//! per [`ReportType`]; an empty range yields a zeroed payload instead of an error.

use super::time_series::{format_label, forward_fill_daily, resample_last, resample_sum};
use super::AnalyticsModuleConfig;
use crate::log_debug;
use crate::services::core::infrastructure::database_repositories::StatsRepository;
use crate::types::{
    Breakdown, DailyDonationStats, DailyRequestStats, DonationCounts, ReportParameters,
    ReportType, RequestCounts, UrgencyCounts,
};
use crate::utils::{
    compute_rate, linear_fit, round2, AnalyticsResult, RateTrend, TrendDirection,
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Produces the payload for one report type.
#[async_trait]
pub trait ReportBuilder: Send + Sync {
    async fn build_report(
        &self,
        report_type: ReportType,
        parameters: &ReportParameters,
    ) -> AnalyticsResult<Value>;
}

#[derive(Debug, Clone, Serialize)]
struct DonationInsight {
    #[serde(flatten)]
    counts: DonationCounts,
    success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
struct RequestInsight {
    #[serde(flatten)]
    counts: RequestCounts,
    fulfillment_rate: f64,
}

pub struct TrendAnalyzer {
    stats: Arc<dyn StatsRepository>,
    trend_threshold: f64,
    max_range_days: i64,
    forecast_horizon_days: u32,
    low_stock_threshold: u64,
}

impl TrendAnalyzer {
    pub fn new(stats: Arc<dyn StatsRepository>, config: &AnalyticsModuleConfig) -> Self {
        Self {
            stats,
            trend_threshold: config.trend_threshold,
            max_range_days: config.max_range_days,
            forecast_horizon_days: config.forecast_horizon_days,
            low_stock_threshold: config.low_stock_threshold,
        }
    }

    /// Validate the parameters and dispatch to the generator for `report_type`.
    pub async fn generate_report(
        &self,
        report_type: ReportType,
        parameters: &ReportParameters,
    ) -> AnalyticsResult<Value> {
        parameters.validate(self.max_range_days)?;
        let parameters = parameters.normalized();

        log_debug!(
            "Generating report",
            json!({
                "report_type": report_type.as_str(),
                "start_date": parameters.start_date.to_string(),
                "end_date": parameters.end_date.to_string(),
            })
        );

        match report_type {
            ReportType::DonationSummary => self.donation_summary(&parameters).await,
            ReportType::RequestSummary => self.request_summary(&parameters).await,
            ReportType::InventorySummary => self.inventory_summary(&parameters).await,
            ReportType::DonationTrends => self.donation_trends(&parameters).await,
            ReportType::RequestTrends => self.request_trends(&parameters).await,
            ReportType::InventoryForecast => self.inventory_forecast(&parameters).await,
        }
    }

    async fn donation_summary(&self, params: &ReportParameters) -> AnalyticsResult<Value> {
        let rows = self
            .stats
            .donation_stats_between(params.start_date, params.end_date)
            .await?;

        let buckets = resample_sum(&donation_points(&rows), params.group_by);
        let [total, successful, rejected] = column_totals(&buckets);

        Ok(json!({
            "summary": {
                "total_donations": total,
                "successful_donations": successful,
                "rejected_donations": rejected,
                "success_rate": round2(compute_rate(successful, total)),
            },
            "trends": {
                "labels": labels(&buckets),
                "total_donations": column(&buckets, 0),
                "successful_donations": column(&buckets, 1),
                "rejected_donations": column(&buckets, 2),
            },
            "blood_type_breakdown": sum_donation_breakdowns(&rows, params),
        }))
    }

    async fn request_summary(&self, params: &ReportParameters) -> AnalyticsResult<Value> {
        let rows = self
            .stats
            .request_stats_between(params.start_date, params.end_date)
            .await?;

        let buckets = resample_sum(&request_points(&rows), params.group_by);
        let [total, fulfilled, pending, cancelled] = column_totals(&buckets);

        Ok(json!({
            "summary": {
                "total_requests": total,
                "fulfilled_requests": fulfilled,
                "pending_requests": pending,
                "cancelled_requests": cancelled,
                "fulfillment_rate": round2(compute_rate(fulfilled, total)),
            },
            "trends": {
                "labels": labels(&buckets),
                "total_requests": column(&buckets, 0),
                "fulfilled_requests": column(&buckets, 1),
                "pending_requests": column(&buckets, 2),
                "cancelled_requests": column(&buckets, 3),
            },
            "blood_type_breakdown": sum_request_breakdowns(&rows, params),
            "urgency_breakdown": sum_urgency(&rows),
        }))
    }

    async fn inventory_summary(&self, params: &ReportParameters) -> AnalyticsResult<Value> {
        let snapshots = self
            .stats
            .inventory_snapshots_between(params.start_date, params.end_date)
            .await?;

        let latest_levels: Breakdown<u64> = snapshots
            .last()
            .and_then(|s| s.inventory_levels.as_ref())
            .map(|levels| filter_breakdown(levels, params))
            .unwrap_or_default();
        let total_units: u64 = latest_levels.values().sum();
        let critical_levels: Breakdown<u64> = latest_levels
            .iter()
            .filter(|(_, quantity)| **quantity < self.low_stock_threshold)
            .map(|(bt, quantity)| (bt.clone(), *quantity))
            .collect();

        let mut expiring = Breakdown::new();
        let mut expired = Breakdown::new();
        for snapshot in &snapshots {
            if let Some(levels) = &snapshot.expiring_soon {
                accumulate(&mut expiring, levels, params);
            }
            if let Some(levels) = &snapshot.expired_today {
                accumulate(&mut expired, levels, params);
            }
        }

        let level_points: Vec<(NaiveDate, Breakdown<u64>)> = snapshots
            .iter()
            .filter_map(|s| s.inventory_levels.clone().map(|levels| (s.date, levels)))
            .collect();
        let buckets = resample_last(&level_points, params.group_by);

        let blood_types: BTreeSet<&String> = buckets
            .iter()
            .flat_map(|(_, levels)| levels.keys())
            .filter(|bt| params.includes_blood_type(bt))
            .collect();
        let datasets: Vec<Value> = blood_types
            .into_iter()
            .map(|bt| {
                let data: Vec<u64> = buckets
                    .iter()
                    .map(|(_, levels)| levels.get(bt).copied().unwrap_or(0))
                    .collect();
                json!({"label": format!("{} Inventory Level", bt), "data": data})
            })
            .collect();

        Ok(json!({
            "summary": {
                "total_units": total_units,
                "blood_type_levels": latest_levels,
                "critical_levels": critical_levels,
                "total_expiring": expiring.values().sum::<u64>(),
                "total_expired": expired.values().sum::<u64>(),
            },
            "trends": {
                "labels": labels(&buckets),
                "datasets": datasets,
            },
            "expiring_breakdown": expiring,
            "expired_breakdown": expired,
        }))
    }

    async fn donation_trends(&self, params: &ReportParameters) -> AnalyticsResult<Value> {
        let rows = self
            .stats
            .donation_stats_between(params.start_date, params.end_date)
            .await?;

        let buckets = resample_sum(&donation_points(&rows), params.group_by);
        let [total, successful, rejected] = column_totals(&buckets);

        let totals = column(&buckets, 0);
        let raw_rates: Vec<f64> = buckets
            .iter()
            .map(|(_, [t, s, _])| compute_rate(*s, *t))
            .collect();
        let rates: Vec<f64> = raw_rates.iter().map(|r| round2(*r)).collect();

        let total_trend = self.direction(&totals);
        let success_rate_trend = RateTrend::of_series(&raw_rates, self.trend_threshold);

        let insights: Breakdown<DonationInsight> = sum_donation_breakdowns(&rows, params)
            .into_iter()
            .map(|(bt, counts)| {
                let success_rate = round2(compute_rate(counts.successful, counts.total));
                (bt, DonationInsight { counts, success_rate })
            })
            .collect();

        Ok(json!({
            "summary": {
                "total_donations": total,
                "successful_donations": successful,
                "rejected_donations": rejected,
                "success_rate": round2(compute_rate(successful, total)),
                "total_trend": total_trend,
                "success_rate_trend": success_rate_trend,
            },
            "trends": {
                "labels": labels(&buckets),
                "datasets": [
                    {"label": "Total Donations", "data": totals},
                    {"label": "Successful Donations", "data": column(&buckets, 1)},
                    {"label": "Rejected Donations", "data": column(&buckets, 2)},
                    {"label": "Success Rate (%)", "data": rates},
                ],
            },
            "analysis": {
                "total_trend": total_trend,
                "success_rate_trend": success_rate_trend,
                "peak_day": extreme_label(&buckets, &totals, Extreme::Max),
                "lowest_day": extreme_label(&buckets, &totals, Extreme::Min),
                "blood_type_insights": insights,
            },
        }))
    }

    async fn request_trends(&self, params: &ReportParameters) -> AnalyticsResult<Value> {
        let rows = self
            .stats
            .request_stats_between(params.start_date, params.end_date)
            .await?;

        let buckets = resample_sum(&request_points(&rows), params.group_by);
        let [total, fulfilled, pending, cancelled] = column_totals(&buckets);

        let totals = column(&buckets, 0);
        let raw_rates: Vec<f64> = buckets
            .iter()
            .map(|(_, [t, f, _, _])| compute_rate(*f, *t))
            .collect();
        let rates: Vec<f64> = raw_rates.iter().map(|r| round2(*r)).collect();

        let request_trend = self.direction(&totals);
        let fulfillment_trend = RateTrend::of_series(&raw_rates, self.trend_threshold);

        let insights: Breakdown<RequestInsight> = sum_request_breakdowns(&rows, params)
            .into_iter()
            .map(|(bt, counts)| {
                let fulfillment_rate = round2(compute_rate(counts.fulfilled, counts.total));
                (bt, RequestInsight { counts, fulfillment_rate })
            })
            .collect();

        let urgency = sum_urgency(&rows);

        Ok(json!({
            "summary": {
                "total_requests": total,
                "fulfilled_requests": fulfilled,
                "pending_requests": pending,
                "cancelled_requests": cancelled,
                "fulfillment_rate": round2(compute_rate(fulfilled, total)),
                "request_trend": request_trend,
                "fulfillment_trend": fulfillment_trend,
            },
            "trends": {
                "labels": labels(&buckets),
                "datasets": [
                    {"label": "Total Requests", "data": totals},
                    {"label": "Fulfilled Requests", "data": column(&buckets, 1)},
                    {"label": "Pending Requests", "data": column(&buckets, 2)},
                    {"label": "Cancelled Requests", "data": column(&buckets, 3)},
                    {"label": "Fulfillment Rate (%)", "data": rates},
                ],
            },
            "analysis": {
                "request_trend": request_trend,
                "fulfillment_trend": fulfillment_trend,
                "peak_day": extreme_label(&buckets, &totals, Extreme::Max),
                "most_urgent_day": most_urgent_day(&rows),
                "blood_type_insights": insights,
                "urgency_analysis": {
                    "urgent": urgency.urgent,
                    "normal": urgency.normal,
                    "urgent_fulfillment_rate":
                        round2(compute_rate(urgency.urgent_fulfilled, urgency.urgent)),
                },
            },
        }))
    }

    /// Naive linear extrapolation per blood type. No confidence intervals.
    async fn inventory_forecast(&self, params: &ReportParameters) -> AnalyticsResult<Value> {
        let snapshots = self
            .stats
            .inventory_snapshots_between(params.start_date, params.end_date)
            .await?;

        let horizon = self.forecast_horizon_days as usize;
        let future_dates: Vec<String> = (1..=horizon as i64)
            .map(|offset| format_label(params.end_date + Duration::days(offset)))
            .collect();

        let blood_types = params.selected_blood_types();
        let mut forecasts = serde_json::Map::new();
        let mut series_with_data = 0usize;

        for blood_type in &blood_types {
            let points: Vec<(NaiveDate, f64)> = snapshots
                .iter()
                .filter_map(|s| {
                    s.inventory_levels
                        .as_ref()
                        .map(|levels| (s.date, levels.get(blood_type).copied().unwrap_or(0) as f64))
                })
                .collect();
            let series = forward_fill_daily(&points);
            let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();

            let entry = match linear_fit(&values) {
                Some(fit) => {
                    series_with_data += 1;
                    json!({
                        "historical": {
                            "dates": series.iter().map(|(d, _)| format_label(*d)).collect::<Vec<_>>(),
                            "values": values,
                        },
                        "forecast": {
                            "dates": future_dates,
                            "values": fit.project(values.len(), horizon),
                        },
                        "trend": {
                            "slope": fit.slope,
                            "intercept": fit.intercept,
                            "direction": TrendDirection::from_slope(fit.slope, self.trend_threshold),
                        },
                    })
                }
                None => json!({
                    "historical": {"dates": [], "values": []},
                    "forecast": {"dates": future_dates, "values": []},
                    "trend": {
                        "slope": null,
                        "intercept": null,
                        "direction": TrendDirection::InsufficientData,
                    },
                }),
            };
            forecasts.insert(blood_type.clone(), entry);
        }

        Ok(json!({
            "summary": {
                "blood_types": blood_types,
                "horizon_days": horizon,
                "series_with_data": series_with_data,
                "method": "linear_extrapolation",
            },
            "forecasts": forecasts,
        }))
    }

    fn direction(&self, values: &[u64]) -> TrendDirection {
        let values: Vec<f64> = values.iter().map(|v| *v as f64).collect();
        TrendDirection::of_series(&values, self.trend_threshold)
    }
}

#[async_trait]
impl ReportBuilder for TrendAnalyzer {
    async fn build_report(
        &self,
        report_type: ReportType,
        parameters: &ReportParameters,
    ) -> AnalyticsResult<Value> {
        self.generate_report(report_type, parameters).await
    }
}

fn donation_points(rows: &[DailyDonationStats]) -> Vec<(NaiveDate, [u64; 3])> {
    rows.iter()
        .map(|r| {
            (
                r.date,
                [r.total_donations, r.successful_donations, r.rejected_donations],
            )
        })
        .collect()
}

fn request_points(rows: &[DailyRequestStats]) -> Vec<(NaiveDate, [u64; 4])> {
    rows.iter()
        .map(|r| {
            (
                r.date,
                [
                    r.total_requests,
                    r.fulfilled_requests,
                    r.pending_requests,
                    r.cancelled_requests,
                ],
            )
        })
        .collect()
}

fn labels<T>(buckets: &[(NaiveDate, T)]) -> Vec<String> {
    buckets.iter().map(|(d, _)| format_label(*d)).collect()
}

fn column<const N: usize>(buckets: &[(NaiveDate, [u64; N])], index: usize) -> Vec<u64> {
    buckets.iter().map(|(_, values)| values[index]).collect()
}

fn column_totals<const N: usize>(buckets: &[(NaiveDate, [u64; N])]) -> [u64; N] {
    let mut totals = [0u64; N];
    for (_, values) in buckets {
        for (acc, value) in totals.iter_mut().zip(values.iter()) {
            *acc += value;
        }
    }
    totals
}

#[derive(Clone, Copy)]
enum Extreme {
    Max,
    Min,
}

/// Label of the max/min bucket; ties go to the earliest bucket.
fn extreme_label<T>(buckets: &[(NaiveDate, T)], values: &[u64], extreme: Extreme) -> Option<String> {
    let mut best: Option<(usize, u64)> = None;
    for (index, value) in values.iter().copied().enumerate() {
        let better = match (best, extreme) {
            (None, _) => true,
            (Some((_, current)), Extreme::Max) => value > current,
            (Some((_, current)), Extreme::Min) => value < current,
        };
        if better {
            best = Some((index, value));
        }
    }
    best.and_then(|(index, _)| buckets.get(index))
        .map(|(date, _)| format_label(*date))
}

/// Raw date with the most urgent requests, earliest on ties. Rows without a readable
/// urgency breakdown do not take part.
fn most_urgent_day(rows: &[DailyRequestStats]) -> Option<String> {
    let mut best: Option<(NaiveDate, u64)> = None;
    for row in rows {
        if let Some(urgency) = &row.urgency_breakdown {
            if best.map(|(_, urgent)| urgency.urgent > urgent).unwrap_or(true) {
                best = Some((row.date, urgency.urgent));
            }
        }
    }
    best.map(|(date, _)| format_label(date))
}

fn sum_donation_breakdowns(
    rows: &[DailyDonationStats],
    params: &ReportParameters,
) -> Breakdown<DonationCounts> {
    let mut totals: Breakdown<DonationCounts> = Breakdown::new();
    for breakdown in rows.iter().filter_map(|r| r.blood_type_breakdown.as_ref()) {
        for (bt, counts) in breakdown {
            if !params.includes_blood_type(bt) {
                continue;
            }
            let entry = totals.entry(bt.clone()).or_default();
            entry.total += counts.total;
            entry.successful += counts.successful;
            entry.rejected += counts.rejected;
        }
    }
    totals
}

fn sum_request_breakdowns(
    rows: &[DailyRequestStats],
    params: &ReportParameters,
) -> Breakdown<RequestCounts> {
    let mut totals: Breakdown<RequestCounts> = Breakdown::new();
    for breakdown in rows.iter().filter_map(|r| r.blood_type_breakdown.as_ref()) {
        for (bt, counts) in breakdown {
            if !params.includes_blood_type(bt) {
                continue;
            }
            let entry = totals.entry(bt.clone()).or_default();
            entry.total += counts.total;
            entry.fulfilled += counts.fulfilled;
            entry.pending += counts.pending;
            entry.cancelled += counts.cancelled;
        }
    }
    totals
}

fn sum_urgency(rows: &[DailyRequestStats]) -> UrgencyCounts {
    rows.iter()
        .filter_map(|r| r.urgency_breakdown.as_ref())
        .fold(UrgencyCounts::default(), |mut acc, u| {
            acc.urgent += u.urgent;
            acc.normal += u.normal;
            acc.urgent_fulfilled += u.urgent_fulfilled;
            acc
        })
}

fn filter_breakdown(levels: &Breakdown<u64>, params: &ReportParameters) -> Breakdown<u64> {
    levels
        .iter()
        .filter(|(bt, _)| params.includes_blood_type(bt))
        .map(|(bt, quantity)| (bt.clone(), *quantity))
        .collect()
}

fn accumulate(into: &mut Breakdown<u64>, levels: &Breakdown<u64>, params: &ReportParameters) {
    for (bt, quantity) in levels {
        if params.includes_blood_type(bt) {
            *into.entry(bt.clone()).or_insert(0) += quantity;
        }
    }
}
