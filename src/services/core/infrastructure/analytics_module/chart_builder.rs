// src/services/core/infrastructure/analytics_module/chart_builder.rs

//! Chart Data Builder - label/series structures for the presentation layer.
//!
//! Missing or unreadable summaries never fail a chart: the result is an empty but
//! well-formed structure whose title carries a "(No Data)" style suffix.

use super::time_series::format_label;
use super::AnalyticsModuleConfig;
use crate::services::core::infrastructure::database_repositories::StatsRepository;
use crate::types::{BloodGroup, DailyDonationStats};
use crate::utils::{linear_fit, AnalyticsError, AnalyticsResult, Clock};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

const DISTRIBUTION_COLORS: [&str; 8] = [
    "#FF6384", "#36A2EB", "#FFCE56", "#4BC0C0", "#9966FF", "#FF9F40", "#FF6384", "#36A2EB",
];
const ACTUAL_COLOR: &str = "#2196F3";
const FORECAST_COLOR: &str = "#FF9800";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Doughnut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_dash: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<bool>,
}

impl ChartDataset {
    fn series(label: impl Into<String>, data: Vec<Option<f64>>) -> Self {
        Self {
            label: label.into(),
            data,
            border_color: None,
            background_color: None,
            border_dash: None,
            fill: None,
        }
    }

    fn line(label: impl Into<String>, data: Vec<Option<f64>>, color: &str) -> Self {
        Self {
            border_color: Some(color.to_string()),
            fill: Some(false),
            ..Self::series(label, data)
        }
    }

    fn dashed(mut self) -> Self {
        self.border_dash = Some(vec![5, 5]);
        self
    }

    fn with_background(mut self, colors: Vec<String>) -> Self {
        self.background_color = Some(colors);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
    pub title: String,
    #[serde(rename = "type")]
    pub chart_type: ChartType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    DonationTrend,
    BloodTypeDistribution,
    RequestsFulfillment,
    InventoryForecast,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::DonationTrend => "donation_trend",
            ChartKind::BloodTypeDistribution => "blood_type_distribution",
            ChartKind::RequestsFulfillment => "requests_fulfillment",
            ChartKind::InventoryForecast => "inventory_forecast",
        }
    }
}

impl FromStr for ChartKind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "donation_trend" => Ok(ChartKind::DonationTrend),
            "blood_type_distribution" => Ok(ChartKind::BloodTypeDistribution),
            "requests_fulfillment" => Ok(ChartKind::RequestsFulfillment),
            "inventory_forecast" => Ok(ChartKind::InventoryForecast),
            other => Err(AnalyticsError::validation_error(format!(
                "Invalid chart type: {}",
                other
            ))),
        }
    }
}

/// Chart request as received, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartRequest {
    pub chart_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub date: Option<String>,
    pub blood_type: Option<String>,
    pub blood_types: Option<Vec<String>>,
    pub days: Option<u32>,
}

/// A validated chart request.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartQuery {
    DonationTrend {
        start_date: NaiveDate,
        end_date: NaiveDate,
        blood_types: Option<Vec<String>>,
    },
    BloodTypeDistribution {
        date: Option<NaiveDate>,
    },
    RequestsFulfillment {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    InventoryForecast {
        blood_type: String,
        days: Option<u32>,
    },
}

impl ChartRequest {
    pub fn validate(&self, max_range_days: i64) -> AnalyticsResult<ChartQuery> {
        let mut errors = Vec::new();
        let kind = match self.chart_type.as_deref() {
            Some(raw) => ChartKind::from_str(raw)
                .map_err(|e| errors.push(format!("chart_type: {}", e.message)))
                .ok(),
            None => {
                errors.push("chart_type: This field is required".to_string());
                None
            }
        };

        let query = match kind {
            Some(ChartKind::DonationTrend) | Some(ChartKind::RequestsFulfillment) => {
                let start = parse_date("start_date", self.start_date.as_deref(), true, &mut errors);
                let end = parse_date("end_date", self.end_date.as_deref(), true, &mut errors);
                match (start, end) {
                    (Some(start), Some(end)) if start > end => {
                        errors.push("End date must be after start date".to_string());
                        None
                    }
                    (Some(start), Some(end)) if (end - start).num_days() > max_range_days => {
                        errors.push(format!("Date range cannot exceed {} days", max_range_days));
                        None
                    }
                    (Some(start_date), Some(end_date)) => {
                        if kind == Some(ChartKind::DonationTrend) {
                            let blood_types = self.blood_types.as_ref().map(|types| {
                                types
                                    .iter()
                                    .filter_map(|raw| match BloodGroup::from_str(raw) {
                                        Ok(group) => Some(group.as_str().to_string()),
                                        Err(e) => {
                                            errors.push(format!("blood_types: {}", e.message));
                                            None
                                        }
                                    })
                                    .collect::<Vec<_>>()
                            });
                            Some(ChartQuery::DonationTrend {
                                start_date,
                                end_date,
                                blood_types,
                            })
                        } else {
                            Some(ChartQuery::RequestsFulfillment {
                                start_date,
                                end_date,
                            })
                        }
                    }
                    _ => None,
                }
            }
            Some(ChartKind::BloodTypeDistribution) => {
                let date = parse_date("date", self.date.as_deref(), false, &mut errors);
                Some(ChartQuery::BloodTypeDistribution { date })
            }
            Some(ChartKind::InventoryForecast) => match self.blood_type.as_deref() {
                Some(raw) => match BloodGroup::from_str(raw) {
                    Ok(group) => match self.days {
                        Some(days) if days == 0 || i64::from(days) > max_range_days => {
                            errors.push(format!(
                                "days: Must be between 1 and {}",
                                max_range_days
                            ));
                            None
                        }
                        days => Some(ChartQuery::InventoryForecast {
                            blood_type: group.as_str().to_string(),
                            days,
                        }),
                    },
                    Err(e) => {
                        errors.push(format!("blood_type: {}", e.message));
                        None
                    }
                },
                None => {
                    errors.push(
                        "blood_type: This field is required for inventory forecast".to_string(),
                    );
                    None
                }
            },
            None => None,
        };

        match query {
            Some(query) if errors.is_empty() => Ok(query),
            _ => Err(AnalyticsError::validation_failed(errors)),
        }
    }
}

fn parse_date(
    field: &str,
    raw: Option<&str>,
    required: bool,
    errors: &mut Vec<String>,
) -> Option<NaiveDate> {
    match raw {
        Some(value) => NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map_err(|_| errors.push(format!("{}: Invalid date format. Use YYYY-MM-DD", field)))
            .ok(),
        None => {
            if required {
                errors.push(format!("{}: This field is required", field));
            }
            None
        }
    }
}

pub struct ChartBuilder {
    stats: Arc<dyn StatsRepository>,
    clock: Arc<dyn Clock>,
    forecast_horizon_days: u32,
    history_days: u32,
}

impl ChartBuilder {
    pub fn new(
        stats: Arc<dyn StatsRepository>,
        clock: Arc<dyn Clock>,
        config: &AnalyticsModuleConfig,
    ) -> Self {
        Self {
            stats,
            clock,
            forecast_horizon_days: config.forecast_horizon_days,
            history_days: config.forecast_chart_history_days,
        }
    }

    pub async fn build(&self, query: &ChartQuery) -> AnalyticsResult<ChartData> {
        match query {
            ChartQuery::DonationTrend {
                start_date,
                end_date,
                blood_types,
            } => {
                self.donation_trend_chart(*start_date, *end_date, blood_types.as_deref())
                    .await
            }
            ChartQuery::BloodTypeDistribution { date } => {
                self.blood_type_distribution_chart(*date).await
            }
            ChartQuery::RequestsFulfillment {
                start_date,
                end_date,
            } => self.requests_fulfillment_chart(*start_date, *end_date).await,
            ChartQuery::InventoryForecast { blood_type, days } => {
                self.inventory_forecast_chart(blood_type, *days).await
            }
        }
    }

    /// Daily totals. With a blood-type filter the series come from the per-type
    /// breakdown of the selected types.
    pub async fn donation_trend_chart(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        blood_types: Option<&[String]>,
    ) -> AnalyticsResult<ChartData> {
        let rows = self.stats.donation_stats_between(start_date, end_date).await?;

        let counts: Vec<[u64; 3]> = rows
            .iter()
            .map(|row| match blood_types {
                Some(types) => filtered_donation_counts(row, types),
                None => [
                    row.total_donations,
                    row.successful_donations,
                    row.rejected_donations,
                ],
            })
            .collect();
        let series = |index: usize| -> Vec<Option<f64>> {
            counts.iter().map(|c| Some(c[index] as f64)).collect()
        };

        let title = if rows.is_empty() {
            "Donation Trends (No Data)"
        } else {
            "Donation Trends"
        };

        Ok(ChartData {
            labels: rows.iter().map(|r| format_label(r.date)).collect(),
            datasets: vec![
                ChartDataset::line("Total Donations", series(0), "#4CAF50"),
                ChartDataset::line("Successful Donations", series(1), "#2196F3"),
                ChartDataset::line("Rejected Donations", series(2), "#F44336"),
            ],
            title: title.to_string(),
            chart_type: ChartType::Line,
        })
    }

    /// Inventory levels per blood type on `date` (default: today).
    pub async fn blood_type_distribution_chart(
        &self,
        date: Option<NaiveDate>,
    ) -> AnalyticsResult<ChartData> {
        let date = date.unwrap_or_else(|| self.clock.today());
        let snapshot = match self.stats.inventory_snapshot_on(date).await? {
            Some(snapshot) => snapshot,
            None => {
                return Ok(ChartData {
                    labels: Vec::new(),
                    datasets: Vec::new(),
                    title: "Blood Type Distribution (No Data)".to_string(),
                    chart_type: ChartType::Doughnut,
                })
            }
        };

        let levels = match snapshot.inventory_levels {
            Some(levels) => levels,
            None => {
                return Ok(ChartData {
                    labels: Vec::new(),
                    datasets: vec![ChartDataset::series("Blood Type Distribution", Vec::new())
                        .with_background(Vec::new())],
                    title: "Blood Type Distribution (Error)".to_string(),
                    chart_type: ChartType::Doughnut,
                })
            }
        };

        let labels: Vec<String> = levels.keys().cloned().collect();
        let data: Vec<Option<f64>> = levels.values().map(|v| Some(*v as f64)).collect();
        let colors = DISTRIBUTION_COLORS
            .iter()
            .cycle()
            .take(labels.len())
            .map(|c| c.to_string())
            .collect();

        Ok(ChartData {
            labels,
            datasets: vec![ChartDataset::series("Blood Type Distribution", data).with_background(colors)],
            title: format!("Blood Type Distribution ({})", format_label(date)),
            chart_type: ChartType::Doughnut,
        })
    }

    pub async fn requests_fulfillment_chart(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AnalyticsResult<ChartData> {
        let rows = self.stats.request_stats_between(start_date, end_date).await?;
        let fulfilled: u64 = rows.iter().map(|r| r.fulfilled_requests).sum();
        let pending: u64 = rows.iter().map(|r| r.pending_requests).sum();
        let cancelled: u64 = rows.iter().map(|r| r.cancelled_requests).sum();

        let title = if rows.is_empty() {
            "Blood Request Fulfillment (No Data)"
        } else {
            "Blood Request Fulfillment"
        };

        Ok(ChartData {
            labels: vec!["Fulfilled".into(), "Pending".into(), "Cancelled".into()],
            datasets: vec![ChartDataset::series(
                "Request Status Distribution",
                vec![
                    Some(fulfilled as f64),
                    Some(pending as f64),
                    Some(cancelled as f64),
                ],
            )
            .with_background(vec!["#4CAF50".into(), "#FFC107".into(), "#F44336".into()])],
            title: title.to_string(),
            chart_type: ChartType::Pie,
        })
    }

    /// Recent levels of one blood type with a dashed linear projection appended.
    pub async fn inventory_forecast_chart(
        &self,
        blood_type: &str,
        days: Option<u32>,
    ) -> AnalyticsResult<ChartData> {
        let horizon = self.forecast_horizon_days as usize;
        let end_date = self.clock.today();
        let start_date = shift_days(end_date, -i64::from(days.unwrap_or(self.history_days)))?;

        let snapshots = self
            .stats
            .inventory_snapshots_between(start_date, end_date)
            .await?;
        let points: Vec<(NaiveDate, f64)> = snapshots
            .iter()
            .filter_map(|s| {
                s.inventory_levels
                    .as_ref()
                    .map(|levels| (s.date, levels.get(blood_type).copied().unwrap_or(0) as f64))
            })
            .collect();

        let actual_label = format!("Actual {} Inventory", blood_type);
        let forecast_label = format!("Forecast {} Inventory", blood_type);

        let (last_date, fit) = match (points.last(), linear_fit(&values_of(&points))) {
            (Some((last_date, _)), Some(fit)) => (*last_date, fit),
            _ => {
                let labels = (0..horizon as i64)
                    .map(|offset| shift_days(end_date, offset).map(format_label))
                    .collect::<AnalyticsResult<Vec<_>>>()?;
                return Ok(ChartData {
                    labels,
                    datasets: vec![
                        ChartDataset::line(actual_label, vec![Some(0.0); horizon], ACTUAL_COLOR),
                        ChartDataset::line(forecast_label, vec![Some(0.0); horizon], FORECAST_COLOR)
                            .dashed(),
                    ],
                    title: format!("Inventory Forecast - {} (No Historical Data)", blood_type),
                    chart_type: ChartType::Line,
                });
            }
        };

        let mut labels: Vec<String> = points.iter().map(|(d, _)| format_label(*d)).collect();
        for offset in 1..=horizon as i64 {
            labels.push(format_label(shift_days(last_date, offset)?));
        }

        let mut actual: Vec<Option<f64>> = points.iter().map(|(_, v)| Some(*v)).collect();
        actual.extend(std::iter::repeat(None).take(horizon));

        let mut forecast: Vec<Option<f64>> = vec![None; points.len()];
        forecast.extend(fit.project(points.len(), horizon).into_iter().map(Some));

        Ok(ChartData {
            labels,
            datasets: vec![
                ChartDataset::line(actual_label, actual, ACTUAL_COLOR),
                ChartDataset::line(forecast_label, forecast, FORECAST_COLOR).dashed(),
            ],
            title: format!("Inventory Forecast - {}", blood_type),
            chart_type: ChartType::Line,
        })
    }
}

fn shift_days(date: NaiveDate, offset: i64) -> AnalyticsResult<NaiveDate> {
    date.checked_add_signed(Duration::days(offset)).ok_or_else(|| {
        AnalyticsError::validation_error(format!(
            "Date {} shifted by {} days is out of range",
            date, offset
        ))
    })
}

fn values_of(points: &[(NaiveDate, f64)]) -> Vec<f64> {
    points.iter().map(|(_, v)| *v).collect()
}

fn filtered_donation_counts(row: &DailyDonationStats, blood_types: &[String]) -> [u64; 3] {
    let mut counts = [0u64; 3];
    if let Some(breakdown) = &row.blood_type_breakdown {
        for (bt, c) in breakdown {
            if blood_types.iter().any(|t| t == bt) {
                counts[0] += c.total;
                counts[1] += c.successful;
                counts[2] += c.rejected;
            }
        }
    }
    counts
}
