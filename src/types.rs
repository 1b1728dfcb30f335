// src/types.rs

use crate::utils::{AnalyticsError, AnalyticsResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// ABO/Rh blood groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodGroup {
    /// The fixed enumeration, in the order rollups iterate it.
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::APositive,
        BloodGroup::ANegative,
        BloodGroup::BPositive,
        BloodGroup::BNegative,
        BloodGroup::AbPositive,
        BloodGroup::AbNegative,
        BloodGroup::OPositive,
        BloodGroup::ONegative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::APositive => "A+",
            BloodGroup::ANegative => "A-",
            BloodGroup::BPositive => "B+",
            BloodGroup::BNegative => "B-",
            BloodGroup::AbPositive => "AB+",
            BloodGroup::AbNegative => "AB-",
            BloodGroup::OPositive => "O+",
            BloodGroup::ONegative => "O-",
        }
    }
}

impl std::fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BloodGroup {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the typographic minus as well as the ASCII hyphen
        let normalized = s.trim().to_uppercase().replace('\u{2212}', "-");
        BloodGroup::ALL
            .iter()
            .copied()
            .find(|group| group.as_str() == normalized)
            .ok_or_else(|| AnalyticsError::validation_error(format!("Unknown blood type: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Denied,
    Cancelled,
}

impl RequestStatus {
    /// Requests closed without being fulfilled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestStatus::Denied | RequestStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Donation,
    Request,
    Adjustment,
}

// ============= INPUT RECORDS (owned by the surrounding system) =============

/// Donation offered by a donor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationRecord {
    pub id: u64,
    pub donor_ref: String,
    pub blood_group: BloodGroup,
    pub quantity: u32,
    pub status: DonationStatus,
    pub request_timestamp: DateTime<Utc>,
    pub action_timestamp: Option<DateTime<Utc>>,
}

/// Blood requested for a patient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloodRequestRecord {
    pub id: u64,
    pub requester_ref: String,
    pub blood_group: BloodGroup,
    pub quantity: u32,
    pub patient_name: String,
    pub hospital: String,
    pub urgency: bool,
    pub status: RequestStatus,
    pub request_timestamp: DateTime<Utc>,
    pub action_timestamp: Option<DateTime<Utc>>,
}

/// Current on-hand stock for one blood group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub blood_group: BloodGroup,
    pub quantity: u64,
    pub low_stock: bool,
}

/// Signed inventory movement (negative for requests and write-offs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub transaction_type: TransactionType,
    pub quantity: i64,
    pub blood_group: BloodGroup,
    pub timestamp: DateTime<Utc>,
}

// ============= DAILY SUMMARIES =============

/// Blood type → counts, keyed by the blood type label ("A+", ...).
pub type Breakdown<T> = BTreeMap<String, T>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DonationCounts {
    pub total: u64,
    pub successful: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestCounts {
    pub total: u64,
    pub fulfilled: u64,
    pub pending: u64,
    pub cancelled: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrgencyCounts {
    pub urgent: u64,
    pub normal: u64,
    pub urgent_fulfilled: u64,
}

/// Per-date donation rollup.
///
/// Breakdown fields are `None` when the stored value could not be decoded; readers
/// drop that record's breakdown contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDonationStats {
    pub date: NaiveDate,
    pub total_donations: u64,
    pub successful_donations: u64,
    pub rejected_donations: u64,
    pub blood_type_breakdown: Option<Breakdown<DonationCounts>>,
}

/// Per-date blood request rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRequestStats {
    pub date: NaiveDate,
    pub total_requests: u64,
    pub fulfilled_requests: u64,
    pub pending_requests: u64,
    pub cancelled_requests: u64,
    pub blood_type_breakdown: Option<Breakdown<RequestCounts>>,
    pub urgency_breakdown: Option<UrgencyCounts>,
}

/// Point-in-time inventory levels for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyInventorySnapshot {
    pub date: NaiveDate,
    pub inventory_levels: Option<Breakdown<u64>>,
    pub expiring_soon: Option<Breakdown<u64>>,
    pub expired_today: Option<Breakdown<u64>>,
}

// ============= REPORT PARAMETERS =============

/// Report categories, one generator each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    DonationSummary,
    RequestSummary,
    InventorySummary,
    DonationTrends,
    RequestTrends,
    InventoryForecast,
}

impl ReportType {
    pub const ALL: [ReportType; 6] = [
        ReportType::DonationSummary,
        ReportType::RequestSummary,
        ReportType::InventorySummary,
        ReportType::DonationTrends,
        ReportType::RequestTrends,
        ReportType::InventoryForecast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::DonationSummary => "donation_summary",
            ReportType::RequestSummary => "request_summary",
            ReportType::InventorySummary => "inventory_summary",
            ReportType::DonationTrends => "donation_trends",
            ReportType::RequestTrends => "request_trends",
            ReportType::InventoryForecast => "inventory_forecast",
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = ReportType::ALL.iter().map(|t| t.as_str()).collect();
                AnalyticsError::validation_error(format!(
                    "Invalid report type: {}. Must be one of: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Pdf,
    Excel,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Excel => "excel",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "pdf" => Ok(ExportFormat::Pdf),
            "excel" => Ok(ExportFormat::Excel),
            other => Err(AnalyticsError::validation_error(format!(
                "Unsupported format: {}. Must be one of: json, pdf, excel",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Day,
    Week,
    Month,
}

impl FromStr for GroupBy {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(GroupBy::Day),
            "week" => Ok(GroupBy::Week),
            "month" => Ok(GroupBy::Month),
            other => Err(AnalyticsError::validation_error(format!(
                "Invalid group_by: {}. Must be one of: day, week, month",
                other
            ))),
        }
    }
}

/// Validated report input; part of the cache key once normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportParameters {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default)]
    pub blood_types: Option<Vec<String>>,
    #[serde(default)]
    pub group_by: GroupBy,
}

impl ReportParameters {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            format: ExportFormat::Json,
            blood_types: None,
            group_by: GroupBy::Day,
        }
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn with_blood_types<I, S>(mut self, blood_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blood_types = Some(blood_types.into_iter().map(Into::into).collect());
        self
    }

    /// Check the date-range preconditions.
    pub fn validate(&self, max_range_days: i64) -> AnalyticsResult<()> {
        if self.start_date > self.end_date {
            return Err(AnalyticsError::validation_failed(vec![
                "End date must be after start date".to_string(),
            ]));
        }
        if (self.end_date - self.start_date).num_days() > max_range_days {
            return Err(AnalyticsError::validation_failed(vec![format!(
                "Date range cannot exceed {} days",
                max_range_days
            )]));
        }
        Ok(())
    }

    /// Same parameters with the blood-type filter sorted, de-duplicated and an empty
    /// filter collapsed to "no filter".
    pub fn normalized(&self) -> Self {
        let blood_types = self.blood_types.as_ref().and_then(|types| {
            let mut types: Vec<String> = types.iter().map(|t| t.trim().to_string()).collect();
            types.sort();
            types.dedup();
            if types.is_empty() {
                None
            } else {
                Some(types)
            }
        });

        Self {
            blood_types,
            ..self.clone()
        }
    }

    /// Canonical JSON form: normalized, dates as `YYYY-MM-DD`, keys sorted.
    pub fn canonical_json(&self) -> AnalyticsResult<String> {
        let value = serde_json::to_value(self.normalized())?;
        Ok(serde_json::to_string(&value)?)
    }

    /// Whether a blood type passes the optional filter.
    pub fn includes_blood_type(&self, blood_type: &str) -> bool {
        match &self.blood_types {
            Some(types) => types.iter().any(|t| t == blood_type),
            None => true,
        }
    }

    /// Blood types a per-type report covers: the filter, or all eight groups.
    pub fn selected_blood_types(&self) -> Vec<String> {
        match &self.blood_types {
            Some(types) => types.clone(),
            None => BloodGroup::ALL.iter().map(|g| g.as_str().to_string()).collect(),
        }
    }
}

/// Report request as received from a caller, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportRequest {
    pub report_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub format: Option<String>,
    pub blood_types: Option<Vec<String>>,
    pub group_by: Option<String>,
}

impl ReportRequest {
    /// Validate every field, collecting all errors before failing.
    pub fn validate(&self, max_range_days: i64) -> AnalyticsResult<(ReportType, ReportParameters)> {
        let mut errors = Vec::new();

        let report_type = match self.report_type.as_deref() {
            Some(raw) => ReportType::from_str(raw)
                .map_err(|e| errors.push(format!("report_type: {}", e.message)))
                .ok(),
            None => {
                errors.push("report_type: This field is required".to_string());
                None
            }
        };

        let start_date = parse_date_field("start_date", self.start_date.as_deref(), &mut errors);
        let end_date = parse_date_field("end_date", self.end_date.as_deref(), &mut errors);

        let format = match self.format.as_deref() {
            Some(raw) => ExportFormat::from_str(raw)
                .map_err(|e| errors.push(format!("format: {}", e.message)))
                .ok(),
            None => Some(ExportFormat::Json),
        };

        let group_by = match self.group_by.as_deref() {
            Some(raw) => GroupBy::from_str(raw)
                .map_err(|e| errors.push(format!("group_by: {}", e.message)))
                .ok(),
            None => Some(GroupBy::Day),
        };

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

        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                errors.push("End date must be after start date".to_string());
            } else if (end - start).num_days() > max_range_days {
                errors.push(format!("Date range cannot exceed {} days", max_range_days));
            }
        }

        match (report_type, start_date, end_date, format, group_by) {
            (Some(report_type), Some(start_date), Some(end_date), Some(format), Some(group_by))
                if errors.is_empty() =>
            {
                let parameters = ReportParameters {
                    start_date,
                    end_date,
                    format,
                    blood_types,
                    group_by,
                };
                Ok((report_type, parameters.normalized()))
            }
            _ => Err(AnalyticsError::validation_failed(errors)),
        }
    }
}

fn parse_date_field(field: &str, raw: Option<&str>, errors: &mut Vec<String>) -> Option<NaiveDate> {
    match raw {
        Some(value) => NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map_err(|_| {
                errors.push(format!(
                    "{}: Invalid date format '{}'. Use YYYY-MM-DD",
                    field, value
                ))
            })
            .ok(),
        None => {
            errors.push(format!("{}: This field is required", field));
            None
        }
    }
}

/// Dashboard overview numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub donations_today: u64,
    pub donations_this_week: u64,
    pub donations_this_month: u64,
    pub requests_today: u64,
    pub requests_this_week: u64,
    pub requests_this_month: u64,
    /// Blood types flagged low-stock → on-hand quantity
    pub critical_inventory: Breakdown<u64>,
    /// Low-stock proxy for units needing replenishment
    pub expiring_soon: Breakdown<u64>,
}
