// Analytics Repository - Daily summary storage
// Date-keyed upserts and range reads for donation, request and inventory rollups.
// Breakdown fields are decoded exactly once here; everything above sees typed maps.

use crate::log_warn;
use crate::types::{
    Breakdown, DailyDonationStats, DailyInventorySnapshot, DailyRequestStats, DonationCounts,
    RequestCounts, UrgencyCounts,
};
use crate::utils::AnalyticsResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// A JSON field as persisted: either structured, or serialized into a text column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredJson {
    Encoded(String),
    Native(Value),
}

impl StoredJson {
    pub fn native<T: Serialize>(value: &T) -> AnalyticsResult<Self> {
        Ok(StoredJson::Native(serde_json::to_value(value)?))
    }

    pub fn encoded(text: impl Into<String>) -> Self {
        StoredJson::Encoded(text.into())
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            StoredJson::Encoded(text) => serde_json::from_str(text),
            StoredJson::Native(value) => T::deserialize(value),
        }
    }
}

/// Decode one stored field, logging and returning `None` when it is malformed.
fn decode_field<T: DeserializeOwned>(
    stored: &StoredJson,
    date: NaiveDate,
    field: &str,
) -> Option<T> {
    match stored.decode() {
        Ok(value) => Some(value),
        Err(e) => {
            log_warn!(
                "Skipping malformed breakdown field",
                json!({
                    "date": date.to_string(),
                    "field": field,
                    "error": e.to_string(),
                })
            );
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationStatsRow {
    pub date: NaiveDate,
    pub total_donations: u64,
    pub successful_donations: u64,
    pub rejected_donations: u64,
    pub blood_type_breakdown: StoredJson,
}

impl DonationStatsRow {
    fn from_stats(stats: &DailyDonationStats) -> AnalyticsResult<Self> {
        Ok(Self {
            date: stats.date,
            total_donations: stats.total_donations,
            successful_donations: stats.successful_donations,
            rejected_donations: stats.rejected_donations,
            blood_type_breakdown: StoredJson::native(&stats.blood_type_breakdown)?,
        })
    }

    fn decode(&self) -> DailyDonationStats {
        DailyDonationStats {
            date: self.date,
            total_donations: self.total_donations,
            successful_donations: self.successful_donations,
            rejected_donations: self.rejected_donations,
            blood_type_breakdown: decode_field::<Breakdown<DonationCounts>>(
                &self.blood_type_breakdown,
                self.date,
                "blood_type_breakdown",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStatsRow {
    pub date: NaiveDate,
    pub total_requests: u64,
    pub fulfilled_requests: u64,
    pub pending_requests: u64,
    pub cancelled_requests: u64,
    pub blood_type_breakdown: StoredJson,
    pub urgency_breakdown: StoredJson,
}

impl RequestStatsRow {
    fn from_stats(stats: &DailyRequestStats) -> AnalyticsResult<Self> {
        Ok(Self {
            date: stats.date,
            total_requests: stats.total_requests,
            fulfilled_requests: stats.fulfilled_requests,
            pending_requests: stats.pending_requests,
            cancelled_requests: stats.cancelled_requests,
            blood_type_breakdown: StoredJson::native(&stats.blood_type_breakdown)?,
            urgency_breakdown: StoredJson::native(&stats.urgency_breakdown)?,
        })
    }

    fn decode(&self) -> DailyRequestStats {
        DailyRequestStats {
            date: self.date,
            total_requests: self.total_requests,
            fulfilled_requests: self.fulfilled_requests,
            pending_requests: self.pending_requests,
            cancelled_requests: self.cancelled_requests,
            blood_type_breakdown: decode_field::<Breakdown<RequestCounts>>(
                &self.blood_type_breakdown,
                self.date,
                "blood_type_breakdown",
            ),
            urgency_breakdown: decode_field::<UrgencyCounts>(
                &self.urgency_breakdown,
                self.date,
                "urgency_breakdown",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshotRow {
    pub date: NaiveDate,
    pub inventory_levels: StoredJson,
    pub expiring_soon: StoredJson,
    pub expired_today: StoredJson,
}

impl InventorySnapshotRow {
    fn from_snapshot(snapshot: &DailyInventorySnapshot) -> AnalyticsResult<Self> {
        Ok(Self {
            date: snapshot.date,
            inventory_levels: StoredJson::native(&snapshot.inventory_levels)?,
            expiring_soon: StoredJson::native(&snapshot.expiring_soon)?,
            expired_today: StoredJson::native(&snapshot.expired_today)?,
        })
    }

    fn decode(&self) -> DailyInventorySnapshot {
        DailyInventorySnapshot {
            date: self.date,
            inventory_levels: decode_field(&self.inventory_levels, self.date, "inventory_levels"),
            expiring_soon: decode_field(&self.expiring_soon, self.date, "expiring_soon"),
            expired_today: decode_field(&self.expired_today, self.date, "expired_today"),
        }
    }
}

#[async_trait]
pub trait StatsRepository: Send + Sync {
    /// Insert or overwrite the donation rollup for `stats.date`.
    async fn upsert_donation_stats(&self, stats: &DailyDonationStats) -> AnalyticsResult<()>;

    async fn upsert_request_stats(&self, stats: &DailyRequestStats) -> AnalyticsResult<()>;

    async fn upsert_inventory_snapshot(
        &self,
        snapshot: &DailyInventorySnapshot,
    ) -> AnalyticsResult<()>;

    /// Rollups with `start <= date <= end`, ascending by date.
    async fn donation_stats_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<DailyDonationStats>>;

    async fn request_stats_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<DailyRequestStats>>;

    async fn inventory_snapshots_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<DailyInventorySnapshot>>;

    async fn inventory_snapshot_on(
        &self,
        date: NaiveDate,
    ) -> AnalyticsResult<Option<DailyInventorySnapshot>> {
        Ok(self
            .inventory_snapshots_between(date, date)
            .await?
            .into_iter()
            .next())
    }
}

/// Date-keyed in-memory summary store. A `BTreeMap` keyed by date gives the unique
/// constraint and the ordering reads need.
#[derive(Default)]
pub struct InMemoryStatsRepository {
    donation_rows: RwLock<BTreeMap<NaiveDate, DonationStatsRow>>,
    request_rows: RwLock<BTreeMap<NaiveDate, RequestStatsRow>>,
    inventory_rows: RwLock<BTreeMap<NaiveDate, InventorySnapshotRow>>,
}

impl InMemoryStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row as-is, including text-encoded or malformed breakdown fields.
    pub fn insert_raw_donation_row(&self, row: DonationStatsRow) {
        self.donation_rows.write().insert(row.date, row);
    }

    pub fn insert_raw_request_row(&self, row: RequestStatsRow) {
        self.request_rows.write().insert(row.date, row);
    }

    pub fn insert_raw_inventory_row(&self, row: InventorySnapshotRow) {
        self.inventory_rows.write().insert(row.date, row);
    }

    pub fn donation_row_count(&self) -> usize {
        self.donation_rows.read().len()
    }

    pub fn request_row_count(&self) -> usize {
        self.request_rows.read().len()
    }

    pub fn inventory_row_count(&self) -> usize {
        self.inventory_rows.read().len()
    }
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn upsert_donation_stats(&self, stats: &DailyDonationStats) -> AnalyticsResult<()> {
        let row = DonationStatsRow::from_stats(stats)?;
        self.donation_rows.write().insert(row.date, row);
        Ok(())
    }

    async fn upsert_request_stats(&self, stats: &DailyRequestStats) -> AnalyticsResult<()> {
        let row = RequestStatsRow::from_stats(stats)?;
        self.request_rows.write().insert(row.date, row);
        Ok(())
    }

    async fn upsert_inventory_snapshot(
        &self,
        snapshot: &DailyInventorySnapshot,
    ) -> AnalyticsResult<()> {
        let row = InventorySnapshotRow::from_snapshot(snapshot)?;
        self.inventory_rows.write().insert(row.date, row);
        Ok(())
    }

    async fn donation_stats_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<DailyDonationStats>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .donation_rows
            .read()
            .range(start..=end)
            .map(|(_, row)| row.decode())
            .collect())
    }

    async fn request_stats_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<DailyRequestStats>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .request_rows
            .read()
            .range(start..=end)
            .map(|(_, row)| row.decode())
            .collect())
    }

    async fn inventory_snapshots_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AnalyticsResult<Vec<DailyInventorySnapshot>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .inventory_rows
            .read()
            .range(start..=end)
            .map(|(_, row)| row.decode())
            .collect())
    }
}
