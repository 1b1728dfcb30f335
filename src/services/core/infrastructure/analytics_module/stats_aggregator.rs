// src/services/core/infrastructure/analytics_module/stats_aggregator.rs

//! Stats Aggregator - daily rollups of transactional records
//!
//! Derives one donation rollup, one request rollup and one inventory snapshot per
//! calendar date and upserts them keyed by date. Re-running a date overwrites.

use crate::log_info;
use crate::services::core::infrastructure::database_repositories::{
    SourceRepository, StatsRepository,
};
use crate::types::{
    BloodGroup, BloodRequestRecord, Breakdown, DailyDonationStats, DailyInventorySnapshot,
    DailyRequestStats, DashboardMetrics, DonationCounts, DonationRecord, DonationStatus,
    InventoryRecord, InventoryTransaction, RequestCounts, RequestStatus, UrgencyCounts,
};
use crate::utils::{AnalyticsResult, Clock};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// The three summaries produced for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRollup {
    pub date: NaiveDate,
    pub donations: DailyDonationStats,
    pub requests: DailyRequestStats,
    pub inventory: DailyInventorySnapshot,
}

pub struct StatsAggregator {
    source: Arc<dyn SourceRepository>,
    stats: Arc<dyn StatsRepository>,
    clock: Arc<dyn Clock>,
}

impl StatsAggregator {
    pub fn new(
        source: Arc<dyn SourceRepository>,
        stats: Arc<dyn StatsRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            stats,
            clock,
        }
    }

    /// Compute and upsert all three summaries for `date` (default: today).
    pub async fn generate_daily_stats(&self, date: Option<NaiveDate>) -> AnalyticsResult<DailyRollup> {
        let date = date.unwrap_or_else(|| self.clock.today());

        let donations = self.generate_donation_stats(date).await?;
        let requests = self.generate_request_stats(date).await?;
        let inventory = self.generate_inventory_snapshot(date).await?;

        log_info!(
            "Daily stats generated",
            json!({
                "date": date.to_string(),
                "donations": donations.total_donations,
                "requests": requests.total_requests,
            })
        );

        Ok(DailyRollup {
            date,
            donations,
            requests,
            inventory,
        })
    }

    pub async fn generate_donation_stats(&self, date: NaiveDate) -> AnalyticsResult<DailyDonationStats> {
        let records = self.source.donations_on(date).await?;
        let stats = summarize_donations(date, &records);
        self.stats.upsert_donation_stats(&stats).await?;
        Ok(stats)
    }

    pub async fn generate_request_stats(&self, date: NaiveDate) -> AnalyticsResult<DailyRequestStats> {
        let records = self.source.requests_on(date).await?;
        let stats = summarize_requests(date, &records);
        self.stats.upsert_request_stats(&stats).await?;
        Ok(stats)
    }

    pub async fn generate_inventory_snapshot(
        &self,
        date: NaiveDate,
    ) -> AnalyticsResult<DailyInventorySnapshot> {
        let inventory = self.source.inventory().await?;
        let transactions = self.source.transactions_on(date).await?;
        let snapshot = snapshot_inventory(date, &inventory, &transactions);
        self.stats.upsert_inventory_snapshot(&snapshot).await?;
        Ok(snapshot)
    }

    /// Overview counts for today, this week (Monday start) and this month, plus the
    /// low-stock view of current inventory.
    pub async fn dashboard_metrics(&self) -> AnalyticsResult<DashboardMetrics> {
        let today = self.clock.today();
        let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        let month_start = today.with_day(1).unwrap_or(today);

        let inventory = self.source.inventory().await?;
        let critical_inventory: Breakdown<u64> = inventory
            .iter()
            .filter(|r| r.low_stock)
            .map(|r| (r.blood_group.as_str().to_string(), r.quantity))
            .collect();

        Ok(DashboardMetrics {
            donations_today: self.source.count_donations_since(start_of(today)).await?,
            donations_this_week: self.source.count_donations_since(start_of(week_start)).await?,
            donations_this_month: self.source.count_donations_since(start_of(month_start)).await?,
            requests_today: self.source.count_requests_since(start_of(today)).await?,
            requests_this_week: self.source.count_requests_since(start_of(week_start)).await?,
            requests_this_month: self.source.count_requests_since(start_of(month_start)).await?,
            expiring_soon: critical_inventory.clone(),
            critical_inventory,
        })
    }
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Donation rollup for one date; every blood group gets an entry, zeroed if absent.
pub fn summarize_donations(date: NaiveDate, records: &[DonationRecord]) -> DailyDonationStats {
    let count = |records: &[&DonationRecord]| DonationCounts {
        total: records.len() as u64,
        successful: records
            .iter()
            .filter(|d| d.status == DonationStatus::Approved)
            .count() as u64,
        rejected: records
            .iter()
            .filter(|d| d.status == DonationStatus::Rejected)
            .count() as u64,
    };

    let all: Vec<&DonationRecord> = records.iter().collect();
    let overall = count(&all);

    let breakdown: Breakdown<DonationCounts> = BloodGroup::ALL
        .iter()
        .map(|group| {
            let group_records: Vec<&DonationRecord> =
                records.iter().filter(|d| d.blood_group == *group).collect();
            (group.as_str().to_string(), count(&group_records))
        })
        .collect();

    DailyDonationStats {
        date,
        total_donations: overall.total,
        successful_donations: overall.successful,
        rejected_donations: overall.rejected,
        blood_type_breakdown: Some(breakdown),
    }
}

/// Request rollup for one date, including the urgency split.
pub fn summarize_requests(date: NaiveDate, records: &[BloodRequestRecord]) -> DailyRequestStats {
    let count = |records: &[&BloodRequestRecord]| RequestCounts {
        total: records.len() as u64,
        fulfilled: records
            .iter()
            .filter(|r| r.status == RequestStatus::Fulfilled)
            .count() as u64,
        pending: records
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .count() as u64,
        cancelled: records.iter().filter(|r| r.status.is_cancelled()).count() as u64,
    };

    let all: Vec<&BloodRequestRecord> = records.iter().collect();
    let overall = count(&all);

    let breakdown: Breakdown<RequestCounts> = BloodGroup::ALL
        .iter()
        .map(|group| {
            let group_records: Vec<&BloodRequestRecord> =
                records.iter().filter(|r| r.blood_group == *group).collect();
            (group.as_str().to_string(), count(&group_records))
        })
        .collect();

    let urgency = UrgencyCounts {
        urgent: records.iter().filter(|r| r.urgency).count() as u64,
        normal: records.iter().filter(|r| !r.urgency).count() as u64,
        urgent_fulfilled: records
            .iter()
            .filter(|r| r.urgency && r.status == RequestStatus::Fulfilled)
            .count() as u64,
    };

    DailyRequestStats {
        date,
        total_requests: overall.total,
        fulfilled_requests: overall.fulfilled,
        pending_requests: overall.pending,
        cancelled_requests: overall.cancelled,
        blood_type_breakdown: Some(breakdown),
        urgency_breakdown: Some(urgency),
    }
}

/// Inventory snapshot for `date`. Low-stock quantity stands in for "expiring soon";
/// a net-negative transaction sum on `date` counts as expired.
pub fn snapshot_inventory(
    date: NaiveDate,
    inventory: &[InventoryRecord],
    transactions: &[InventoryTransaction],
) -> DailyInventorySnapshot {
    let mut levels = Breakdown::new();
    let mut expiring_soon = Breakdown::new();
    for record in inventory {
        let key = record.blood_group.as_str().to_string();
        levels.insert(key.clone(), record.quantity);
        if record.low_stock {
            expiring_soon.insert(key, record.quantity);
        }
    }

    let mut expired_today = Breakdown::new();
    for group in BloodGroup::ALL {
        let net: i64 = transactions
            .iter()
            .filter(|t| t.blood_group == group && t.timestamp.date_naive() == date)
            .map(|t| t.quantity)
            .sum();
        if net < 0 {
            expired_today.insert(group.as_str().to_string(), net.unsigned_abs());
        }
    }

    DailyInventorySnapshot {
        date,
        inventory_levels: Some(levels),
        expiring_soon: Some(expiring_soon),
        expired_today: Some(expired_today),
    }
}
