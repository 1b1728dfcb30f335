// Source Repository - Read-only access to transactional records
// Donations, blood requests, inventory levels and inventory transactions owned by the
// surrounding system. The analytics core never writes through this seam.

use crate::types::{
    BloodRequestRecord, DonationRecord, InventoryRecord, InventoryTransaction,
};
use crate::utils::AnalyticsResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Donations whose request timestamp falls on `date` (UTC).
    async fn donations_on(&self, date: NaiveDate) -> AnalyticsResult<Vec<DonationRecord>>;

    /// Blood requests whose request timestamp falls on `date` (UTC).
    async fn requests_on(&self, date: NaiveDate) -> AnalyticsResult<Vec<BloodRequestRecord>>;

    /// Current inventory, one record per blood group present.
    async fn inventory(&self) -> AnalyticsResult<Vec<InventoryRecord>>;

    async fn transactions_on(&self, date: NaiveDate)
        -> AnalyticsResult<Vec<InventoryTransaction>>;

    /// Donations requested at or after `since`.
    async fn count_donations_since(&self, since: DateTime<Utc>) -> AnalyticsResult<u64>;

    /// Blood requests made at or after `since`.
    async fn count_requests_since(&self, since: DateTime<Utc>) -> AnalyticsResult<u64>;
}

/// Vec-backed source data for tests and embedded use.
#[derive(Default)]
pub struct InMemorySourceRepository {
    donations: RwLock<Vec<DonationRecord>>,
    requests: RwLock<Vec<BloodRequestRecord>>,
    inventory: RwLock<Vec<InventoryRecord>>,
    transactions: RwLock<Vec<InventoryTransaction>>,
}

impl InMemorySourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_donation(&self, donation: DonationRecord) {
        self.donations.write().push(donation);
    }

    pub fn add_request(&self, request: BloodRequestRecord) {
        self.requests.write().push(request);
    }

    pub fn add_transaction(&self, transaction: InventoryTransaction) {
        self.transactions.write().push(transaction);
    }

    /// Insert or replace the inventory record for a blood group.
    pub fn set_inventory(&self, record: InventoryRecord) {
        let mut inventory = self.inventory.write();
        match inventory
            .iter_mut()
            .find(|r| r.blood_group == record.blood_group)
        {
            Some(existing) => *existing = record,
            None => inventory.push(record),
        }
    }
}

#[async_trait]
impl SourceRepository for InMemorySourceRepository {
    async fn donations_on(&self, date: NaiveDate) -> AnalyticsResult<Vec<DonationRecord>> {
        Ok(self
            .donations
            .read()
            .iter()
            .filter(|d| d.request_timestamp.date_naive() == date)
            .cloned()
            .collect())
    }

    async fn requests_on(&self, date: NaiveDate) -> AnalyticsResult<Vec<BloodRequestRecord>> {
        Ok(self
            .requests
            .read()
            .iter()
            .filter(|r| r.request_timestamp.date_naive() == date)
            .cloned()
            .collect())
    }

    async fn inventory(&self) -> AnalyticsResult<Vec<InventoryRecord>> {
        Ok(self.inventory.read().clone())
    }

    async fn transactions_on(
        &self,
        date: NaiveDate,
    ) -> AnalyticsResult<Vec<InventoryTransaction>> {
        Ok(self
            .transactions
            .read()
            .iter()
            .filter(|t| t.timestamp.date_naive() == date)
            .cloned()
            .collect())
    }

    async fn count_donations_since(&self, since: DateTime<Utc>) -> AnalyticsResult<u64> {
        Ok(self
            .donations
            .read()
            .iter()
            .filter(|d| d.request_timestamp >= since)
            .count() as u64)
    }

    async fn count_requests_since(&self, since: DateTime<Utc>) -> AnalyticsResult<u64> {
        Ok(self
            .requests
            .read()
            .iter()
            .filter(|r| r.request_timestamp >= since)
            .count() as u64)
    }
}
