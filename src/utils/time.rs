// src/utils/time.rs

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

/// Source of "now" for expiry checks and default dates.
pub trait Clock: Send + Sync {
    /// Gets the current UTC date and time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Gets the current UTC calendar date.
    fn today(&self) -> NaiveDate {
        self.now_utc().date_naive()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        SystemClock
    }
}

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Clock pinned to midday UTC of `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        let midday = date
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        Self::new(midday)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
