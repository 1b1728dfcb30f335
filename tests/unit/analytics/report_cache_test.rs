#[path = "../../common/mod.rs"]
mod common;

use async_trait::async_trait;
use bloodbank_analytics::services::core::infrastructure::analytics_module::{
    AnalyticsModuleConfig, CacheKey, KvReportCacheStore, ReportBuilder, ReportCache,
    ReportCacheStore,
};
use bloodbank_analytics::services::core::infrastructure::kv::{InMemoryKvStore, KvStore};
use bloodbank_analytics::types::{ReportParameters, ReportType};
use bloodbank_analytics::utils::{AnalyticsResult, ErrorKind, ManualClock};
use common::*;
use futures::FutureExt;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Counts calls; consumes a permit when gated, panics when asked to.
struct TestBuilder {
    calls: AtomicU64,
    gate: Option<Arc<Semaphore>>,
    panic: bool,
}

impl TestBuilder {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            gate: None,
            panic: false,
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportBuilder for TestBuilder {
    async fn build_report(
        &self,
        report_type: ReportType,
        parameters: &ReportParameters,
    ) -> AnalyticsResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.panic {
            panic!("builder exploded");
        }
        Ok(json!({
            "summary": {"total": 10},
            "report_type": report_type.as_str(),
            "start_date": parameters.start_date.to_string(),
        }))
    }
}

struct Fixture {
    cache: ReportCache,
    kv: Arc<InMemoryKvStore>,
    store: Arc<KvReportCacheStore>,
    clock: Arc<ManualClock>,
}

fn fixture(builder: Arc<TestBuilder>) -> Fixture {
    let clock = Arc::new(ManualClock::at_date(date(2024, 3, 11)));
    let kv = Arc::new(InMemoryKvStore::with_clock(clock.clone()));
    let store = Arc::new(KvReportCacheStore::new(kv.clone(), clock.clone()));
    let cache = ReportCache::new(
        store.clone(),
        builder,
        clock.clone(),
        &AnalyticsModuleConfig::default(),
    )
    .unwrap();
    Fixture {
        cache,
        kv,
        store,
        clock,
    }
}

fn params() -> ReportParameters {
    ReportParameters::new(date(2024, 3, 1), date(2024, 3, 10))
}

async fn wait_until(condition: impl Fn() -> bool) {
    while !condition() {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod single_flight_tests {
    use super::*;

    #[tokio::test]
    async fn test_overrunning_generation_keeps_successor_lock() {
        let gate = Arc::new(Semaphore::new(0));
        let builder = Arc::new(TestBuilder {
            gate: Some(gate.clone()),
            ..TestBuilder::new()
        });
        let fixture = fixture(builder.clone());
        let cache = &fixture.cache;
        let parameters = params();

        let slow = cache.get_or_generate(ReportType::RequestTrends, &parameters, false);
        let successor = async {
            wait_until(|| builder.calls() == 1).await;
            fixture.clock.advance(chrono::Duration::seconds(301));
            cache
                .get_or_generate(ReportType::RequestTrends, &parameters, false)
                .await
        };
        let driver = async {
            wait_until(|| builder.calls() == 2).await;
            // First permit goes to the slow generation, which finishes after its lock expired
            gate.add_permits(1);
            wait_until(|| cache.stats().generations == 1).await;

            let held = cache
                .is_generating(ReportType::RequestTrends, &parameters)
                .await
                .unwrap();
            let third = cache
                .get_or_generate(ReportType::RequestTrends, &parameters, true)
                .await;
            gate.add_permits(1);
            (held, third)
        };
        let (slow, successor, (held, third)) = tokio::join!(slow, successor, driver);

        assert!(slow.is_ok());
        assert!(successor.is_ok());
        assert!(held);
        assert!(third.unwrap_err().is_kind(ErrorKind::GenerationConflict));
        assert_eq!(builder.calls(), 2);
        assert!(!cache
            .is_generating(ReportType::RequestTrends, &parameters)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_compute_once() {
        let gate = Arc::new(Semaphore::new(0));
        let builder = Arc::new(TestBuilder {
            gate: Some(gate.clone()),
            ..TestBuilder::new()
        });
        let fixture = fixture(builder.clone());
        let cache = &fixture.cache;
        let parameters = params();

        let first = cache.get_or_generate(ReportType::DonationSummary, &parameters, false);
        let second = async {
            let outcome = cache
                .get_or_generate(ReportType::DonationSummary, &parameters, false)
                .await;
            gate.add_permits(1);
            outcome
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_ok());
        let err = second.unwrap_err();
        assert!(err.is_kind(ErrorKind::GenerationConflict));
        assert_eq!(err.status_code(), 409);
        assert_eq!(builder.calls(), 1);
        assert_eq!(cache.stats().conflicts, 1);

        // The winner stored the payload and released the lock
        let third = cache
            .get_or_generate(ReportType::DonationSummary, &params(), false)
            .await
            .unwrap();
        assert!(third.cache_hit);
        assert!(!cache
            .is_generating(ReportType::DonationSummary, &params())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_lock_released_when_builder_panics() {
        let builder = Arc::new(TestBuilder {
            panic: true,
            ..TestBuilder::new()
        });
        let fixture = fixture(builder.clone());

        let parameters = params();
        let outcome = AssertUnwindSafe(fixture.cache.get_or_generate(
            ReportType::InventorySummary,
            &parameters,
            false,
        ))
        .catch_unwind()
        .await;
        assert!(outcome.is_err());
        assert!(!fixture
            .cache
            .is_generating(ReportType::InventorySummary, &params())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_stale_lock_expires_after_timeout() {
        let builder = Arc::new(TestBuilder::new());
        let fixture = fixture(builder.clone());
        let key = CacheKey::new(ReportType::RequestSummary, &params()).unwrap();
        assert!(fixture
            .store
            .try_acquire_lock(&key, Uuid::new_v4(), chrono::Duration::seconds(300))
            .await
            .unwrap());

        let err = fixture
            .cache
            .get_or_generate(ReportType::RequestSummary, &params(), false)
            .await
            .unwrap_err();
        assert!(err.is_kind(ErrorKind::GenerationConflict));

        fixture.clock.advance(chrono::Duration::seconds(301));
        let outcome = fixture
            .cache
            .get_or_generate(ReportType::RequestSummary, &params(), false)
            .await
            .unwrap();
        assert!(!outcome.cache_hit);
        assert_eq!(builder.calls(), 1);
    }
}

#[cfg(test)]
mod storage_tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_keyed_by_type_and_parameters() {
        let builder = Arc::new(TestBuilder::new());
        let fixture = fixture(builder.clone());

        let filtered = params().with_blood_types(["O-", "A+"]);
        let reordered = params().with_blood_types(["A+", "O-"]);
        fixture
            .cache
            .get_or_generate_report(ReportType::DonationTrends, &filtered, false)
            .await
            .unwrap();
        let again = fixture
            .cache
            .get_or_generate(ReportType::DonationTrends, &reordered, false)
            .await
            .unwrap();
        assert!(again.cache_hit);

        fixture
            .cache
            .get_or_generate_report(ReportType::DonationSummary, &filtered, false)
            .await
            .unwrap();
        assert_eq!(builder.calls(), 2);
        assert_eq!(fixture.kv.keys_with_prefix("report_cache:").len(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_a_miss() {
        let builder = Arc::new(TestBuilder::new());
        let fixture = fixture(builder.clone());
        let key = CacheKey::new(ReportType::DonationSummary, &params()).unwrap();
        fixture
            .kv
            .put(key.as_str(), "{garbage".to_string(), None)
            .await
            .unwrap();

        let outcome = fixture
            .cache
            .get_or_generate(ReportType::DonationSummary, &params(), false)
            .await
            .unwrap();
        assert!(!outcome.cache_hit);
        assert_eq!(builder.calls(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let builder = Arc::new(TestBuilder::new());
        let fixture = fixture(builder.clone());
        fixture.kv.simulate_error("kv_get_failed");

        let err = fixture
            .cache
            .get_or_generate(ReportType::DonationSummary, &params(), false)
            .await
            .unwrap_err();
        assert!(err.is_kind(ErrorKind::StorageError));
        assert_eq!(builder.calls(), 0);
    }

    #[tokio::test]
    async fn test_file_path_recorded_on_entry() {
        let builder = Arc::new(TestBuilder::new());
        let fixture = fixture(builder);
        let outcome = fixture
            .cache
            .get_or_generate(ReportType::DonationSummary, &params(), false)
            .await
            .unwrap();

        fixture
            .cache
            .record_file_path(&outcome.key, "report_20240311_120000.pdf")
            .await
            .unwrap();
        let entry = fixture.store.find_fresh(&outcome.key).await.unwrap().unwrap();
        assert_eq!(entry.file_path.as_deref(), Some("report_20240311_120000.pdf"));
        assert_eq!(entry.report_type, ReportType::DonationSummary);
        assert!(!entry.is_generating);
        assert_eq!(entry.expires_at - entry.created_at, chrono::Duration::hours(24));
    }

    #[tokio::test]
    async fn test_file_path_on_expired_entry_is_not_found() {
        let builder = Arc::new(TestBuilder::new());
        let fixture = fixture(builder);
        let outcome = fixture
            .cache
            .get_or_generate(ReportType::DonationSummary, &params(), false)
            .await
            .unwrap();

        fixture.clock.advance(chrono::Duration::hours(25));
        let err = fixture
            .cache
            .record_file_path(&outcome.key, "report_20240312_130000.xlsx")
            .await
            .unwrap_err();
        assert!(err.is_kind(ErrorKind::NotFoundError));
        assert_eq!(err.status_code(), 404);
    }
}
