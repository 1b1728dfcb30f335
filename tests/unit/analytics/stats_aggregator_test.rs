#[path = "../../common/mod.rs"]
mod common;

use bloodbank_analytics::services::core::infrastructure::analytics_module::StatsAggregator;
use bloodbank_analytics::services::core::infrastructure::database_repositories::StatsRepository;
use bloodbank_analytics::types::{
    BloodGroup, DonationCounts, DonationStatus, RequestStatus, TransactionType,
};
use common::*;

fn aggregator(harness: &TestHarness) -> StatsAggregator {
    StatsAggregator::new(
        harness.source.clone(),
        harness.stats.clone(),
        harness.clock.clone(),
    )
}

#[cfg(test)]
mod daily_rollup_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_day_produces_zeroed_rollup() {
        let day = date(2024, 3, 5);
        let harness = TestHarness::new(day);

        let rollup = aggregator(&harness)
            .generate_daily_stats(Some(day))
            .await
            .unwrap();

        assert_eq!(rollup.donations.total_donations, 0);
        assert_eq!(rollup.donations.successful_donations, 0);
        assert_eq!(rollup.donations.rejected_donations, 0);
        let breakdown = rollup.donations.blood_type_breakdown.unwrap();
        assert_eq!(breakdown.len(), 8);
        assert!(breakdown.values().all(|c| *c == DonationCounts::default()));
        assert_eq!(rollup.requests.total_requests, 0);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_single_row() {
        let day = date(2024, 3, 5);
        let harness = TestHarness::new(day);
        harness.source.add_donation(donation(
            1,
            day,
            BloodGroup::APositive,
            DonationStatus::Approved,
        ));
        let aggregator = aggregator(&harness);

        let first = aggregator.generate_daily_stats(Some(day)).await.unwrap();
        let second = aggregator.generate_daily_stats(Some(day)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(harness.stats.donation_row_count(), 1);
        assert_eq!(harness.stats.request_row_count(), 1);
        assert_eq!(harness.stats.inventory_row_count(), 1);

        let stored = harness.stats.donation_stats_between(day, day).await.unwrap();
        assert_eq!(stored, vec![first.donations]);
    }

    #[tokio::test]
    async fn test_default_date_is_today() {
        let today = date(2024, 3, 9);
        let harness = TestHarness::new(today);
        let rollup = aggregator(&harness).generate_daily_stats(None).await.unwrap();
        assert_eq!(rollup.date, today);
    }
}

#[cfg(test)]
mod record_counting_tests {
    use super::*;

    #[tokio::test]
    async fn test_donation_and_request_counts() {
        let day = date(2024, 3, 5);
        let harness = TestHarness::new(day);
        harness.source.add_donation(donation(1, day, BloodGroup::APositive, DonationStatus::Approved));
        harness.source.add_donation(donation(2, day, BloodGroup::APositive, DonationStatus::Rejected));
        harness.source.add_donation(donation(3, day, BloodGroup::ONegative, DonationStatus::Pending));
        // Different day, must not be counted
        harness.source.add_donation(donation(4, date(2024, 3, 6), BloodGroup::APositive, DonationStatus::Approved));

        harness.source.add_request(request(1, day, BloodGroup::BPositive, true, RequestStatus::Fulfilled));
        harness.source.add_request(request(2, day, BloodGroup::BPositive, true, RequestStatus::Pending));
        harness.source.add_request(request(3, day, BloodGroup::AbNegative, false, RequestStatus::Denied));
        harness.source.add_request(request(4, day, BloodGroup::OPositive, false, RequestStatus::Cancelled));

        let rollup = aggregator(&harness).generate_daily_stats(Some(day)).await.unwrap();

        let donations = &rollup.donations;
        assert_eq!(donations.total_donations, 3);
        assert_eq!(donations.successful_donations, 1);
        assert_eq!(donations.rejected_donations, 1);
        let a_pos = donations.blood_type_breakdown.as_ref().unwrap()["A+"];
        assert_eq!(a_pos.total, 2);
        assert_eq!(a_pos.successful, 1);

        let requests = &rollup.requests;
        assert_eq!(requests.total_requests, 4);
        assert_eq!(requests.fulfilled_requests, 1);
        assert_eq!(requests.pending_requests, 1);
        assert_eq!(requests.cancelled_requests, 2);
        let urgency = requests.urgency_breakdown.unwrap();
        assert_eq!(urgency.urgent, 2);
        assert_eq!(urgency.normal, 2);
        assert_eq!(urgency.urgent_fulfilled, 1);
    }

    #[tokio::test]
    async fn test_inventory_snapshot_levels_and_expired() {
        let day = date(2024, 3, 5);
        let harness = TestHarness::new(day);
        harness.source.set_inventory(inventory(BloodGroup::APositive, 12, false));
        harness.source.set_inventory(inventory(BloodGroup::ONegative, 3, true));
        harness.source.add_transaction(transaction(TransactionType::Request, -4, BloodGroup::APositive, day));
        harness.source.add_transaction(transaction(TransactionType::Donation, 1, BloodGroup::APositive, day));
        harness.source.add_transaction(transaction(TransactionType::Donation, 2, BloodGroup::ONegative, day));

        let snapshot = aggregator(&harness)
            .generate_inventory_snapshot(day)
            .await
            .unwrap();

        let levels = snapshot.inventory_levels.unwrap();
        assert_eq!(levels["A+"], 12);
        assert_eq!(levels["O-"], 3);
        assert_eq!(snapshot.expiring_soon.unwrap().get("O-"), Some(&3));
        let expired = snapshot.expired_today.unwrap();
        assert_eq!(expired.get("A+"), Some(&3));
        assert!(!expired.contains_key("O-"));
    }
}

#[cfg(test)]
mod dashboard_tests {
    use super::*;

    #[tokio::test]
    async fn test_dashboard_windows() {
        // 2024-03-14 is a Thursday; the week starts Monday 2024-03-11
        let today = date(2024, 3, 14);
        let harness = TestHarness::new(today);
        harness.source.add_donation(donation(1, today, BloodGroup::APositive, DonationStatus::Pending));
        harness.source.add_donation(donation(2, date(2024, 3, 11), BloodGroup::APositive, DonationStatus::Pending));
        harness.source.add_donation(donation(3, date(2024, 3, 2), BloodGroup::APositive, DonationStatus::Pending));
        harness.source.add_donation(donation(4, date(2024, 2, 28), BloodGroup::APositive, DonationStatus::Pending));
        harness.source.add_request(request(1, date(2024, 3, 10), BloodGroup::APositive, false, RequestStatus::Pending));
        harness.source.set_inventory(inventory(BloodGroup::BNegative, 2, true));
        harness.source.set_inventory(inventory(BloodGroup::BPositive, 20, false));

        let metrics = aggregator(&harness).dashboard_metrics().await.unwrap();

        assert_eq!(metrics.donations_today, 1);
        assert_eq!(metrics.donations_this_week, 2);
        assert_eq!(metrics.donations_this_month, 3);
        assert_eq!(metrics.requests_today, 0);
        assert_eq!(metrics.requests_this_week, 0);
        assert_eq!(metrics.requests_this_month, 1);
        assert_eq!(metrics.critical_inventory.len(), 1);
        assert_eq!(metrics.critical_inventory.get("B-"), Some(&2));
        assert_eq!(metrics.expiring_soon, metrics.critical_inventory);
    }
}
