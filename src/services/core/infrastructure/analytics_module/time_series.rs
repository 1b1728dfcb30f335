// src/services/core/infrastructure/analytics_module/time_series.rs

//! Calendar bucketing for daily series.
//!
//! Weekly buckets are labelled by the Sunday that ends them, monthly buckets by the
//! last day of the month. Flow counts are summed per bucket with empty buckets between
//! the first and last zero-filled; point-in-time values keep the last observation and
//! skip empty buckets.

use crate::types::GroupBy;
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

pub const LABEL_FORMAT: &str = "%Y-%m-%d";

pub fn format_label(date: NaiveDate) -> String {
    date.format(LABEL_FORMAT).to_string()
}

/// Label of the bucket containing `date`.
pub fn bucket_end(date: NaiveDate, group_by: GroupBy) -> NaiveDate {
    match group_by {
        GroupBy::Day => date,
        GroupBy::Week => {
            let days_to_sunday = 6 - date.weekday().num_days_from_monday() as i64;
            date + Duration::days(days_to_sunday)
        }
        GroupBy::Month => last_day_of_month(date),
    }
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

fn next_bucket(label: NaiveDate, group_by: GroupBy) -> NaiveDate {
    bucket_end(label + Duration::days(1), group_by)
}

/// Sum `N` count columns per bucket. Input must be ordered by date.
pub fn resample_sum<const N: usize>(
    points: &[(NaiveDate, [u64; N])],
    group_by: GroupBy,
) -> Vec<(NaiveDate, [u64; N])> {
    if group_by == GroupBy::Day {
        return points.to_vec();
    }

    let mut buckets: BTreeMap<NaiveDate, [u64; N]> = BTreeMap::new();
    for (date, values) in points {
        let entry = buckets
            .entry(bucket_end(*date, group_by))
            .or_insert([0; N]);
        for (acc, value) in entry.iter_mut().zip(values.iter()) {
            *acc += value;
        }
    }

    let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Vec::new(),
    };

    let mut series = Vec::new();
    let mut label = first;
    while label <= last {
        series.push((label, buckets.get(&label).copied().unwrap_or([0; N])));
        label = next_bucket(label, group_by);
    }
    series
}

/// Keep the last value per bucket. Input must be ordered by date.
pub fn resample_last<T: Clone>(points: &[(NaiveDate, T)], group_by: GroupBy) -> Vec<(NaiveDate, T)> {
    let mut buckets: BTreeMap<NaiveDate, T> = BTreeMap::new();
    for (date, value) in points {
        buckets.insert(bucket_end(*date, group_by), value.clone());
    }
    buckets.into_iter().collect()
}

/// Daily series from the first observation to the last, carrying the previous value
/// over missing days.
pub fn forward_fill_daily(points: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    let mut filled = Vec::new();
    let mut iter = points.iter().peekable();
    while let Some((date, value)) = iter.next() {
        filled.push((*date, *value));
        if let Some((next_date, _)) = iter.peek() {
            let mut gap = *date + Duration::days(1);
            while gap < *next_date {
                filled.push((gap, *value));
                gap += Duration::days(1);
            }
        }
    }
    filled
}
