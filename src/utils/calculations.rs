// src/utils/calculations.rs

use serde::{Deserialize, Serialize};

/// Percentage of `numerator` over `denominator`; 0 when the denominator is 0.
pub fn compute_rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64 * 100.0
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Result of a degree-1 least-squares fit over `x = 0..n`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Values of the fitted line at `x = start..start + count`.
    pub fn project(&self, start: usize, count: usize) -> Vec<f64> {
        (start..start + count)
            .map(|x| self.evaluate(x as f64))
            .collect()
    }
}

/// Ordinary least squares over the series index.
///
/// Returns `None` for an empty series. A single point fits a flat line through it.
pub fn linear_fit(values: &[f64]) -> Option<LinearFit> {
    if values.is_empty() {
        return None;
    }
    if values.len() == 1 {
        return Some(LinearFit {
            slope: 0.0,
            intercept: values[0],
        });
    }

    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values
        .iter()
        .enumerate()
        .map(|(i, &y)| i as f64 * y)
        .sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();

    let denominator = n * sum_x2 - sum_x.powi(2);
    if denominator.abs() < f64::EPSILON {
        return Some(LinearFit {
            slope: 0.0,
            intercept: sum_y / n,
        });
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Some(LinearFit { slope, intercept })
}

/// Direction of a count series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
}

impl TrendDirection {
    /// Classify a fitted slope against a symmetric threshold.
    pub fn from_slope(slope: f64, threshold: f64) -> Self {
        if slope > threshold {
            TrendDirection::Increasing
        } else if slope < -threshold {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }

    /// Fit and classify a series in one step.
    pub fn of_series(values: &[f64], threshold: f64) -> Self {
        match linear_fit(values) {
            Some(fit) => Self::from_slope(fit.slope, threshold),
            None => TrendDirection::InsufficientData,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
            TrendDirection::InsufficientData => "insufficient_data",
        }
    }
}

/// Direction of a rate series (success rate, fulfillment rate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTrend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

impl RateTrend {
    pub fn of_series(values: &[f64], threshold: f64) -> Self {
        TrendDirection::of_series(values, threshold).into()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateTrend::Improving => "improving",
            RateTrend::Declining => "declining",
            RateTrend::Stable => "stable",
            RateTrend::InsufficientData => "insufficient_data",
        }
    }
}

impl From<TrendDirection> for RateTrend {
    fn from(direction: TrendDirection) -> Self {
        match direction {
            TrendDirection::Increasing => RateTrend::Improving,
            TrendDirection::Decreasing => RateTrend::Declining,
            TrendDirection::Stable => RateTrend::Stable,
            TrendDirection::InsufficientData => RateTrend::InsufficientData,
        }
    }
}
