//! Trend classification by ordinary least squares

use crate::trailing;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// Regression is skipped below this many samples
pub const MIN_TREND_SAMPLES: usize = 3;

/// One observation in a metric history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct TrendPoint {
    /// Observation time in milliseconds
    #[serde(rename = "timestamp")]
    pub timestamp_ms: f64,
    /// Observed value
    pub value: f64,
}

impl TrendPoint {
    /// Create a point
    pub fn new(timestamp_ms: f64, value: f64) -> Self {
        Self { timestamp_ms, value }
    }
}

/// Slope thresholds (units per second) separating the three trend classes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct TrendThresholds {
    /// Slopes below this are improving
    pub improving: f64,
    /// Slopes above this are degrading
    pub degrading: f64,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            improving: -0.1,
            degrading: 0.1,
        }
    }
}

/// Direction of a metric over time
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Slope below the improving threshold
    Improving,
    /// Slope between the thresholds
    Stable,
    /// Slope above the degrading threshold
    Degrading,
}

/// How well the line fits, from R²
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// R² >= 0.7
    High,
    /// R² >= 0.4
    Medium,
    /// Anything else
    Low,
}

impl Confidence {
    /// Band an R² value.
    pub fn from_r_squared(r_squared: f64) -> Self {
        if r_squared >= 0.7 {
            Confidence::High
        } else if r_squared >= 0.4 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Trend classification of a history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct TrendResult {
    /// Classified direction
    pub trend: TrendDirection,
    /// Fitted slope per second
    pub slope: f64,
    /// Coefficient of determination, in [0, 1]
    pub r_squared: f64,
    /// Fitted value one second past the last sample, floored at 0
    pub prediction: f64,
    /// Change from first to last sample as a percentage of the first
    pub change_percent: f64,
    /// Fit confidence
    pub confidence: Confidence,
}

/// Least-squares line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    /// Slope
    pub slope: f64,
    /// Y intercept
    pub intercept: f64,
    /// R², clamped to [0, 1]
    pub r_squared: f64,
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Fit `y = intercept + slope * x`. Non-finite coefficients become 0.
pub fn linear_regression(points: &[(f64, f64)]) -> LinearFit {
    let n = points.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for &(x, y) in points {
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x);
    let intercept = (sum_y - slope * sum_x) / n;

    let mean_y = sum_y / n;
    let (mut ss_total, mut ss_residual) = (0.0, 0.0);
    for &(x, y) in points {
        let predicted = intercept + slope * x;
        ss_total += (y - mean_y).powi(2);
        ss_residual += (y - predicted).powi(2);
    }
    let r_squared = if ss_total != 0.0 {
        1.0 - ss_residual / ss_total
    } else {
        0.0
    };

    LinearFit {
        slope: finite_or_zero(slope),
        intercept: finite_or_zero(intercept),
        r_squared: if r_squared.is_finite() {
            r_squared.clamp(0.0, 1.0)
        } else {
            0.0
        },
    }
}

/// Classify the trailing `window_size` points of `history` (`None` or 0 = all).
pub fn analyze_trend(
    history: &[TrendPoint],
    window_size: Option<usize>,
    thresholds: Option<TrendThresholds>,
) -> TrendResult {
    let data = trailing(history, window_size);
    let thresholds = thresholds.unwrap_or_default();

    if data.len() < MIN_TREND_SAMPLES {
        return TrendResult {
            trend: TrendDirection::Stable,
            slope: 0.0,
            r_squared: 0.0,
            prediction: data.last().map_or(0.0, |p| p.value),
            change_percent: 0.0,
            confidence: Confidence::Low,
        };
    }

    let start = data[0].timestamp_ms;
    let points: Vec<(f64, f64)> = data
        .iter()
        .map(|p| ((p.timestamp_ms - start) / 1000.0, p.value))
        .collect();
    let fit = linear_regression(&points);

    let trend = if fit.slope < thresholds.improving {
        TrendDirection::Improving
    } else if fit.slope > thresholds.degrading {
        TrendDirection::Degrading
    } else {
        TrendDirection::Stable
    };

    let first = data[0].value;
    let last = data[data.len() - 1].value;
    let change_percent = if first != 0.0 {
        (last - first) / first * 100.0
    } else {
        0.0
    };

    let last_x = points[points.len() - 1].0;
    let prediction = fit.intercept + fit.slope * (last_x + 1.0);

    TrendResult {
        trend,
        slope: fit.slope,
        r_squared: fit.r_squared,
        prediction: prediction.max(0.0),
        change_percent,
        confidence: Confidence::from_r_squared(fit.r_squared),
    }
}
