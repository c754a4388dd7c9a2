//! Nearest-rank percentiles

use crate::error::AnalysisError;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// Percentiles computed when the caller does not request any
pub const DEFAULT_PERCENTILES: [f64; 4] = [50.0, 90.0, 95.0, 99.0];

/// One requested percentile and its value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct PercentileValue {
    /// Requested percentile (0-100)
    pub percentile: f64,
    /// Value at that rank
    pub value: f64,
}

/// Distribution summary of a set of values
///
/// In JSON the percentiles form an object keyed by percentile, e.g.
/// `{"percentiles": {"50": 2.0, "99.9": 4.0}, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct PercentileResult {
    /// Requested percentiles, in request order, without duplicates
    #[serde(with = "percentile_map")]
    pub percentiles: Vec<PercentileValue>,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Median
    pub median: f64,
}

impl PercentileResult {
    /// Look up a requested percentile.
    pub fn get(&self, percentile: f64) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|p| p.percentile == percentile)
            .map(|p| p.value)
    }
}

/// Nearest-rank value of `p` in ascending `sorted` data.
///
/// Index is `ceil(p/100 * n) - 1`, clamped into the slice. Returns 0 for empty data.
pub fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[index]
}

/// Median of ascending `sorted` data, averaging the middle pair for even lengths.
pub fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    if n % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Compute min, max, mean, median and the requested percentiles of `values`.
pub fn calculate_percentiles(
    values: &[f64],
    percentiles: &[f64],
) -> Result<PercentileResult, AnalysisError> {
    if let Some(bad) = percentiles
        .iter()
        .find(|p| !p.is_finite() || !(0.0..=100.0).contains(*p))
    {
        return Err(AnalysisError::InvalidInput(format!(
            "percentile {} is outside [0, 100]",
            bad
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut requested: Vec<PercentileValue> = Vec::with_capacity(percentiles.len());
    for &p in percentiles {
        if requested.iter().any(|r| r.percentile == p) {
            continue;
        }
        requested.push(PercentileValue {
            percentile: p,
            value: nearest_rank(&sorted, p),
        });
    }

    if sorted.is_empty() {
        return Ok(PercentileResult {
            percentiles: requested,
            ..Default::default()
        });
    }

    Ok(PercentileResult {
        percentiles: requested,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean: values.iter().sum::<f64>() / values.len() as f64,
        median: median(&sorted),
    })
}

mod percentile_map {
    use super::PercentileValue;
    use serde::de::{Error, MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(values: &[PercentileValue], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(values.iter().map(|p| (p.percentile.to_string(), p.value)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<PercentileValue>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PercentileMap;

        impl<'de> Visitor<'de> for PercentileMap {
            type Value = Vec<PercentileValue>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map from percentile to value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut values = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, f64>()? {
                    let percentile = key.parse::<f64>().map_err(|_| {
                        A::Error::custom(format!("invalid percentile key {:?}", key))
                    })?;
                    values.push(PercentileValue { percentile, value });
                }
                Ok(values)
            }
        }

        deserializer.deserialize_map(PercentileMap)
    }
}
