#![warn(missing_docs)]
//! FrameLens Analysis Library
//!
//! Side-effect-free algorithms behind every FrameLens analysis task:
//! - Benchmark scoring of a single frame against weighted budgets
//! - Aggregation of frame windows (means, FPS spread, dropped frames)
//! - Nearest-rank percentiles
//! - Least-squares trend classification
//! - Resource leak reports from lifecycle logs and memory series
//!
//! The same code runs inside the isolated worker and on the caller's thread,
//! so every function here must be deterministic in its inputs.

mod aggregation;
mod benchmark;
mod error;
mod format;
mod frame;
mod leaks;
mod percentiles;
mod trend;

pub use aggregation::{
    AggregationResult, DROPPED_FRAME_FACTOR, TARGET_FRAME_TIME_MS, aggregate_stats,
};
pub use benchmark::{
    BenchmarkConfig, BenchmarkScore, Grade, ScoreBreakdown, ScoreWeights, calculate_benchmark,
    ratio_score, state_change_score, timing_score,
};
pub use error::AnalysisError;
pub use format::{format_bytes, format_large_number};
pub use frame::{FrameSample, MemoryDetails, RenderingDetails};
pub use leaks::{
    ActiveResourceRecord, AlertSeverity, CategoryStats, DEFAULT_LEAK_THRESHOLD_MS,
    DEFAULT_MEMORY_GROWTH_THRESHOLD_BYTES, LeakAlert, LeakAlertType, LeakAnalysisInput,
    LeakAnalysisOptions, LeakReport, LeakSummary, LifecycleEventType,
    MEMORY_GROWTH_WINDOW, MIN_MEMORY_SAMPLES, MemorySample, ResourceLifecycleEvent,
    ResourceStats, ResourceType, analyze_leaks,
};
pub use percentiles::{
    DEFAULT_PERCENTILES, PercentileResult, PercentileValue, calculate_percentiles, median,
    nearest_rank,
};
pub use trend::{
    Confidence, LinearFit, MIN_TREND_SAMPLES, TrendDirection, TrendPoint, TrendResult,
    TrendThresholds, analyze_trend, linear_regression,
};

/// Keep only the trailing `window` items. `None` or `Some(0)` keeps everything.
pub(crate) fn trailing<T>(items: &[T], window: Option<usize>) -> &[T] {
    match window {
        Some(n) if n > 0 && n < items.len() => &items[items.len() - n..],
        _ => items,
    }
}
