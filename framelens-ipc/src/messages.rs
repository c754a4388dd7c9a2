//! IPC Message Types
//!
//! Requests carry a typed payload per task kind; responses carry the matching
//! typed output or a failure. Custom task data travels as JSON text so the
//! protocol stays closed over arbitrary caller types.

use framelens_stats::{
    AggregationResult, BenchmarkConfig, BenchmarkScore, FrameSample, LeakAnalysisInput, LeakReport,
    PercentileResult, TrendPoint, TrendResult, TrendThresholds,
};
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use std::fmt;

/// Analysis task category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum TaskKind {
    /// Single-frame benchmark score
    Benchmark,
    /// Resource leak report
    LeakAnalysis,
    /// Frame window aggregation
    StatsAggregation,
    /// Percentile summary
    PercentileCalc,
    /// Trend regression
    TrendAnalysis,
    /// Named handler registered by the embedding application
    Custom,
}

impl TaskKind {
    /// Wire name of the kind
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Benchmark => "benchmark",
            TaskKind::LeakAnalysis => "leakAnalysis",
            TaskKind::StatsAggregation => "statsAggregation",
            TaskKind::PercentileCalc => "percentileCalc",
            TaskKind::TrendAnalysis => "trendAnalysis",
            TaskKind::Custom => "custom",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific task input
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum TaskPayload {
    /// Score one frame
    Benchmark {
        /// Frame to score
        frame: FrameSample,
        /// Budgets, defaults when absent
        config: Option<BenchmarkConfig>,
    },
    /// Aggregate a frame window
    StatsAggregation {
        /// Frames in capture order
        frames: Vec<FrameSample>,
        /// Trailing window, all frames when absent or 0
        window_size: Option<u64>,
    },
    /// Percentiles of a value set
    PercentileCalc {
        /// Unordered values
        values: Vec<f64>,
        /// Requested percentiles
        percentiles: Vec<f64>,
    },
    /// Trend of a metric history
    TrendAnalysis {
        /// History in time order
        history: Vec<TrendPoint>,
        /// Trailing window, all points when absent or 0
        window_size: Option<u64>,
        /// Slope thresholds, defaults when absent
        thresholds: Option<TrendThresholds>,
    },
    /// Leak report with resolved reference time
    LeakAnalysis(LeakAnalysisInput),
    /// Named custom handler
    Custom {
        /// Handler name
        name: String,
        /// JSON-encoded input
        data_json: String,
    },
}

impl TaskPayload {
    /// Kind of task this payload requests
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Benchmark { .. } => TaskKind::Benchmark,
            TaskPayload::StatsAggregation { .. } => TaskKind::StatsAggregation,
            TaskPayload::PercentileCalc { .. } => TaskKind::PercentileCalc,
            TaskPayload::TrendAnalysis { .. } => TaskKind::TrendAnalysis,
            TaskPayload::LeakAnalysis(_) => TaskKind::LeakAnalysis,
            TaskPayload::Custom { .. } => TaskKind::Custom,
        }
    }
}

/// Kind-specific task output
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum TaskOutput {
    /// Benchmark score
    Benchmark(BenchmarkScore),
    /// Aggregation summary
    StatsAggregation(AggregationResult),
    /// Percentile summary
    PercentileCalc(PercentileResult),
    /// Trend classification
    TrendAnalysis(TrendResult),
    /// Leak report
    LeakAnalysis(LeakReport),
    /// JSON-encoded custom handler output
    Custom {
        /// Output as JSON text
        data_json: String,
    },
}

impl TaskOutput {
    /// Kind of task that produced this output
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskOutput::Benchmark(_) => TaskKind::Benchmark,
            TaskOutput::StatsAggregation(_) => TaskKind::StatsAggregation,
            TaskOutput::PercentileCalc(_) => TaskKind::PercentileCalc,
            TaskOutput::TrendAnalysis(_) => TaskKind::TrendAnalysis,
            TaskOutput::LeakAnalysis(_) => TaskKind::LeakAnalysis,
            TaskOutput::Custom { .. } => TaskKind::Custom,
        }
    }
}

/// Why a task produced no output
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum TaskFailure {
    /// No handler for the named custom task
    Unsupported {
        /// Requested handler name
        task: String,
    },
    /// The analysis rejected its input or panicked
    Algorithm {
        /// Human-readable error
        message: String,
    },
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Unsupported { task } => write!(f, "Unsupported task: {}", task),
            TaskFailure::Algorithm { message } => f.write_str(message),
        }
    }
}

/// A task as sent to an executor
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct TaskRequest {
    /// Correlation id (`task_<n>`)
    pub id: String,
    /// Task kind, always equal to `payload.kind()`
    pub kind: TaskKind,
    /// Task input
    pub payload: TaskPayload,
}

impl TaskRequest {
    /// Build a request, deriving the kind from the payload.
    pub fn new(id: impl Into<String>, payload: TaskPayload) -> Self {
        Self {
            id: id.into(),
            kind: payload.kind(),
            payload,
        }
    }
}

/// Outcome of one task
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct TaskResponse {
    /// Id of the request this answers
    pub id: String,
    /// Kind of the request this answers
    pub kind: TaskKind,
    /// `true` when `result` is set
    pub success: bool,
    /// Output on success
    pub result: Option<TaskOutput>,
    /// Failure otherwise
    pub error: Option<TaskFailure>,
    /// Time spent computing, in milliseconds
    pub processing_time_ms: f64,
}

impl TaskResponse {
    /// Successful response
    pub fn ok(id: impl Into<String>, output: TaskOutput, processing_time_ms: f64) -> Self {
        Self {
            id: id.into(),
            kind: output.kind(),
            success: true,
            result: Some(output),
            error: None,
            processing_time_ms,
        }
    }

    /// Failed response
    pub fn failed(
        id: impl Into<String>,
        kind: TaskKind,
        failure: TaskFailure,
        processing_time_ms: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            success: false,
            result: None,
            error: Some(failure),
            processing_time_ms,
        }
    }
}

/// Worker capabilities advertised during handshake
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerCapabilities {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// Custom handler names known to the worker
    pub custom_tasks: Vec<String>,
    /// Worker process id
    pub pid: u32,
}

impl WorkerCapabilities {
    /// Capabilities of the current process with the given custom handlers
    pub fn current(custom_tasks: Vec<String>) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            custom_tasks,
            pid: std::process::id(),
        }
    }
}

/// Messages sent from the dispatcher to the worker
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum ContextCommand {
    /// Execute a task and answer with [`WorkerMessage::Response`]
    Run(TaskRequest),
    /// Finish in-flight work and exit
    Shutdown,
}

/// Messages sent from the worker to the dispatcher
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Initial handshake
    Hello(WorkerCapabilities),
    /// Answer to a [`ContextCommand::Run`]
    Response(TaskResponse),
}
