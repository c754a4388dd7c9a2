//! FrameLens
//!
//! Analytics offload engine for real-time rendering. CPU-heavy analysis
//! (benchmark scoring, aggregation, percentiles, trend regression, leak
//! detection) runs in an isolated context reached only through serialized
//! messages, or synchronously on the caller's thread when no context is
//! available. Results are identical either way.
//!
//! # Example
//!
//! ```ignore
//! use framelens::{TaskDispatcher, EngineConfig};
//! use framelens_stats::FrameSample;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let dispatcher = TaskDispatcher::new(EngineConfig::discover().unwrap_or_default());
//!     let score = dispatcher
//!         .calculate_benchmark(&FrameSample::new(14.2, 180, 420_000), None)
//!         .await?;
//!     println!("{} ({})", score.overall, score.grade);
//!     Ok(())
//! }
//! ```

mod cli;
mod clock;
mod config;
mod context;
mod dispatcher;
mod error;
mod executor;
mod formatting;
mod registry;
mod stats;

pub use cli::{AnalysisKind, Cli, Commands, OutputFormat, run, run_with_cli};
pub use clock::now_ms;
pub use config::{ContextMode, ContextSettings, EngineConfig, EngineSettings};
pub use context::{
    ContextError, ContextLauncher, ContextTransport, DisabledLauncher, ProcessLauncher,
    ThreadLauncher,
};
pub use dispatcher::{DispatcherBuilder, TaskDispatcher};
pub use error::EngineError;
pub use executor::{ExecutionStrategy, FallbackExecutor};
pub use formatting::{
    format_aggregation, format_benchmark, format_leak_report, format_percentiles, format_trend,
};
pub use stats::EngineStats;
