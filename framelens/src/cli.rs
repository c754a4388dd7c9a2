//! `framelens` command line
//!
//! ```text
//! framelens analyze benchmark frame.json
//! framelens analyze leaks session.json --isolation process --format json -o report.json
//! framelens init-config > framelens.toml
//! ```

use crate::config::{ContextMode, EngineConfig};
use crate::dispatcher::TaskDispatcher;
use crate::formatting::{
    format_aggregation, format_benchmark, format_leak_report, format_percentiles, format_trend,
};
use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use framelens_core::WorkerMain;
use framelens_stats::{
    ActiveResourceRecord, BenchmarkConfig, FrameSample, LeakAnalysisOptions, MemorySample,
    ResourceLifecycleEvent, TrendPoint, TrendThresholds,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// FrameLens CLI arguments
#[derive(Parser, Debug)]
#[command(name = "framelens")]
#[command(author, version, about = "FrameLens - analytics offload engine for real-time rendering")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to the nearest framelens.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Internal: run as an isolated worker process
    #[arg(long, hide = true)]
    pub framelens_worker: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one analysis on a JSON input file
    Analyze {
        /// Analysis to run
        #[arg(value_enum)]
        analysis: AnalysisKind,

        /// Input JSON file ("-" for stdin)
        input: PathBuf,

        /// Override the configured context mode
        #[arg(long, value_enum)]
        isolation: Option<ContextMode>,

        /// Output format
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a default framelens.toml
    InitConfig,
}

/// Analyses available from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalysisKind {
    /// `{frame, config?}`
    Benchmark,
    /// `{frames, windowSize?}`
    Aggregate,
    /// `{values, percentiles?}`
    Percentiles,
    /// `{history, windowSize?, thresholds?}`
    Trend,
    /// `{events, activeResources, memoryHistory, sessionStart, options?}`
    Leaks,
}

/// Result rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Debug, Deserialize)]
struct BenchmarkInput {
    frame: FrameSample,
    #[serde(default)]
    config: Option<BenchmarkConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregateInput {
    frames: Vec<FrameSample>,
    #[serde(default)]
    window_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PercentilesInput {
    values: Vec<f64>,
    #[serde(default)]
    percentiles: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrendInput {
    history: Vec<TrendPoint>,
    #[serde(default)]
    window_size: Option<usize>,
    #[serde(default)]
    thresholds: Option<TrendThresholds>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaksInput {
    #[serde(default)]
    events: Vec<ResourceLifecycleEvent>,
    #[serde(default)]
    active_resources: Vec<ActiveResourceRecord>,
    #[serde(default)]
    memory_history: Vec<MemorySample>,
    #[serde(default)]
    session_start: f64,
    #[serde(default)]
    options: LeakAnalysisOptions,
}

/// Run the FrameLens CLI with the process arguments.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the FrameLens CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Worker mode first, before any other initialization
    if cli.framelens_worker {
        return run_worker_mode();
    }

    let filter = if cli.verbose {
        "framelens=debug"
    } else {
        "framelens=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Analyze {
            analysis,
            input,
            isolation,
            format,
            output,
        }) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(mode) = isolation {
                config.context.mode = mode;
            }
            let rendered = run_analysis(config, analysis, &input, format)?;
            write_output(output.as_deref(), &rendered)?;
        }
        Some(Commands::InitConfig) => {
            print!("{}", EngineConfig::default_toml());
        }
        None => {
            anyhow::bail!("no command given, try `framelens --help`");
        }
    }

    Ok(())
}

/// Run as a worker process (IPC mode)
fn run_worker_mode() -> anyhow::Result<()> {
    let mut worker = WorkerMain::from_env();
    worker
        .run()
        .map_err(|e| anyhow::anyhow!("Worker error: {}", e))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(EngineConfig::discover().unwrap_or_default()),
    }
}

fn read_input<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&content).with_context(|| format!("invalid input {}", path.display()))
}

fn render<T: serde::Serialize>(
    value: &T,
    format: OutputFormat,
    human: fn(&T) -> String,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => Ok(human(value)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)? + "\n"),
    }
}

fn run_analysis(
    config: EngineConfig,
    analysis: AnalysisKind,
    input: &Path,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mode = config.context.mode;
        let dispatcher = TaskDispatcher::new(config);
        let isolated = dispatcher.initialize().await?;
        info!(
            "Running {:?} analysis ({} context, isolated: {})",
            analysis,
            match mode {
                ContextMode::Thread => "thread",
                ContextMode::Process => "process",
                ContextMode::Disabled => "disabled",
            },
            isolated
        );

        let rendered = match analysis {
            AnalysisKind::Benchmark => {
                let input: BenchmarkInput = read_input(input)?;
                let score = dispatcher.calculate_benchmark(&input.frame, input.config).await?;
                render(&score, format, format_benchmark)?
            }
            AnalysisKind::Aggregate => {
                let input: AggregateInput = read_input(input)?;
                let result = dispatcher.aggregate_stats(&input.frames, input.window_size).await?;
                render(&result, format, format_aggregation)?
            }
            AnalysisKind::Percentiles => {
                let input: PercentilesInput = read_input(input)?;
                let result = dispatcher
                    .calculate_percentiles(&input.values, input.percentiles.as_deref())
                    .await?;
                render(&result, format, format_percentiles)?
            }
            AnalysisKind::Trend => {
                let input: TrendInput = read_input(input)?;
                let result = dispatcher
                    .analyze_trend(&input.history, input.window_size, input.thresholds)
                    .await?;
                render(&result, format, format_trend)?
            }
            AnalysisKind::Leaks => {
                let input: LeaksInput = read_input(input)?;
                let report = dispatcher
                    .analyze_leaks(
                        &input.events,
                        &input.active_resources,
                        &input.memory_history,
                        input.session_start,
                        input.options,
                    )
                    .await?;
                render(&report, format, format_leak_report)?
            }
        };

        debug!("engine stats: {:?}", dispatcher.stats());
        dispatcher.dispose();
        Ok::<_, anyhow::Error>(rendered)
    })
}

fn write_output(path: Option<&Path>, rendered: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Report written to: {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
