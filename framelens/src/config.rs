//! Configuration loading from framelens.toml
//!
//! Engine configuration can be specified in a `framelens.toml` file in the project
//! root. The configuration is discovered by walking up from the current directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// FrameLens engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Task admission and timing
    #[serde(default)]
    pub engine: EngineSettings,
    /// Isolated execution context
    #[serde(default)]
    pub context: ContextSettings,
}

/// Task admission and timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Concurrency ceiling on pending tasks
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Per-task timeout in milliseconds
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// Trace task lifecycle events at debug level
    #[serde(default)]
    pub enable_logging: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            task_timeout_ms: default_task_timeout_ms(),
            enable_logging: false,
        }
    }
}

fn default_max_concurrent_tasks() -> usize {
    10
}
fn default_task_timeout_ms() -> u64 {
    30_000
}

/// How the isolated execution context is hosted
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Dedicated worker thread over OS pipes (default)
    #[default]
    Thread,
    /// Child worker process over inherited fds
    Process,
    /// No isolated context; everything runs on the fallback path
    Disabled,
}

/// Isolated execution context settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContextSettings {
    /// Hosting mode: "thread", "process" or "disabled"
    #[serde(default)]
    pub mode: ContextMode,
    /// Worker executable for process mode (current executable if unset)
    #[serde(default)]
    pub worker_binary: Option<PathBuf>,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("framelens.toml");
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Per-task timeout
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.task_timeout_ms)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# FrameLens Configuration

[engine]
# Maximum number of tasks in flight before new calls are rejected
max_concurrent_tasks = 10
# Per-task timeout in milliseconds
task_timeout_ms = 30000
# Trace every task dispatch and completion at debug level
enable_logging = false

[context]
# Where analysis runs: "thread", "process" or "disabled" (fallback only)
mode = "thread"
# Worker executable for process mode (uncomment to override the current executable)
# worker_binary = "/usr/local/bin/framelens"
"#
        .to_string()
    }
}
