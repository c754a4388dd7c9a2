//! Task Dispatcher
//!
//! Public entry point of the engine. Each call is admitted into the pending
//! registry, routed to the isolated context when it is healthy or to the
//! fallback executor otherwise, and resolved by exactly one of response,
//! failure, timeout or cancellation.

use crate::clock;
use crate::config::{ContextMode, EngineConfig};
use crate::context::{
    ContextLauncher, ContextManager, DisabledLauncher, HANDSHAKE_TIMEOUT, ProcessLauncher,
    ThreadLauncher,
};
use crate::error::EngineError;
use crate::executor::{Executor, FallbackExecutor, IsolatedExecutor};
use crate::registry::{Route, TaskRegistry};
use crate::stats::EngineStats;
use framelens_core::CustomTaskTable;
use framelens_ipc::{TaskKind, TaskOutput, TaskPayload, TaskRequest, TaskResponse, WorkerCapabilities};
use framelens_stats::{
    ActiveResourceRecord, AggregationResult, BenchmarkConfig, BenchmarkScore, DEFAULT_PERCENTILES,
    FrameSample, LeakAnalysisInput, LeakAnalysisOptions, LeakReport, MemorySample, PercentileResult,
    ResourceLifecycleEvent, TrendPoint, TrendResult, TrendThresholds,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Builder for [`TaskDispatcher`]
pub struct DispatcherBuilder {
    config: EngineConfig,
    launcher: Option<Arc<dyn ContextLauncher>>,
    custom: CustomTaskTable,
    handshake_timeout: Duration,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            launcher: None,
            custom: CustomTaskTable::with_registered(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_concurrent_tasks(mut self, limit: usize) -> Self {
        self.config.engine.max_concurrent_tasks = limit;
        self
    }

    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.task_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.engine.enable_logging = enabled;
        self
    }

    /// Bound on launching a context and receiving its hello
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Use a specific launcher instead of the one `context.mode` selects
    pub fn launcher(mut self, launcher: impl ContextLauncher) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    /// Register a custom task handler for both strategies.
    ///
    /// Worker processes only know handlers submitted through `inventory`.
    pub fn register_custom<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.custom.register(name, handler);
        self
    }

    pub fn build(self) -> TaskDispatcher {
        let engine = &self.config.engine;
        let registry = Arc::new(TaskRegistry::new(
            engine.max_concurrent_tasks,
            self.config.task_timeout(),
            engine.enable_logging,
        ));

        let launcher = self.launcher.unwrap_or_else(|| match self.config.context.mode {
            ContextMode::Thread => Arc::new(ThreadLauncher),
            ContextMode::Process => {
                Arc::new(ProcessLauncher::new(self.config.context.worker_binary.clone()))
            }
            ContextMode::Disabled => Arc::new(DisabledLauncher),
        });

        TaskDispatcher {
            context: ContextManager::new(
                launcher,
                self.custom.clone(),
                Arc::clone(&registry),
                self.handshake_timeout,
            ),
            fallback: FallbackExecutor::new(self.custom),
            registry,
            disposed: AtomicBool::new(false),
            log_tasks: engine.enable_logging,
        }
    }
}

/// Routes analysis tasks to the isolated context or the fallback executor
///
/// ```ignore
/// let dispatcher = TaskDispatcher::new(EngineConfig::default());
/// let score = dispatcher.calculate_benchmark(&frame, None).await?;
/// println!("{} ({})", score.overall, score.grade);
/// ```
pub struct TaskDispatcher {
    registry: Arc<TaskRegistry>,
    context: ContextManager,
    fallback: FallbackExecutor,
    disposed: AtomicBool,
    log_tasks: bool,
}

impl TaskDispatcher {
    /// Dispatcher from configuration, with `inventory`-registered custom tasks
    pub fn new(config: EngineConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Launch the isolated context if it has not been attempted yet.
    ///
    /// Concurrent callers share one attempt. Returns whether isolation is available.
    pub async fn initialize(&self) -> Result<bool, EngineError> {
        self.check_disposed()?;
        Ok(self.context.ensure().await.is_some_and(|c| c.is_healthy()))
    }

    /// Tear down the current context and launch a new one.
    pub async fn reinitialize(&self) -> Result<bool, EngineError> {
        self.check_disposed()?;
        let available = self.context.reinitialize().await;
        if self.log_tasks {
            debug!("Context reinitialized, available: {}", available);
        }
        Ok(available)
    }

    /// Score one frame against budgets (defaults when `None`).
    pub async fn calculate_benchmark(
        &self,
        frame: &FrameSample,
        config: Option<BenchmarkConfig>,
    ) -> Result<BenchmarkScore, EngineError> {
        let payload = TaskPayload::Benchmark {
            frame: frame.clone(),
            config,
        };
        match self.dispatch(payload).await? {
            TaskOutput::Benchmark(score) => Ok(score),
            other => Err(unexpected(TaskKind::Benchmark, &other)),
        }
    }

    /// Aggregate the trailing `window_size` frames (all when `None` or 0).
    pub async fn aggregate_stats(
        &self,
        frames: &[FrameSample],
        window_size: Option<usize>,
    ) -> Result<AggregationResult, EngineError> {
        let payload = TaskPayload::StatsAggregation {
            frames: frames.to_vec(),
            window_size: window_size.map(|n| n as u64),
        };
        match self.dispatch(payload).await? {
            TaskOutput::StatsAggregation(result) => Ok(result),
            other => Err(unexpected(TaskKind::StatsAggregation, &other)),
        }
    }

    /// Nearest-rank percentiles, `[50, 90, 95, 99]` when `None`.
    ///
    /// An explicit empty list yields no percentile entries.
    pub async fn calculate_percentiles(
        &self,
        values: &[f64],
        percentiles: Option<&[f64]>,
    ) -> Result<PercentileResult, EngineError> {
        let payload = TaskPayload::PercentileCalc {
            values: values.to_vec(),
            percentiles: percentiles.unwrap_or(&DEFAULT_PERCENTILES).to_vec(),
        };
        match self.dispatch(payload).await? {
            TaskOutput::PercentileCalc(result) => Ok(result),
            other => Err(unexpected(TaskKind::PercentileCalc, &other)),
        }
    }

    /// Classify the trend of the trailing `window_size` points.
    pub async fn analyze_trend(
        &self,
        history: &[TrendPoint],
        window_size: Option<usize>,
        thresholds: Option<TrendThresholds>,
    ) -> Result<TrendResult, EngineError> {
        let payload = TaskPayload::TrendAnalysis {
            history: history.to_vec(),
            window_size: window_size.map(|n| n as u64),
            thresholds,
        };
        match self.dispatch(payload).await? {
            TaskOutput::TrendAnalysis(result) => Ok(result),
            other => Err(unexpected(TaskKind::TrendAnalysis, &other)),
        }
    }

    /// Build a leak report. The reference time is `options.now_ms`, or the
    /// engine clock at dispatch when unset.
    pub async fn analyze_leaks(
        &self,
        events: &[ResourceLifecycleEvent],
        active_resources: &[ActiveResourceRecord],
        memory_history: &[MemorySample],
        session_start_ms: f64,
        options: LeakAnalysisOptions,
    ) -> Result<LeakReport, EngineError> {
        let input = LeakAnalysisInput::new(
            events.to_vec(),
            active_resources.to_vec(),
            memory_history.to_vec(),
            session_start_ms,
            options,
            clock::now_ms(),
        );
        match self.dispatch(TaskPayload::LeakAnalysis(input)).await? {
            TaskOutput::LeakAnalysis(report) => Ok(report),
            other => Err(unexpected(TaskKind::LeakAnalysis, &other)),
        }
    }

    /// Run a named custom handler on JSON-serializable data.
    pub async fn execute_custom<I, O>(&self, name: &str, data: &I) -> Result<O, EngineError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let data_json =
            serde_json::to_string(data).map_err(|e| EngineError::Serialization(e.to_string()))?;
        let payload = TaskPayload::Custom {
            name: name.to_string(),
            data_json,
        };
        match self.dispatch(payload).await? {
            TaskOutput::Custom { data_json } => serde_json::from_str(&data_json)
                .map_err(|e| EngineError::Serialization(e.to_string())),
            other => Err(unexpected(TaskKind::Custom, &other)),
        }
    }

    async fn dispatch(&self, payload: TaskPayload) -> Result<TaskOutput, EngineError> {
        self.check_disposed()?;
        let connection = self
            .context
            .ensure()
            .await
            .filter(|connection| connection.is_healthy());
        self.check_disposed()?;

        let route = connection
            .as_ref()
            .map_or(Route::Fallback, |c| Route::Isolated(c.generation()));
        let admission = self.registry.admit(route, payload.kind())?;
        let request = TaskRequest::new(admission.id.clone(), payload);

        match connection {
            Some(connection) => self.submit(&IsolatedExecutor::new(connection), request),
            None => self.submit(&self.fallback, request),
        }

        let response = admission.outcome.await.map_err(|_| EngineError::Cancelled {
            id: admission.id.clone(),
        })??;
        into_output(response)
    }

    fn submit(&self, executor: &dyn Executor, request: TaskRequest) {
        let id = request.id.clone();
        if self.log_tasks {
            debug!("Dispatching {} ({}) via {}", id, request.kind, executor.strategy());
        }
        self.registry.arm_timer(&id);
        executor.submit(request, &self.registry);
    }

    fn check_disposed(&self) -> Result<(), EngineError> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(EngineError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Snapshot of the counters plus live pending count and availability
    pub fn stats(&self) -> EngineStats {
        self.registry.snapshot(self.is_available())
    }

    /// Zero the counters. Pending tasks are unaffected.
    pub fn reset_stats(&self) {
        self.registry.reset_counters();
    }

    /// Whether the isolated context is currently usable
    pub fn is_available(&self) -> bool {
        !self.is_disposed() && self.context.is_available()
    }

    /// Handshake data of the current context, if one is connected
    pub fn context_capabilities(&self) -> Option<WorkerCapabilities> {
        self.context
            .current()
            .map(|connection| connection.capabilities().clone())
    }

    pub fn pending_task_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Reject every pending task with [`EngineError::Cancelled`]. Returns how many were cancelled.
    pub fn cancel_all_tasks(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        if self.log_tasks && cancelled > 0 {
            debug!("Cancelled {} pending task(s)", cancelled);
        }
        cancelled
    }

    /// Cancel everything and shut the context down. Later calls fail with
    /// [`EngineError::Disposed`]. Calling it again is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_all_tasks();
        self.context.shutdown();
        if self.log_tasks {
            debug!("TaskDispatcher disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Default for TaskDispatcher {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn into_output(response: TaskResponse) -> Result<TaskOutput, EngineError> {
    if !response.success {
        return Err(match response.error {
            Some(failure) => failure.into(),
            None => EngineError::AlgorithmError(format!("task {} failed", response.id)),
        });
    }
    response.result.ok_or_else(|| {
        EngineError::Protocol(format!("task {} succeeded without a result", response.id))
    })
}

fn unexpected(expected: TaskKind, output: &TaskOutput) -> EngineError {
    EngineError::Protocol(format!(
        "expected {} result, got {}",
        expected,
        output.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelens_ipc::TaskFailure;

    fn fallback_only() -> TaskDispatcher {
        TaskDispatcher::builder()
            .launcher(DisabledLauncher)
            .build()
    }

    #[tokio::test]
    async fn test_fallback_benchmark() {
        let dispatcher = fallback_only();
        assert!(!dispatcher.initialize().await.unwrap());

        let score = dispatcher
            .calculate_benchmark(&FrameSample::new(5.0, 50, 100_000), None)
            .await
            .unwrap();
        assert_eq!(score.grade, framelens_stats::Grade::A);

        let stats = dispatcher.stats();
        assert_eq!(stats.total_tasks, 1);
        assert_eq!(stats.completed_tasks, 1);
        assert!(!stats.is_available);
    }

    #[tokio::test]
    async fn test_default_percentiles() {
        let dispatcher = fallback_only();
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let result = dispatcher.calculate_percentiles(&values, None).await.unwrap();
        let requested: Vec<f64> = result.percentiles.iter().map(|p| p.percentile).collect();
        assert_eq!(requested, vec![50.0, 90.0, 95.0, 99.0]);
        assert_eq!(result.get(90.0), Some(90.0));
    }

    #[tokio::test]
    async fn test_explicit_empty_percentiles() {
        let dispatcher = fallback_only();
        let result = dispatcher
            .calculate_percentiles(&[1.0, 2.0, 3.0], Some(&[]))
            .await
            .unwrap();
        assert!(result.percentiles.is_empty());
        assert_eq!(result.median, 2.0);
        assert_eq!(result.max, 3.0);
    }

    #[tokio::test]
    async fn test_custom_roundtrip_types() {
        let dispatcher = TaskDispatcher::builder()
            .launcher(DisabledLauncher)
            .register_custom("sum", |data| {
                let values: Vec<f64> =
                    serde_json::from_value(data).map_err(|e| e.to_string())?;
                Ok(serde_json::json!(values.iter().sum::<f64>()))
            })
            .build();

        let total: f64 = dispatcher
            .execute_custom("sum", &[1.5, 2.5, 3.0])
            .await
            .unwrap();
        assert_eq!(total, 7.0);

        let err = dispatcher
            .execute_custom::<_, f64>("sum", "not a list")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlgorithmError(_)));
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let dispatcher = fallback_only();
        dispatcher.calculate_percentiles(&[1.0, 2.0], None).await.unwrap();
        dispatcher.reset_stats();
        assert_eq!(dispatcher.stats(), EngineStats::default());
    }

    #[tokio::test]
    async fn test_disposed_rejects_calls() {
        let dispatcher = fallback_only();
        dispatcher.dispose();
        dispatcher.dispose();
        assert!(dispatcher.is_disposed());
        assert_eq!(
            dispatcher.calculate_percentiles(&[1.0], None).await.unwrap_err(),
            EngineError::Disposed
        );
        assert_eq!(dispatcher.initialize().await.unwrap_err(), EngineError::Disposed);
        assert_eq!(dispatcher.stats().total_tasks, 0);
    }

    #[test]
    fn test_into_output() {
        let failed = TaskResponse::failed(
            "task_1",
            TaskKind::Custom,
            TaskFailure::Unsupported {
                task: "missing".to_string(),
            },
            0.0,
        );
        assert_eq!(
            into_output(failed).unwrap_err(),
            EngineError::UnsupportedTask("missing".to_string())
        );

        let mut empty = TaskResponse::failed(
            "task_2",
            TaskKind::Custom,
            TaskFailure::Algorithm {
                message: String::new(),
            },
            0.0,
        );
        empty.success = true;
        empty.error = None;
        assert!(matches!(into_output(empty), Err(EngineError::Protocol(_))));
    }
}
