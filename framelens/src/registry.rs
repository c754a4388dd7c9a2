//! Pending-task registry
//!
//! Every admitted task owns one entry keyed by its id until exactly one of
//! response, failure, timeout or cancellation removes it. Removal is atomic
//! under the registry lock, so each task resolves once and later arrivals for
//! the same id are dropped as unmatched.

use crate::error::EngineError;
use crate::stats::{Counters, EngineStats};
use framelens_core::elapsed_ms;
use framelens_ipc::{TaskKind, TaskResponse};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Where a task was routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Executed on the caller's thread
    Fallback,
    /// Sent to the isolated context of the given generation
    Isolated(u64),
}

pub(crate) type Completion = Result<TaskResponse, EngineError>;

struct PendingTask {
    route: Route,
    kind: TaskKind,
    start: Instant,
    reply: oneshot::Sender<Completion>,
    timer: Option<JoinHandle<()>>,
}

impl PendingTask {
    fn resolve(self, outcome: Completion) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // The caller may have stopped waiting
        let _ = self.reply.send(outcome);
    }
}

#[derive(Default)]
struct RegistryState {
    pending: FxHashMap<String, PendingTask>,
    counters: Counters,
}

/// A registered task waiting for its outcome
pub(crate) struct Admission {
    pub id: String,
    pub outcome: oneshot::Receiver<Completion>,
}

pub(crate) struct TaskRegistry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
    max_concurrent: usize,
    timeout: Duration,
    log_tasks: bool,
}

impl TaskRegistry {
    pub fn new(max_concurrent: usize, timeout: Duration, log_tasks: bool) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            next_id: AtomicU64::new(0),
            max_concurrent,
            timeout,
            log_tasks,
        }
    }

    /// Register a task, or reject it when the ceiling is reached. Rejections are not counted.
    pub fn admit(&self, route: Route, kind: TaskKind) -> Result<Admission, EngineError> {
        let (reply, outcome) = oneshot::channel();
        let mut state = self.state.lock();
        if state.pending.len() >= self.max_concurrent {
            return Err(EngineError::CapacityExceeded {
                limit: self.max_concurrent,
            });
        }

        let id = format!("task_{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        state.pending.insert(
            id.clone(),
            PendingTask {
                route,
                kind,
                start: Instant::now(),
                reply,
                timer: None,
            },
        );
        state.counters.total += 1;
        drop(state);

        if self.log_tasks {
            debug!("Task {} ({}) admitted via {:?}", id, kind, route);
        }
        Ok(Admission { id, outcome })
    }

    /// Start the timeout for `id`. No-op when the task already resolved.
    pub fn arm_timer(self: &Arc<Self>, id: &str) {
        if !self.state.lock().pending.contains_key(id) {
            return;
        }

        let registry: Weak<Self> = Arc::downgrade(self);
        let timeout = self.timeout;
        let task_id = id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(registry) = registry.upgrade() {
                registry.expire(&task_id);
            }
        });

        let mut state = self.state.lock();
        match state.pending.get_mut(id) {
            Some(task) => task.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Match a response to its task.
    pub fn complete(&self, response: TaskResponse) {
        let mut state = self.state.lock();
        let Some(task) = state.pending.remove(&response.id) else {
            drop(state);
            warn!("Received response for unknown task: {}", response.id);
            return;
        };

        let round_trip_ms = elapsed_ms(task.start);
        state.counters.record_response(response.success, round_trip_ms);
        drop(state);

        if self.log_tasks {
            if response.success {
                debug!(
                    "Task {} completed in {:.2}ms (round trip {:.2}ms)",
                    response.id, response.processing_time_ms, round_trip_ms
                );
            } else if let Some(error) = &response.error {
                debug!("Task {} failed: {}", response.id, error);
            }
        }
        task.resolve(Ok(response));
    }

    /// Fail one task without a response, counting it as failed.
    pub fn fail(&self, id: &str, error: EngineError) {
        let mut state = self.state.lock();
        let Some(task) = state.pending.remove(id) else {
            return;
        };
        state.counters.failed += 1;
        drop(state);

        if self.log_tasks {
            debug!("Task {} failed: {}", id, error);
        }
        task.resolve(Err(error));
    }

    fn expire(&self, id: &str) {
        let mut state = self.state.lock();
        let Some(task) = state.pending.remove(id) else {
            return;
        };
        state.counters.timed_out += 1;
        drop(state);

        warn!("Task {} ({}) timed out after {}ms", id, task.kind, self.timeout.as_millis());
        let _ = task.reply.send(Err(EngineError::Timeout {
            id: id.to_string(),
            timeout_ms: self.timeout.as_millis() as u64,
        }));
    }

    /// Reject every pending task with `Cancelled`.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(String, PendingTask)> = {
            let mut state = self.state.lock();
            let drained: Vec<_> = state.pending.drain().collect();
            state.counters.cancelled += drained.len() as u64;
            drained
        };

        let count = drained.len();
        for (id, task) in drained {
            task.resolve(Err(EngineError::Cancelled { id }));
        }
        count
    }

    /// Reject every task routed to the isolated context `generation`.
    pub fn fail_context(&self, generation: u64, reason: &str) -> usize {
        let route = Route::Isolated(generation);
        let failed: Vec<(String, PendingTask)> = {
            let mut state = self.state.lock();
            let ids: Vec<String> = state
                .pending
                .iter()
                .filter(|(_, task)| task.route == route)
                .map(|(id, _)| id.clone())
                .collect();
            let failed: Vec<_> = ids
                .into_iter()
                .filter_map(|id| state.pending.remove_entry(&id))
                .collect();
            state.counters.failed += failed.len() as u64;
            failed
        };

        let count = failed.len();
        for (_, task) in failed {
            task.resolve(Err(EngineError::ContextFault(reason.to_string())));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn snapshot(&self, is_available: bool) -> EngineStats {
        let state = self.state.lock();
        state.counters.snapshot(state.pending.len(), is_available)
    }

    pub fn reset_counters(&self) {
        self.state.lock().counters = Counters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelens_ipc::{TaskFailure, TaskOutput};

    fn registry(max: usize, timeout_ms: u64) -> Arc<TaskRegistry> {
        Arc::new(TaskRegistry::new(max, Duration::from_millis(timeout_ms), false))
    }

    fn ok_response(id: &str) -> TaskResponse {
        TaskResponse::ok(
            id,
            TaskOutput::Custom {
                data_json: "null".to_string(),
            },
            0.5,
        )
    }

    #[test]
    fn test_ids_are_sequential() {
        let registry = registry(10, 1000);
        let a = registry.admit(Route::Fallback, TaskKind::Custom).unwrap();
        let b = registry.admit(Route::Fallback, TaskKind::Custom).unwrap();
        assert_eq!(a.id, "task_1");
        assert_eq!(b.id, "task_2");
        assert_eq!(registry.pending_count(), 2);
    }

    #[test]
    fn test_capacity_rejection_not_counted() {
        let registry = registry(1, 1000);
        let _held = registry.admit(Route::Fallback, TaskKind::Benchmark).unwrap();
        let err = registry.admit(Route::Fallback, TaskKind::Benchmark).err().unwrap();
        assert_eq!(err, EngineError::CapacityExceeded { limit: 1 });
        assert_eq!(registry.snapshot(false).total_tasks, 1);
    }

    #[test]
    fn test_complete_resolves_once() {
        let registry = registry(10, 1000);
        let mut admission = registry.admit(Route::Fallback, TaskKind::Custom).unwrap();

        registry.complete(ok_response(&admission.id));
        registry.complete(ok_response(&admission.id));

        let outcome = admission.outcome.try_recv().unwrap();
        assert!(outcome.unwrap().success);
        let stats = registry.snapshot(false);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.pending_tasks, 0);
    }

    #[test]
    fn test_failed_response_counted() {
        let registry = registry(10, 1000);
        let admission = registry.admit(Route::Fallback, TaskKind::Custom).unwrap();
        registry.complete(TaskResponse::failed(
            admission.id.clone(),
            TaskKind::Custom,
            TaskFailure::Algorithm {
                message: "nope".to_string(),
            },
            0.0,
        ));
        assert_eq!(registry.snapshot(false).failed_tasks, 1);
    }

    #[test]
    fn test_fail_context_only_touches_its_generation() {
        let registry = registry(10, 1000);
        let mut old = registry.admit(Route::Isolated(1), TaskKind::Custom).unwrap();
        let mut current = registry.admit(Route::Isolated(2), TaskKind::Custom).unwrap();
        let mut local = registry.admit(Route::Fallback, TaskKind::Custom).unwrap();

        assert_eq!(registry.fail_context(1, "pipe closed"), 1);
        assert_eq!(
            old.outcome.try_recv().unwrap(),
            Err(EngineError::ContextFault("pipe closed".to_string()))
        );
        assert!(current.outcome.try_recv().is_err());
        assert!(local.outcome.try_recv().is_err());
        assert_eq!(registry.snapshot(false).failed_tasks, 1);
        assert_eq!(registry.pending_count(), 2);
    }

    #[test]
    fn test_cancel_all() {
        let registry = registry(10, 1000);
        let mut a = registry.admit(Route::Fallback, TaskKind::Custom).unwrap();
        let _b = registry.admit(Route::Isolated(1), TaskKind::Custom).unwrap();

        assert_eq!(registry.cancel_all(), 2);
        assert_eq!(
            a.outcome.try_recv().unwrap(),
            Err(EngineError::Cancelled {
                id: "task_1".to_string()
            })
        );
        let stats = registry.snapshot(false);
        assert_eq!(stats.cancelled_tasks, 2);
        assert_eq!(stats.pending_tasks, 0);
    }

    #[test]
    fn test_reset_keeps_pending() {
        let registry = registry(10, 1000);
        let _a = registry.admit(Route::Fallback, TaskKind::Custom).unwrap();
        registry.reset_counters();
        let stats = registry.snapshot(true);
        assert_eq!(stats.total_tasks, 0);
        assert_eq!(stats.pending_tasks, 1);
        assert!(stats.is_available);
    }

    #[tokio::test]
    async fn test_timer_expires_once() {
        let registry = registry(10, 20);
        let admission = registry.admit(Route::Isolated(1), TaskKind::Custom).unwrap();
        registry.arm_timer(&admission.id);

        let outcome = admission.outcome.await.unwrap();
        assert!(matches!(outcome, Err(EngineError::Timeout { timeout_ms: 20, .. })));

        // Late response is unmatched
        registry.complete(ok_response("task_1"));
        let stats = registry.snapshot(false);
        assert_eq!(stats.timed_out_tasks, 1);
        assert_eq!(stats.completed_tasks, 0);
    }

    #[tokio::test]
    async fn test_timer_not_armed_after_completion() {
        let registry = registry(10, 10);
        let admission = registry.admit(Route::Fallback, TaskKind::Custom).unwrap();
        registry.complete(ok_response(&admission.id));
        registry.arm_timer(&admission.id);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(admission.outcome.await.unwrap().is_ok());
        assert_eq!(registry.snapshot(false).timed_out_tasks, 0);
    }
}
