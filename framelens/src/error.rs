//! Engine errors

use framelens_ipc::TaskFailure;
use thiserror::Error;

/// Errors returned by [`TaskDispatcher`](crate::TaskDispatcher) operations.
///
/// Only `CapacityExceeded` and `Disposed` are raised before a task exists; every
/// other variant resolves a specific task.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Maximum concurrent tasks ({limit}) reached")]
    CapacityExceeded { limit: usize },

    #[error("Task {id} timed out after {timeout_ms}ms")]
    Timeout { id: String, timeout_ms: u64 },

    #[error("Task {id} cancelled")]
    Cancelled { id: String },

    #[error("Context fault: {0}")]
    ContextFault(String),

    #[error("Analysis failed: {0}")]
    AlgorithmError(String),

    #[error("TaskDispatcher has been disposed")]
    Disposed,

    #[error("Unsupported task: {0}")]
    UnsupportedTask(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<TaskFailure> for EngineError {
    fn from(failure: TaskFailure) -> Self {
        match failure {
            TaskFailure::Unsupported { task } => EngineError::UnsupportedTask(task),
            TaskFailure::Algorithm { message } => EngineError::AlgorithmError(message),
        }
    }
}
