//! Execution strategies
//!
//! Both strategies run the same `framelens_core::run_task`; they differ only in
//! where it runs and how the response reaches the registry.
//!
//! - [`FallbackExecutor`] - synchronous, on the caller's thread
//! - `IsolatedExecutor` - serialized to the isolated context, answered by its reader thread

mod fallback;
mod isolated;

pub use fallback::FallbackExecutor;
pub(crate) use isolated::IsolatedExecutor;

use crate::registry::TaskRegistry;
use framelens_ipc::TaskRequest;
use std::fmt;

/// Where a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Inside the isolated context
    Isolated,
    /// On the caller's thread
    Fallback,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::Isolated => f.write_str("isolated"),
            ExecutionStrategy::Fallback => f.write_str("fallback"),
        }
    }
}

/// Hands an admitted task to a strategy. The outcome always arrives through
/// the registry, never as a return value.
pub(crate) trait Executor {
    fn strategy(&self) -> ExecutionStrategy;

    fn submit(&self, request: TaskRequest, registry: &TaskRegistry);
}
