//! Execution inside the isolated context

use super::{ExecutionStrategy, Executor};
use crate::context::ContextConnection;
use crate::error::EngineError;
use crate::registry::TaskRegistry;
use framelens_ipc::{ContextCommand, TaskRequest};
use std::sync::Arc;

/// Sends tasks to a live context. Responses arrive on the connection's reader thread.
pub(crate) struct IsolatedExecutor {
    connection: Arc<ContextConnection>,
}

impl IsolatedExecutor {
    pub fn new(connection: Arc<ContextConnection>) -> Self {
        Self { connection }
    }
}

impl Executor for IsolatedExecutor {
    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::Isolated
    }

    fn submit(&self, request: TaskRequest, registry: &TaskRegistry) {
        let id = request.id.clone();
        if let Err(e) = self.connection.send(ContextCommand::Run(request)) {
            registry.fail(&id, EngineError::ContextFault(e.to_string()));
            return;
        }
        // A fault between admission and send may have missed this task
        if !self.connection.is_healthy() {
            registry.fail(
                &id,
                EngineError::ContextFault("isolated context is unavailable".to_string()),
            );
        }
    }
}
