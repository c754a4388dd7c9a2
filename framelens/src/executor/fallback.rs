//! In-process execution

use super::{ExecutionStrategy, Executor};
use crate::registry::TaskRegistry;
use framelens_core::{CustomTaskTable, run_task};
use framelens_ipc::{TaskRequest, TaskResponse};

/// Runs tasks synchronously on the calling thread
///
/// Always available. Panics inside an analysis become a failed response rather
/// than unwinding into the caller.
#[derive(Debug, Clone, Default)]
pub struct FallbackExecutor {
    custom: CustomTaskTable,
}

impl FallbackExecutor {
    /// Executor with the given custom handlers
    pub fn new(custom: CustomTaskTable) -> Self {
        Self { custom }
    }

    /// Run one request to completion.
    pub fn execute(&self, request: &TaskRequest) -> TaskResponse {
        run_task(request, &self.custom)
    }
}

impl Executor for FallbackExecutor {
    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::Fallback
    }

    fn submit(&self, request: TaskRequest, registry: &TaskRegistry) {
        registry.complete(self.execute(&request));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelens_ipc::{TaskFailure, TaskOutput, TaskPayload};
    use serde_json::json;

    #[test]
    fn test_execute_percentiles() {
        let executor = FallbackExecutor::default();
        let response = executor.execute(&TaskRequest::new(
            "task_1",
            TaskPayload::PercentileCalc {
                values: vec![5.0, 1.0, 3.0],
                percentiles: vec![50.0],
            },
        ));
        assert!(response.success);
        match response.result {
            Some(TaskOutput::PercentileCalc(result)) => {
                assert_eq!(result.min, 1.0);
                assert_eq!(result.max, 5.0);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn test_panicking_handler_is_failure() {
        let mut table = CustomTaskTable::new();
        table.register("explode", |_| -> Result<serde_json::Value, String> {
            panic!("handler blew up")
        });
        let executor = FallbackExecutor::new(table);
        let response = executor.execute(&TaskRequest::new(
            "task_2",
            TaskPayload::Custom {
                name: "explode".to_string(),
                data_json: json!(null).to_string(),
            },
        ));
        assert!(!response.success);
        match response.error {
            Some(TaskFailure::Algorithm { message }) => assert!(message.contains("handler blew up")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
