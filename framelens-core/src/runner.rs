//! Task execution shared by the isolated worker and the fallback executor

use crate::custom::CustomTaskTable;
use framelens_ipc::{TaskFailure, TaskOutput, TaskPayload, TaskRequest, TaskResponse};
use framelens_stats::{
    aggregate_stats, analyze_leaks, analyze_trend, calculate_benchmark, calculate_percentiles,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

/// Milliseconds elapsed since `start`
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Execute one request and package the outcome.
///
/// Never fails: algorithm errors and panics become a failed [`TaskResponse`].
pub fn run_task(request: &TaskRequest, custom: &CustomTaskTable) -> TaskResponse {
    let start = Instant::now();

    let outcome = catch_unwind(AssertUnwindSafe(|| execute(&request.payload, custom)));
    let processing_time_ms = elapsed_ms(start);

    let outcome = outcome.unwrap_or_else(|panic| {
        let message = if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        Err(TaskFailure::Algorithm { message })
    });

    match outcome {
        Ok(output) => TaskResponse::ok(request.id.clone(), output, processing_time_ms),
        Err(failure) => {
            TaskResponse::failed(request.id.clone(), request.kind, failure, processing_time_ms)
        }
    }
}

fn algorithm(err: impl ToString) -> TaskFailure {
    TaskFailure::Algorithm {
        message: err.to_string(),
    }
}

fn window(size: Option<u64>) -> Option<usize> {
    size.map(|n| n as usize)
}

fn execute(payload: &TaskPayload, custom: &CustomTaskTable) -> Result<TaskOutput, TaskFailure> {
    match payload {
        TaskPayload::Benchmark { frame, config } => {
            let config = config.clone().unwrap_or_default();
            calculate_benchmark(frame, &config)
                .map(TaskOutput::Benchmark)
                .map_err(algorithm)
        }
        TaskPayload::StatsAggregation {
            frames,
            window_size,
        } => Ok(TaskOutput::StatsAggregation(aggregate_stats(
            frames,
            window(*window_size),
        ))),
        TaskPayload::PercentileCalc {
            values,
            percentiles,
        } => calculate_percentiles(values, percentiles)
            .map(TaskOutput::PercentileCalc)
            .map_err(algorithm),
        TaskPayload::TrendAnalysis {
            history,
            window_size,
            thresholds,
        } => Ok(TaskOutput::TrendAnalysis(analyze_trend(
            history,
            window(*window_size),
            *thresholds,
        ))),
        TaskPayload::LeakAnalysis(input) => Ok(TaskOutput::LeakAnalysis(analyze_leaks(input))),
        TaskPayload::Custom { name, data_json } => {
            let handler = custom.get(name).ok_or_else(|| TaskFailure::Unsupported {
                task: name.clone(),
            })?;
            let data = serde_json::from_str(data_json)
                .map_err(|e| algorithm(format!("invalid input for custom task {}: {}", name, e)))?;
            let output = handler(data).map_err(algorithm)?;
            Ok(TaskOutput::Custom {
                data_json: output.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelens_ipc::TaskKind;
    use framelens_stats::{BenchmarkConfig, FrameSample, Grade};
    use serde_json::{Value, json};

    fn request(payload: TaskPayload) -> TaskRequest {
        TaskRequest::new("task_1", payload)
    }

    #[test]
    fn test_benchmark_task() {
        let response = run_task(
            &request(TaskPayload::Benchmark {
                frame: FrameSample::new(5.0, 50, 100_000),
                config: None,
            }),
            &CustomTaskTable::new(),
        );

        assert!(response.success);
        assert_eq!(response.id, "task_1");
        assert_eq!(response.kind, TaskKind::Benchmark);
        match response.result {
            Some(TaskOutput::Benchmark(score)) => assert_eq!(score.grade, Grade::A),
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_is_algorithm_failure() {
        let response = run_task(
            &request(TaskPayload::Benchmark {
                frame: FrameSample::new(5.0, 50, 100_000),
                config: Some(BenchmarkConfig {
                    target_fps: -1.0,
                    ..Default::default()
                }),
            }),
            &CustomTaskTable::new(),
        );
        assert!(!response.success);
        assert!(matches!(response.error, Some(TaskFailure::Algorithm { .. })));
    }

    #[test]
    fn test_empty_percentile_request() {
        let response = run_task(
            &request(TaskPayload::PercentileCalc {
                values: vec![1.0, 2.0, 3.0],
                percentiles: Vec::new(),
            }),
            &CustomTaskTable::new(),
        );
        match response.result {
            Some(TaskOutput::PercentileCalc(result)) => {
                assert!(result.percentiles.is_empty());
                assert_eq!(result.median, 2.0);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn test_custom_task() {
        let mut table = CustomTaskTable::new();
        table.register("sum", |data: Value| {
            let values: Vec<f64> = serde_json::from_value(data).map_err(|e| e.to_string())?;
            Ok(json!(values.iter().sum::<f64>()))
        });

        let response = run_task(
            &request(TaskPayload::Custom {
                name: "sum".to_string(),
                data_json: "[1.5, 2.5]".to_string(),
            }),
            &table,
        );
        assert_eq!(
            response.result,
            Some(TaskOutput::Custom {
                data_json: "4.0".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_custom_task() {
        let response = run_task(
            &request(TaskPayload::Custom {
                name: "nope".to_string(),
                data_json: "null".to_string(),
            }),
            &CustomTaskTable::new(),
        );
        assert!(!response.success);
        assert_eq!(response.kind, TaskKind::Custom);
        assert_eq!(
            response.error,
            Some(TaskFailure::Unsupported {
                task: "nope".to_string()
            })
        );
    }

    #[test]
    fn test_panic_becomes_failure() {
        let mut table = CustomTaskTable::new();
        table.register("boom", |_| panic!("handler exploded"));

        let response = run_task(
            &request(TaskPayload::Custom {
                name: "boom".to_string(),
                data_json: "{}".to_string(),
            }),
            &table,
        );
        assert_eq!(
            response.error,
            Some(TaskFailure::Algorithm {
                message: "handler exploded".to_string()
            })
        );
    }
}
