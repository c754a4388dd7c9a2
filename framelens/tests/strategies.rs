//! Integration tests for execution strategies
//!
//! Every analysis must produce the same result whether it runs in the isolated
//! context or on the fallback path.

use framelens::{DisabledLauncher, EngineError, ExecutionStrategy, TaskDispatcher, ThreadLauncher};
use framelens_stats::{
    ActiveResourceRecord, BenchmarkConfig, FrameSample, LeakAnalysisOptions, LifecycleEventType,
    MemoryDetails, MemorySample, RenderingDetails, ResourceLifecycleEvent, ResourceType,
    TrendPoint, TrendThresholds,
};
use serde_json::{Value, json};

const NOW_MS: f64 = 600_000.0;

fn frames() -> Vec<FrameSample> {
    (0..40u64)
        .map(|i| {
            let cpu = 12.0 + (i % 7) as f64 * 3.5;
            FrameSample {
                frame: i,
                timestamp_ms: i as f64 * 16.7,
                ..FrameSample::new(cpu, 150 + i * 10, 200_000 + i * 25_000)
            }
            .with_gpu_time(cpu * 0.6)
        })
        .collect()
}

fn heavy_frame() -> FrameSample {
    FrameSample::new(31.0, 820, 2_400_000)
        .with_memory(MemoryDetails {
            texture_memory: 400 * 1024 * 1024,
            geometry_memory: 90 * 1024 * 1024,
            textures: 120,
            geometries: 300,
            render_targets: 4,
        })
        .with_rendering(RenderingDetails {
            program_switches: 900,
            texture_binds: 1400,
        })
}

fn history() -> Vec<TrendPoint> {
    (0..30)
        .map(|i| TrendPoint::new(i as f64 * 500.0, 16.0 + i as f64 * 0.4 + (i % 3) as f64 * 0.2))
        .collect()
}

fn leak_fixture() -> (
    Vec<ResourceLifecycleEvent>,
    Vec<ActiveResourceRecord>,
    Vec<MemorySample>,
) {
    let event = |n: u32, resource_type, resource_id: &str, event_type, timestamp_ms| {
        ResourceLifecycleEvent {
            id: format!("evt_{}", n),
            resource_type,
            resource_id: resource_id.to_string(),
            event_type,
            timestamp_ms,
            estimated_memory: Some(4 * 1024 * 1024),
        }
    };
    let events = vec![
        event(1, ResourceType::Texture, "tex_1", LifecycleEventType::Created, 1_000.0),
        event(2, ResourceType::Geometry, "geo_1", LifecycleEventType::Created, 2_000.0),
        event(3, ResourceType::Geometry, "geo_1", LifecycleEventType::Attached, 2_100.0),
        event(4, ResourceType::Geometry, "geo_1", LifecycleEventType::Detached, 50_000.0),
        event(5, ResourceType::Material, "mat_1", LifecycleEventType::Created, 3_000.0),
        event(6, ResourceType::Material, "mat_1", LifecycleEventType::Disposed, 9_000.0),
    ];
    let active = vec![
        ActiveResourceRecord {
            id: "tex_1".to_string(),
            resource_type: ResourceType::Texture,
            created_at_ms: 1_000.0,
            name: Some("skybox".to_string()),
            attached_owner_ids: Vec::new(),
            detached_at_ms: None,
            estimated_memory: Some(16 * 1024 * 1024),
        },
        ActiveResourceRecord {
            id: "geo_1".to_string(),
            resource_type: ResourceType::Geometry,
            created_at_ms: 2_000.0,
            name: None,
            attached_owner_ids: Vec::new(),
            detached_at_ms: Some(50_000.0),
            estimated_memory: Some(2 * 1024 * 1024),
        },
        ActiveResourceRecord {
            id: "geo_2".to_string(),
            resource_type: ResourceType::Geometry,
            created_at_ms: 590_000.0,
            name: Some("terrain".to_string()),
            attached_owner_ids: vec!["owner_7".to_string()],
            detached_at_ms: None,
            estimated_memory: None,
        },
    ];
    let memory = (0..30u64)
        .map(|i| MemorySample {
            timestamp_ms: i as f64 * 10_000.0,
            estimated_bytes: 100 * 1024 * 1024 + i * 8 * 1024 * 1024,
        })
        .collect();
    (events, active, memory)
}

fn leak_options() -> LeakAnalysisOptions {
    LeakAnalysisOptions {
        now_ms: Some(NOW_MS),
        ..Default::default()
    }
}

async fn assert_same_results(isolated: &TaskDispatcher, fallback: &TaskDispatcher) {
    for frame in [heavy_frame(), FrameSample::new(6.0, 40, 90_000)] {
        let config = Some(BenchmarkConfig::default());
        assert_eq!(
            isolated.calculate_benchmark(&frame, config.clone()).await.unwrap(),
            fallback.calculate_benchmark(&frame, config).await.unwrap()
        );
    }

    let frames = frames();
    for window in [None, Some(0), Some(10), Some(500)] {
        assert_eq!(
            isolated.aggregate_stats(&frames, window).await.unwrap(),
            fallback.aggregate_stats(&frames, window).await.unwrap()
        );
    }

    let values: Vec<f64> = frames.iter().map(|f| f.cpu_time_ms).collect();
    let custom = [10.0, 75.0, 99.9];
    assert_eq!(
        isolated.calculate_percentiles(&values, None).await.unwrap(),
        fallback.calculate_percentiles(&values, None).await.unwrap()
    );
    assert_eq!(
        isolated.calculate_percentiles(&values, Some(&custom)).await.unwrap(),
        fallback.calculate_percentiles(&values, Some(&custom)).await.unwrap()
    );

    let history = history();
    let thresholds = Some(TrendThresholds {
        improving: -0.5,
        degrading: 0.5,
    });
    assert_eq!(
        isolated.analyze_trend(&history, Some(20), None).await.unwrap(),
        fallback.analyze_trend(&history, Some(20), None).await.unwrap()
    );
    assert_eq!(
        isolated.analyze_trend(&history, None, thresholds).await.unwrap(),
        fallback.analyze_trend(&history, None, thresholds).await.unwrap()
    );

    let (events, active, memory) = leak_fixture();
    let isolated_report = isolated
        .analyze_leaks(&events, &active, &memory, 0.0, leak_options())
        .await
        .unwrap();
    let fallback_report = fallback
        .analyze_leaks(&events, &active, &memory, 0.0, leak_options())
        .await
        .unwrap();
    assert_eq!(isolated_report, fallback_report);
    assert_eq!(isolated_report.generated_at_ms, NOW_MS);
    assert!(!isolated_report.alerts.is_empty());
}

/// Test that the thread context and the fallback path agree on every analysis
#[tokio::test]
async fn test_thread_context_matches_fallback() {
    let isolated = TaskDispatcher::builder().launcher(ThreadLauncher).build();
    let fallback = TaskDispatcher::builder().launcher(DisabledLauncher).build();

    assert!(isolated.initialize().await.unwrap());
    assert!(isolated.is_available());
    assert!(!fallback.initialize().await.unwrap());

    assert_same_results(&isolated, &fallback).await;

    let stats = isolated.stats();
    assert_eq!(stats.total_tasks, 11);
    assert_eq!(stats.completed_tasks, 11);
    assert_eq!(stats.pending_tasks, 0);
    assert!(stats.is_available);
    assert_eq!(fallback.stats().completed_tasks, 11);
}

/// Test that a worker process produces the same results as the fallback path
#[cfg(unix)]
#[tokio::test]
async fn test_process_context_matches_fallback() {
    use framelens::ProcessLauncher;
    use std::path::PathBuf;

    let isolated = TaskDispatcher::builder()
        .launcher(ProcessLauncher::new(Some(PathBuf::from(env!(
            "CARGO_BIN_EXE_framelens"
        )))))
        .register_custom("closure_only", Ok)
        .build();
    let fallback = TaskDispatcher::builder().launcher(DisabledLauncher).build();

    assert!(isolated.initialize().await.unwrap());
    let caps = isolated.context_capabilities().unwrap();
    assert_eq!(caps.protocol_version, framelens_ipc::PROTOCOL_VERSION);
    assert_ne!(caps.pid, std::process::id());

    assert_same_results(&isolated, &fallback).await;

    // Closures do not cross the process boundary
    let err = isolated
        .execute_custom::<_, Value>("closure_only", &json!(1))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::UnsupportedTask("closure_only".to_string()));
    assert!(isolated.is_available());

    isolated.dispose();
    assert!(!isolated.is_available());
}

/// Test that custom handlers run in both strategies
#[tokio::test]
async fn test_custom_task_in_both_strategies() {
    fn build(strategy: ExecutionStrategy) -> TaskDispatcher {
        let builder = TaskDispatcher::builder().register_custom("frame_budget", |data| {
            let cpu: Vec<f64> = serde_json::from_value(data).map_err(|e| e.to_string())?;
            let over = cpu.iter().filter(|&&ms| ms > 16.7).count();
            Ok(json!({ "frames": cpu.len(), "overBudget": over }))
        });
        match strategy {
            ExecutionStrategy::Isolated => builder.launcher(ThreadLauncher).build(),
            ExecutionStrategy::Fallback => builder.launcher(DisabledLauncher).build(),
        }
    }

    let input = vec![12.0, 18.5, 16.0, 33.3];
    for strategy in [ExecutionStrategy::Isolated, ExecutionStrategy::Fallback] {
        let dispatcher = build(strategy);
        assert_eq!(
            dispatcher.initialize().await.unwrap(),
            strategy == ExecutionStrategy::Isolated
        );

        let output: Value = dispatcher.execute_custom("frame_budget", &input).await.unwrap();
        assert_eq!(output, json!({ "frames": 4, "overBudget": 2 }));

        let err = dispatcher
            .execute_custom::<_, Value>("histogram", &input)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::UnsupportedTask("histogram".to_string()));

        let stats = dispatcher.stats();
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.failed_tasks, 1);
    }

    let dispatcher = build(ExecutionStrategy::Isolated);
    dispatcher.initialize().await.unwrap();
    let caps = dispatcher.context_capabilities().unwrap();
    assert!(caps.custom_tasks.contains(&"frame_budget".to_string()));
}

/// Test that algorithm errors surface as AlgorithmError in both strategies
#[tokio::test]
async fn test_algorithm_errors() {
    for dispatcher in [
        TaskDispatcher::builder().launcher(ThreadLauncher).build(),
        TaskDispatcher::builder().launcher(DisabledLauncher).build(),
    ] {
        let err = dispatcher
            .calculate_percentiles(&[1.0, 2.0], Some(&[150.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlgorithmError(_)));

        let config = BenchmarkConfig {
            target_fps: 0.0,
            ..Default::default()
        };
        let err = dispatcher
            .calculate_benchmark(&FrameSample::new(16.0, 10, 10), Some(config))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlgorithmError(_)));
        assert_eq!(dispatcher.stats().failed_tasks, 2);
    }
}
