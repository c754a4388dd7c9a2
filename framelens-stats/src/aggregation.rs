//! Frame window aggregation

use crate::frame::FrameSample;
use crate::trailing;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// Frame time at the 60 fps reference rate
pub const TARGET_FRAME_TIME_MS: f64 = 1000.0 / 60.0;

/// A frame is dropped when its CPU time exceeds this multiple of the reference
pub const DROPPED_FRAME_FACTOR: f64 = 1.5;

/// Summary of a window of frames
#[derive(
    Debug, Clone, Default, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    /// Mean CPU frame time
    pub avg_cpu_time_ms: f64,
    /// Mean GPU frame time over frames that report one
    pub avg_gpu_time_ms: Option<f64>,
    /// Mean per-frame FPS
    pub avg_fps: f64,
    /// Lowest per-frame FPS
    pub min_fps: f64,
    /// Highest per-frame FPS
    pub max_fps: f64,
    /// Mean draw calls
    pub avg_draw_calls: f64,
    /// Mean triangles
    pub avg_triangles: f64,
    /// Frames in the window
    pub total_frames: u64,
    /// Frames over the dropped-frame threshold
    pub dropped_frames: u64,
    /// Population standard deviation of per-frame FPS
    pub fps_std_dev: f64,
}

fn frame_fps(frame: &FrameSample) -> f64 {
    if frame.cpu_time_ms > 0.0 {
        1000.0 / frame.cpu_time_ms
    } else {
        0.0
    }
}

/// Aggregate the trailing `window_size` frames (`None` or 0 = all).
pub fn aggregate_stats(frames: &[FrameSample], window_size: Option<usize>) -> AggregationResult {
    let data = trailing(frames, window_size);
    if data.is_empty() {
        return AggregationResult::default();
    }

    let n = data.len() as f64;
    let mut total_cpu = 0.0;
    let mut total_gpu = 0.0;
    let mut gpu_count = 0usize;
    let mut total_draw_calls = 0.0;
    let mut total_triangles = 0.0;
    let mut dropped_frames = 0u64;
    let mut min_fps = f64::INFINITY;
    let mut max_fps = f64::NEG_INFINITY;
    let mut fps_values = Vec::with_capacity(data.len());

    for frame in data {
        total_cpu += frame.cpu_time_ms;
        if let Some(gpu) = frame.gpu_time_ms {
            total_gpu += gpu;
            gpu_count += 1;
        }
        total_draw_calls += frame.draw_calls as f64;
        total_triangles += frame.triangles as f64;

        let fps = frame_fps(frame);
        min_fps = min_fps.min(fps);
        max_fps = max_fps.max(fps);
        fps_values.push(fps);

        if frame.cpu_time_ms > TARGET_FRAME_TIME_MS * DROPPED_FRAME_FACTOR {
            dropped_frames += 1;
        }
    }

    let avg_fps = fps_values.iter().sum::<f64>() / n;
    let variance = fps_values
        .iter()
        .map(|fps| (fps - avg_fps).powi(2))
        .sum::<f64>()
        / n;

    AggregationResult {
        avg_cpu_time_ms: total_cpu / n,
        avg_gpu_time_ms: (gpu_count > 0).then(|| total_gpu / gpu_count as f64),
        avg_fps,
        min_fps,
        max_fps,
        avg_draw_calls: total_draw_calls / n,
        avg_triangles: total_triangles / n,
        total_frames: data.len() as u64,
        dropped_frames,
        fps_std_dev: variance.sqrt(),
    }
}
