//! Frame sample types
//!
//! One captured rendering frame, as produced by the renderer adapter. Samples are
//! never mutated after capture; analysis only reads them.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// Metrics for a single rendered frame.
#[derive(
    Debug, Clone, Default, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct FrameSample {
    /// Frame number
    #[serde(default)]
    pub frame: u64,
    /// Capture timestamp in milliseconds
    #[serde(default, rename = "timestamp")]
    pub timestamp_ms: f64,
    /// CPU frame time in milliseconds
    pub cpu_time_ms: f64,
    /// GPU frame time in milliseconds, when the backend reports it
    #[serde(default)]
    pub gpu_time_ms: Option<f64>,
    /// Draw calls issued
    #[serde(default)]
    pub draw_calls: u64,
    /// Triangles rendered
    #[serde(default)]
    pub triangles: u64,
    /// Vertices submitted
    #[serde(default)]
    pub vertices: u64,
    /// GPU memory breakdown
    #[serde(default)]
    pub memory: Option<MemoryDetails>,
    /// Pipeline state details
    #[serde(default)]
    pub rendering: Option<RenderingDetails>,
}

impl FrameSample {
    /// Create a sample with the three counters most analyses use.
    pub fn new(cpu_time_ms: f64, draw_calls: u64, triangles: u64) -> Self {
        Self {
            cpu_time_ms,
            draw_calls,
            triangles,
            ..Default::default()
        }
    }

    /// Builder-style GPU time.
    pub fn with_gpu_time(mut self, gpu_time_ms: f64) -> Self {
        self.gpu_time_ms = Some(gpu_time_ms);
        self
    }

    /// Builder-style memory details.
    pub fn with_memory(mut self, memory: MemoryDetails) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Builder-style rendering details.
    pub fn with_rendering(mut self, rendering: RenderingDetails) -> Self {
        self.rendering = Some(rendering);
        self
    }
}

/// GPU memory in use during the frame.
#[derive(
    Debug, Clone, Default, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryDetails {
    /// Bytes held by textures
    pub texture_memory: u64,
    /// Bytes held by geometry buffers
    pub geometry_memory: u64,
    /// Live texture count
    pub textures: u32,
    /// Live geometry count
    pub geometries: u32,
    /// Live render targets
    pub render_targets: u32,
}

/// State-change counters for the frame.
#[derive(
    Debug, Clone, Default, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderingDetails {
    /// Shader program switches
    pub program_switches: u64,
    /// Texture bind operations
    pub texture_binds: u64,
}
