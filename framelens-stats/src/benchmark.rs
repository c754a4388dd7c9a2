//! Benchmark Scoring
//!
//! Scores one frame against a weighted budget. Five sub-scores (timing, draw
//! calls, geometry, memory, state changes) are computed independently on a 0-100
//! scale and combined with caller-supplied weights.

use crate::error::AnalysisError;
use crate::format::format_large_number;
use crate::frame::FrameSample;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// Sub-scores below this value report an issue and a suggestion.
const ISSUE_THRESHOLD: f64 = 80.0;

/// At most this many issues and suggestions are returned.
const MAX_REPORTED_ISSUES: usize = 3;

/// State-change issues are only raised above this many draw calls.
const STATE_CHANGE_MIN_DRAW_CALLS: u64 = 50;

/// Weights applied to each sub-score. Callers supply weights summing to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreWeights {
    /// Frame time weight
    pub timing: f64,
    /// Draw call weight
    pub draw_calls: f64,
    /// Triangle count weight
    pub geometry: f64,
    /// GPU memory weight
    pub memory: f64,
    /// State change weight
    pub state_changes: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            timing: 0.35,
            draw_calls: 0.2,
            geometry: 0.2,
            memory: 0.15,
            state_changes: 0.1,
        }
    }
}

/// Budget configuration for benchmark scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase", default)]
pub struct BenchmarkConfig {
    /// Target frames per second
    pub target_fps: f64,
    /// Draw call budget
    pub max_draw_calls: u64,
    /// Triangle budget
    pub max_triangles: u64,
    /// Texture memory budget in bytes
    pub max_texture_memory: u64,
    /// Geometry memory budget in bytes
    pub max_geometry_memory: u64,
    /// Sub-score weights
    pub weights: ScoreWeights,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            max_draw_calls: 500,
            max_triangles: 1_000_000,
            max_texture_memory: 512 * 1024 * 1024,
            max_geometry_memory: 256 * 1024 * 1024,
            weights: ScoreWeights::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Validate budgets, returning the first problem found.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.target_fps.is_finite() || self.target_fps <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "target_fps must be a positive number, got {}",
                self.target_fps
            )));
        }
        let budgets = [
            ("max_draw_calls", self.max_draw_calls),
            ("max_triangles", self.max_triangles),
            ("max_texture_memory", self.max_texture_memory),
            ("max_geometry_memory", self.max_geometry_memory),
        ];
        for (name, value) in budgets {
            if value == 0 {
                return Err(AnalysisError::InvalidInput(format!("{} must be > 0", name)));
            }
        }
        Ok(())
    }
}

/// Letter grade for an overall score
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
pub enum Grade {
    /// 90 and above
    A,
    /// 75 to 90
    B,
    /// 60 to 75
    C,
    /// 40 to 60
    D,
    /// Below 40
    F,
}

impl Grade {
    /// Map an (unrounded) overall score to a grade.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::A
        } else if score >= 75.0 {
            Grade::B
        } else if score >= 60.0 {
            Grade::C
        } else if score >= 40.0 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

/// Rounded sub-scores
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    /// Frame time score
    pub timing: u32,
    /// Draw call score
    pub draw_calls: u32,
    /// Triangle count score
    pub geometry: u32,
    /// GPU memory score
    pub memory: u32,
    /// State change score
    pub state_changes: u32,
}

/// Result of scoring a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkScore {
    /// Rounded weighted score (0-100)
    pub overall: u32,
    /// Rounded sub-scores
    pub breakdown: ScoreBreakdown,
    /// Letter grade
    pub grade: Grade,
    /// Up to three issues, in calculation order
    pub top_issues: Vec<String>,
    /// Up to three suggestions, parallel to `top_issues`
    pub suggestions: Vec<String>,
}

/// Shared budget curve: full marks up to half the budget, 80 at the budget,
/// then 40 points lost per budget multiple.
pub fn ratio_score(ratio: f64) -> f64 {
    if ratio <= 0.5 {
        100.0
    } else if ratio <= 1.0 {
        100.0 - (ratio - 0.5) * 40.0
    } else {
        (80.0 - (ratio - 1.0) * 40.0).max(0.0)
    }
}

/// Frame time curve, `ratio = cpu time / target frame time`.
pub fn timing_score(ratio: f64) -> f64 {
    if ratio <= 1.0 {
        100.0
    } else if ratio <= 1.5 {
        100.0 - (ratio - 1.0) * 100.0
    } else if ratio <= 2.0 {
        50.0 - (ratio - 1.5) * 60.0
    } else {
        (20.0 - (ratio - 2.0) * 10.0).max(0.0)
    }
}

/// State change curve, `per_draw = (program switches + texture binds) / draw calls`.
pub fn state_change_score(per_draw: f64) -> f64 {
    if per_draw <= 1.0 {
        100.0
    } else if per_draw <= 2.0 {
        100.0 - (per_draw - 1.0) * 40.0
    } else {
        (60.0 - (per_draw - 2.0) * 30.0).max(0.0)
    }
}

/// Score a frame against `config`.
pub fn calculate_benchmark(
    frame: &FrameSample,
    config: &BenchmarkConfig,
) -> Result<BenchmarkScore, AnalysisError> {
    config.validate()?;

    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    let target_frame_time = 1000.0 / config.target_fps;
    let timing = timing_score(frame.cpu_time_ms / target_frame_time);
    if timing < ISSUE_THRESHOLD {
        issues.push(format!("Frame time {:.1}ms exceeds budget", frame.cpu_time_ms));
        suggestions.push("Reduce geometry complexity or draw calls".to_string());
    }

    let draw_calls = ratio_score(frame.draw_calls as f64 / config.max_draw_calls as f64);
    if draw_calls < ISSUE_THRESHOLD {
        issues.push(format!("{} draw calls is high", frame.draw_calls));
        suggestions.push("Enable instancing or merge static geometries".to_string());
    }

    let geometry = ratio_score(frame.triangles as f64 / config.max_triangles as f64);
    if geometry < ISSUE_THRESHOLD {
        issues.push(format!(
            "{} triangles is high",
            format_large_number(frame.triangles)
        ));
        suggestions.push("Use LOD or reduce polygon count".to_string());
    }

    let mut memory = 100.0;
    if let Some(mem) = &frame.memory {
        let texture_ratio = mem.texture_memory as f64 / config.max_texture_memory as f64;
        let geometry_ratio = mem.geometry_memory as f64 / config.max_geometry_memory as f64;
        memory = ratio_score(texture_ratio.max(geometry_ratio));
        if memory < ISSUE_THRESHOLD {
            issues.push("High GPU memory usage".to_string());
            suggestions.push("Compress textures or reduce resolution".to_string());
        }
    }

    let per_draw = match &frame.rendering {
        Some(rendering) if frame.draw_calls > 0 => {
            (rendering.program_switches + rendering.texture_binds) as f64 / frame.draw_calls as f64
        }
        _ => 0.0,
    };
    let state_changes = state_change_score(per_draw);
    if state_changes < ISSUE_THRESHOLD && frame.draw_calls > STATE_CHANGE_MIN_DRAW_CALLS {
        issues.push("High state changes per draw call".to_string());
        suggestions.push("Sort objects by material to reduce state changes".to_string());
    }

    let weights = &config.weights;
    let overall = timing * weights.timing
        + draw_calls * weights.draw_calls
        + geometry * weights.geometry
        + memory * weights.memory
        + state_changes * weights.state_changes;

    issues.truncate(MAX_REPORTED_ISSUES);
    suggestions.truncate(MAX_REPORTED_ISSUES);

    Ok(BenchmarkScore {
        overall: overall.round() as u32,
        breakdown: ScoreBreakdown {
            timing: timing.round() as u32,
            draw_calls: draw_calls.round() as u32,
            geometry: geometry.round() as u32,
            memory: memory.round() as u32,
            state_changes: state_changes.round() as u32,
        },
        grade: Grade::from_score(overall),
        top_issues: issues,
        suggestions,
    })
}
