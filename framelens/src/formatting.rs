//! Output Formatting
//!
//! Terminal-friendly renderings of analysis results for `framelens analyze`.

use framelens_stats::{
    AggregationResult, AlertSeverity, BenchmarkScore, CategoryStats, Confidence, LeakReport,
    PercentileResult, TrendDirection, TrendResult, format_bytes,
};

fn header(output: &mut String, title: &str) {
    output.push('\n');
    output.push_str(title);
    output.push('\n');
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");
}

/// Format a benchmark score
pub fn format_benchmark(score: &BenchmarkScore) -> String {
    let mut output = String::new();
    header(&mut output, "FrameLens Benchmark");

    output.push_str(&format!("  Score: {}/100  Grade: {}\n\n", score.overall, score.grade));
    let breakdown = &score.breakdown;
    output.push_str(&format!("    timing:        {:>3}\n", breakdown.timing));
    output.push_str(&format!("    draw calls:    {:>3}\n", breakdown.draw_calls));
    output.push_str(&format!("    geometry:      {:>3}\n", breakdown.geometry));
    output.push_str(&format!("    memory:        {:>3}\n", breakdown.memory));
    output.push_str(&format!("    state changes: {:>3}\n", breakdown.state_changes));

    if !score.top_issues.is_empty() {
        output.push_str("\n  Issues:\n");
        for (issue, suggestion) in score.top_issues.iter().zip(&score.suggestions) {
            output.push_str(&format!("    ✗ {}\n      → {}\n", issue, suggestion));
        }
    }
    output
}

/// Format a frame window summary
pub fn format_aggregation(result: &AggregationResult) -> String {
    let mut output = String::new();
    header(&mut output, "FrameLens Frame Statistics");

    output.push_str(&format!(
        "  frames: {}  dropped: {}\n",
        result.total_frames, result.dropped_frames
    ));
    output.push_str(&format!(
        "  fps: avg {:.1}  min {:.1}  max {:.1}  stddev {:.2}\n",
        result.avg_fps, result.min_fps, result.max_fps, result.fps_std_dev
    ));
    output.push_str(&format!("  cpu: {:.2} ms", result.avg_cpu_time_ms));
    match result.avg_gpu_time_ms {
        Some(gpu) => output.push_str(&format!("  gpu: {:.2} ms\n", gpu)),
        None => output.push('\n'),
    }
    output.push_str(&format!(
        "  draw calls: {:.1}  triangles: {:.0}\n",
        result.avg_draw_calls, result.avg_triangles
    ));
    output
}

/// Format a percentile summary
pub fn format_percentiles(result: &PercentileResult) -> String {
    let mut output = String::new();
    header(&mut output, "FrameLens Percentiles");

    output.push_str(&format!(
        "  min: {:.2}  max: {:.2}  mean: {:.2}  median: {:.2}\n",
        result.min, result.max, result.mean, result.median
    ));
    for p in &result.percentiles {
        output.push_str(&format!("    p{}: {:.2}\n", p.percentile, p.value));
    }
    output
}

/// Format a trend classification
pub fn format_trend(result: &TrendResult) -> String {
    let mut output = String::new();
    header(&mut output, "FrameLens Trend");

    let direction = match result.trend {
        TrendDirection::Improving => "↓ improving",
        TrendDirection::Stable => "→ stable",
        TrendDirection::Degrading => "↑ degrading",
    };
    let confidence = match result.confidence {
        Confidence::High => "high",
        Confidence::Medium => "medium",
        Confidence::Low => "low",
    };
    output.push_str(&format!("  {} ({} confidence)\n", direction, confidence));
    output.push_str(&format!(
        "  slope: {:.4}/s  R²: {:.3}  change: {:+.1}%\n",
        result.slope, result.r_squared, result.change_percent
    ));
    output.push_str(&format!("  next second: {:.2}\n", result.prediction));
    output
}

fn category_line(name: &str, stats: &CategoryStats) -> String {
    format!(
        "    {:<11} created {:>4}  disposed {:>4}  orphaned {:>4}  leaked {:>4}\n",
        name, stats.created, stats.disposed, stats.orphaned, stats.leaked
    )
}

/// Format a leak report
pub fn format_leak_report(report: &LeakReport) -> String {
    let mut output = String::new();
    header(&mut output, "FrameLens Leak Report");

    let summary = &report.summary;
    output.push_str(&format!(
        "  session: {:.1}s  alerts: {} ({} critical, {} warning, {} info)\n",
        report.session_duration_ms / 1000.0,
        summary.total_alerts,
        summary.critical_alerts,
        summary.warning_alerts,
        summary.info_alerts
    ));
    output.push_str(&format!(
        "  estimated leaked memory: {}\n\n",
        format_bytes(summary.estimated_leaked_memory_bytes)
    ));

    let stats = &report.resource_stats;
    output.push_str(&category_line("geometries", &stats.geometries));
    output.push_str(&category_line("materials", &stats.materials));
    output.push_str(&category_line("textures", &stats.textures));

    if !report.alerts.is_empty() {
        output.push_str("\n  Alerts:\n");
        for alert in &report.alerts {
            let icon = match alert.severity {
                AlertSeverity::Critical => "💥",
                AlertSeverity::Warning => "✗",
                AlertSeverity::Info => "·",
            };
            output.push_str(&format!("    {} {}\n", icon, alert.message));
            output.push_str(&format!("      {}\n", alert.details));
            output.push_str(&format!("      → {}\n", alert.suggestion));
        }
    }

    if !report.recommendations.is_empty() {
        output.push_str("\n  Recommendations:\n");
        for recommendation in &report.recommendations {
            output.push_str(&format!("    - {}\n", recommendation));
        }
    }
    output
}
