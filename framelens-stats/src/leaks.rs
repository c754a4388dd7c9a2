//! Resource leak analysis
//!
//! Builds a [`LeakReport`] from a lifecycle event log, a snapshot of live
//! resources and a memory usage series. The reference time is part of the input
//! so the report depends on nothing but its arguments.

use crate::format::format_bytes;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// Memory growth is only checked once this many samples exist
pub const MIN_MEMORY_SAMPLES: usize = 10;

/// Growth compares the two halves of this many trailing samples
pub const MEMORY_GROWTH_WINDOW: usize = 20;

/// Default age after which an unattached resource counts as leaked
pub const DEFAULT_LEAK_THRESHOLD_MS: f64 = 60_000.0;

/// Default memory growth that raises an alert
pub const DEFAULT_MEMORY_GROWTH_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;

/// Tracked GPU resource category
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Vertex/index buffers
    Geometry,
    /// Shader material
    Material,
    /// Texture or render target
    Texture,
}

impl ResourceType {
    /// Plural noun used in alert text
    pub fn plural(self) -> &'static str {
        match self {
            ResourceType::Geometry => "geometries",
            ResourceType::Material => "materials",
            ResourceType::Texture => "textures",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceType::Geometry => "geometry",
            ResourceType::Material => "material",
            ResourceType::Texture => "texture",
        };
        f.write_str(name)
    }
}

/// Kind of lifecycle event
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEventType {
    /// Resource allocated
    Created,
    /// Resource freed
    Disposed,
    /// Resource bound to an owner
    Attached,
    /// Resource unbound from an owner
    Detached,
}

/// One entry of the lifecycle event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLifecycleEvent {
    /// Event id
    pub id: String,
    /// Resource category
    pub resource_type: ResourceType,
    /// Resource id
    pub resource_id: String,
    /// What happened
    pub event_type: LifecycleEventType,
    /// Event time in milliseconds
    #[serde(rename = "timestamp")]
    pub timestamp_ms: f64,
    /// Estimated bytes held by the resource
    #[serde(default)]
    pub estimated_memory: Option<u64>,
}

/// A resource that has been created and not yet disposed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct ActiveResourceRecord {
    /// Resource id
    pub id: String,
    /// Resource category
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Creation time in milliseconds
    #[serde(rename = "createdAt")]
    pub created_at_ms: f64,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Owners currently holding the resource
    #[serde(default)]
    pub attached_owner_ids: Vec<String>,
    /// Time of the last detach, when not reattached
    #[serde(default, rename = "detachedAt")]
    pub detached_at_ms: Option<f64>,
    /// Estimated bytes held by the resource
    #[serde(default)]
    pub estimated_memory: Option<u64>,
}

impl ActiveResourceRecord {
    fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }
}

/// One point of the memory usage series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct MemorySample {
    /// Sample time in milliseconds
    #[serde(rename = "timestamp")]
    pub timestamp_ms: f64,
    /// Estimated total GPU bytes
    pub estimated_bytes: u64,
}

/// Thresholds and reference time for leak analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeakAnalysisOptions {
    /// Unattached resources older than this are leaked
    pub leak_threshold_ms: f64,
    /// Growth between the halves of the memory window that raises an alert
    pub memory_growth_threshold_bytes: u64,
    /// Reference time; stamped by the dispatcher when absent
    pub now_ms: Option<f64>,
}

impl Default for LeakAnalysisOptions {
    fn default() -> Self {
        Self {
            leak_threshold_ms: DEFAULT_LEAK_THRESHOLD_MS,
            memory_growth_threshold_bytes: DEFAULT_MEMORY_GROWTH_THRESHOLD_BYTES,
            now_ms: None,
        }
    }
}

/// Complete leak analysis input, with the reference time resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct LeakAnalysisInput {
    /// Lifecycle event log
    #[serde(default)]
    pub events: Vec<ResourceLifecycleEvent>,
    /// Live resources
    #[serde(default)]
    pub active_resources: Vec<ActiveResourceRecord>,
    /// Memory usage series
    #[serde(default)]
    pub memory_history: Vec<MemorySample>,
    /// Session start in milliseconds
    #[serde(default, rename = "sessionStart")]
    pub session_start_ms: f64,
    /// See [`LeakAnalysisOptions::leak_threshold_ms`]
    pub leak_threshold_ms: f64,
    /// See [`LeakAnalysisOptions::memory_growth_threshold_bytes`]
    pub memory_growth_threshold_bytes: u64,
    /// Reference time in milliseconds
    #[serde(rename = "now")]
    pub now_ms: f64,
}

impl LeakAnalysisInput {
    /// Combine inputs with options, using `now_ms` when the options carry no reference time.
    pub fn new(
        events: Vec<ResourceLifecycleEvent>,
        active_resources: Vec<ActiveResourceRecord>,
        memory_history: Vec<MemorySample>,
        session_start_ms: f64,
        options: LeakAnalysisOptions,
        now_ms: f64,
    ) -> Self {
        Self {
            events,
            active_resources,
            memory_history,
            session_start_ms,
            leak_threshold_ms: options.leak_threshold_ms,
            memory_growth_threshold_bytes: options.memory_growth_threshold_bytes,
            now_ms: options.now_ms.unwrap_or(now_ms),
        }
    }
}

/// Kind of leak alert
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "snake_case")]
pub enum LeakAlertType {
    /// Live, unattached and older than the threshold
    OrphanedResource,
    /// Detached longer than the threshold without being disposed
    DetachedNotDisposed,
    /// Memory series trending up
    MemoryGrowth,
}

/// Alert severity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational
    Info,
    /// Likely leak
    Warning,
    /// Well past the threshold
    Critical,
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct LeakAlert {
    /// `alert_<n>` in emission order
    pub id: String,
    /// Alert kind
    #[serde(rename = "type")]
    pub alert_type: LeakAlertType,
    /// Severity
    pub severity: AlertSeverity,
    /// Category of the offending resource
    pub resource_type: Option<ResourceType>,
    /// Id of the offending resource
    pub resource_id: Option<String>,
    /// Name of the offending resource
    pub resource_name: Option<String>,
    /// Short message
    pub message: String,
    /// Detail line
    pub details: String,
    /// Reference time of the analysis
    #[serde(rename = "timestamp")]
    pub timestamp_ms: f64,
    /// Remediation hint
    pub suggestion: String,
}

/// Alert counts and the leaked-byte estimate
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct LeakSummary {
    /// All alerts
    pub total_alerts: u32,
    /// Critical alerts
    pub critical_alerts: u32,
    /// Warning alerts
    pub warning_alerts: u32,
    /// Info alerts
    pub info_alerts: u32,
    /// Growth delta plus memory held by unattached resources
    pub estimated_leaked_memory_bytes: u64,
}

/// Counters for one resource category
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
pub struct CategoryStats {
    /// Created events
    pub created: u32,
    /// Disposed events
    pub disposed: u32,
    /// Live resources with no owner
    pub orphaned: u32,
    /// Resources judged leaked
    pub leaked: u32,
}

/// Counters per resource category
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
pub struct ResourceStats {
    /// Geometry counters
    pub geometries: CategoryStats,
    /// Material counters
    pub materials: CategoryStats,
    /// Texture counters
    pub textures: CategoryStats,
}

impl ResourceStats {
    fn category_mut(&mut self, resource_type: ResourceType) -> &mut CategoryStats {
        match resource_type {
            ResourceType::Geometry => &mut self.geometries,
            ResourceType::Material => &mut self.materials,
            ResourceType::Texture => &mut self.textures,
        }
    }

    fn categories(&self) -> [(ResourceType, &CategoryStats); 3] {
        [
            (ResourceType::Geometry, &self.geometries),
            (ResourceType::Material, &self.materials),
            (ResourceType::Texture, &self.textures),
        ]
    }
}

/// Result of leak analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct LeakReport {
    /// Reference time of the analysis
    #[serde(rename = "generatedAt")]
    pub generated_at_ms: f64,
    /// Reference time minus session start
    pub session_duration_ms: f64,
    /// Alert counts
    pub summary: LeakSummary,
    /// Alerts in emission order
    pub alerts: Vec<LeakAlert>,
    /// Per-category counters
    pub resource_stats: ResourceStats,
    /// The memory series that was analysed
    pub memory_history: Vec<MemorySample>,
    /// Remediation list, never empty
    pub recommendations: Vec<String>,
}

struct AlertSink {
    now_ms: f64,
    alerts: Vec<LeakAlert>,
}

impl AlertSink {
    fn push(
        &mut self,
        alert_type: LeakAlertType,
        severity: AlertSeverity,
        resource: Option<&ActiveResourceRecord>,
        message: String,
        details: String,
        suggestion: String,
    ) {
        let id = format!("alert_{}", self.alerts.len() + 1);
        self.alerts.push(LeakAlert {
            id,
            alert_type,
            severity,
            resource_type: resource.map(|r| r.resource_type),
            resource_id: resource.map(|r| r.id.clone()),
            resource_name: resource.and_then(|r| r.name.clone()),
            message,
            details,
            timestamp_ms: self.now_ms,
            suggestion,
        });
    }
}

/// Average growth between the two halves of the trailing memory window.
fn memory_growth(history: &[MemorySample]) -> Option<f64> {
    if history.len() < MIN_MEMORY_SAMPLES {
        return None;
    }
    let recent = &history[history.len().saturating_sub(MEMORY_GROWTH_WINDOW)..];
    let (first, second) = recent.split_at(recent.len() / 2);
    let average =
        |half: &[MemorySample]| half.iter().map(|s| s.estimated_bytes as f64).sum::<f64>() / half.len() as f64;
    Some(average(second) - average(first))
}

/// Analyse lifecycle data for leaks.
pub fn analyze_leaks(input: &LeakAnalysisInput) -> LeakReport {
    let now = input.now_ms;
    let threshold = input.leak_threshold_ms;
    let mut stats = ResourceStats::default();
    let mut sink = AlertSink {
        now_ms: now,
        alerts: Vec::new(),
    };

    for event in &input.events {
        let category = stats.category_mut(event.resource_type);
        match event.event_type {
            LifecycleEventType::Created => category.created += 1,
            LifecycleEventType::Disposed => category.disposed += 1,
            LifecycleEventType::Attached | LifecycleEventType::Detached => {}
        }
    }

    for resource in &input.active_resources {
        let kind = resource.resource_type;
        let age = now - resource.created_at_ms;

        if resource.attached_owner_ids.is_empty() {
            stats.category_mut(kind).orphaned += 1;
            if age > threshold {
                stats.category_mut(kind).leaked += 1;
                let severity = if age > threshold * 2.0 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                };
                sink.push(
                    LeakAlertType::OrphanedResource,
                    severity,
                    Some(resource),
                    format!("Orphaned {} not disposed", kind),
                    format!(
                        "{} has been active for {:.1}s without being attached to any owner",
                        resource.label(),
                        age / 1000.0
                    ),
                    format!("Call .dispose() on unused {} to free GPU memory", kind.plural()),
                );
            }
        }

        if let Some(detached_at) = resource.detached_at_ms {
            let since_detach = now - detached_at;
            if since_detach > threshold {
                stats.category_mut(kind).leaked += 1;
                sink.push(
                    LeakAlertType::DetachedNotDisposed,
                    AlertSeverity::Warning,
                    Some(resource),
                    format!("Detached {} not disposed", kind),
                    format!(
                        "{} was detached {:.1}s ago but not disposed",
                        resource.label(),
                        since_detach / 1000.0
                    ),
                    format!("Dispose {} after detaching from owners", kind.plural()),
                );
            }
        }
    }

    let mut estimated_leaked: u64 = 0;
    let growth_threshold = input.memory_growth_threshold_bytes as f64;
    if let Some(growth) = memory_growth(&input.memory_history) {
        if growth > growth_threshold {
            let severity = if growth > growth_threshold * 2.0 {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            let growth_bytes = growth.round() as u64;
            sink.push(
                LeakAlertType::MemoryGrowth,
                severity,
                None,
                "Memory usage growing consistently".to_string(),
                format!("Memory increased by {} over recent frames", format_bytes(growth_bytes)),
                "Check for undisposed resources or excessive object creation".to_string(),
            );
            estimated_leaked = growth_bytes;
        }
    }

    estimated_leaked += input
        .active_resources
        .iter()
        .filter(|r| r.attached_owner_ids.is_empty())
        .filter_map(|r| r.estimated_memory)
        .sum::<u64>();

    let mut recommendations: Vec<String> = stats
        .categories()
        .into_iter()
        .filter(|(_, category)| category.leaked > 0)
        .map(|(kind, category)| format!("Dispose {} leaked {}", category.leaked, kind.plural()))
        .collect();
    if estimated_leaked > 0 {
        recommendations.push(format!(
            "Estimated {} of GPU memory may be leaked",
            format_bytes(estimated_leaked)
        ));
    }
    if recommendations.is_empty() {
        recommendations.push("No significant memory leaks detected".to_string());
    }

    let alerts = sink.alerts;
    let count = |severity: AlertSeverity| alerts.iter().filter(|a| a.severity == severity).count() as u32;
    let summary = LeakSummary {
        total_alerts: alerts.len() as u32,
        critical_alerts: count(AlertSeverity::Critical),
        warning_alerts: count(AlertSeverity::Warning),
        info_alerts: count(AlertSeverity::Info),
        estimated_leaked_memory_bytes: estimated_leaked,
    };

    LeakReport {
        generated_at_ms: now,
        session_duration_ms: now - input.session_start_ms,
        summary,
        alerts,
        resource_stats: stats,
        memory_history: input.memory_history.clone(),
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f64 = 60_000.0;

    fn resource(id: &str, kind: ResourceType, created_at_ms: f64) -> ActiveResourceRecord {
        ActiveResourceRecord {
            id: id.to_string(),
            resource_type: kind,
            created_at_ms,
            name: None,
            attached_owner_ids: Vec::new(),
            detached_at_ms: None,
            estimated_memory: None,
        }
    }

    fn input(active: Vec<ActiveResourceRecord>, memory: Vec<MemorySample>, now_ms: f64) -> LeakAnalysisInput {
        LeakAnalysisInput::new(
            Vec::new(),
            active,
            memory,
            0.0,
            LeakAnalysisOptions::default(),
            now_ms,
        )
    }

    fn event(kind: ResourceType, event_type: LifecycleEventType) -> ResourceLifecycleEvent {
        ResourceLifecycleEvent {
            id: "evt".to_string(),
            resource_type: kind,
            resource_id: "r".to_string(),
            event_type,
            timestamp_ms: 0.0,
            estimated_memory: None,
        }
    }

    #[test]
    fn test_no_leaks() {
        let report = analyze_leaks(&input(Vec::new(), Vec::new(), 1000.0));
        assert!(report.alerts.is_empty());
        assert_eq!(report.recommendations, vec!["No significant memory leaks detected"]);
        assert_eq!(report.session_duration_ms, 1000.0);
        assert_eq!(report.generated_at_ms, 1000.0);
    }

    #[test]
    fn test_orphan_severity_bands() {
        let now = 200_000.0;
        let active = vec![
            // age 150s > 2x threshold
            resource("old", ResourceType::Texture, now - 150_000.0),
            // age 90s between 1x and 2x
            resource("mid", ResourceType::Geometry, now - 90_000.0),
            // age 10s, orphaned but not leaked
            resource("young", ResourceType::Material, now - 10_000.0),
        ];
        let report = analyze_leaks(&input(active, Vec::new(), now));

        assert_eq!(report.alerts.len(), 2);
        assert_eq!(report.alerts[0].id, "alert_1");
        assert_eq!(report.alerts[0].alert_type, LeakAlertType::OrphanedResource);
        assert_eq!(report.alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(report.alerts[1].id, "alert_2");
        assert_eq!(report.alerts[1].severity, AlertSeverity::Warning);
        assert_eq!(report.alerts[0].message, "Orphaned texture not disposed");
        assert_eq!(
            report.alerts[1].details,
            "mid has been active for 90.0s without being attached to any owner"
        );

        assert_eq!(report.resource_stats.materials.orphaned, 1);
        assert_eq!(report.resource_stats.materials.leaked, 0);
        assert_eq!(report.summary.critical_alerts, 1);
        assert_eq!(report.summary.warning_alerts, 1);
        assert_eq!(
            report.recommendations,
            vec!["Dispose 1 leaked geometries", "Dispose 1 leaked textures"]
        );
    }

    #[test]
    fn test_attached_resource_not_orphaned() {
        let now = 500_000.0;
        let mut attached = resource("mesh-geo", ResourceType::Geometry, 0.0);
        attached.attached_owner_ids.push("mesh-1".to_string());
        attached.estimated_memory = Some(4096);

        let report = analyze_leaks(&input(vec![attached], Vec::new(), now));
        assert!(report.alerts.is_empty());
        assert_eq!(report.resource_stats.geometries.orphaned, 0);
        assert_eq!(report.summary.estimated_leaked_memory_bytes, 0);
    }

    #[test]
    fn test_detached_not_disposed() {
        let now = 100_000.0;
        let mut detached = resource("tex", ResourceType::Texture, now - 1000.0);
        detached.name = Some("albedo".to_string());
        detached.attached_owner_ids.push("mesh".to_string());
        detached.detached_at_ms = Some(now - 61_000.0);

        let report = analyze_leaks(&input(vec![detached], Vec::new(), now));
        assert_eq!(report.alerts.len(), 1);
        let alert = &report.alerts[0];
        assert_eq!(alert.alert_type, LeakAlertType::DetachedNotDisposed);
        assert_eq!(alert.severity, AlertSeverity::Warning);
        assert_eq!(alert.resource_name.as_deref(), Some("albedo"));
        assert_eq!(alert.details, "albedo was detached 61.0s ago but not disposed");
        assert_eq!(report.resource_stats.textures.leaked, 1);
    }

    #[test]
    fn test_memory_growth() {
        let mib = 1024 * 1024;
        // 20 samples: first half 100 MiB, second half 220 MiB
        let memory: Vec<MemorySample> = (0..20)
            .map(|i| MemorySample {
                timestamp_ms: i as f64 * 100.0,
                estimated_bytes: if i < 10 { 100 * mib } else { 220 * mib },
            })
            .collect();

        let mut orphan = resource("buf", ResourceType::Geometry, 0.0);
        orphan.estimated_memory = Some(mib);

        let report = analyze_leaks(&input(vec![orphan], memory, 1000.0));
        let alert = report
            .alerts
            .iter()
            .find(|a| a.alert_type == LeakAlertType::MemoryGrowth)
            .unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.details, "Memory increased by 120.00 MB over recent frames");
        assert!(alert.resource_type.is_none());
        assert_eq!(report.summary.estimated_leaked_memory_bytes, 121 * mib);
        assert_eq!(
            report.recommendations.last().unwrap(),
            "Estimated 121.00 MB of GPU memory may be leaked"
        );
    }

    #[test]
    fn test_memory_growth_needs_enough_samples() {
        let memory: Vec<MemorySample> = (0..9)
            .map(|i| MemorySample {
                timestamp_ms: i as f64,
                estimated_bytes: i * 1024 * 1024 * 1024,
            })
            .collect();
        let report = analyze_leaks(&input(Vec::new(), memory, 0.0));
        assert!(report.alerts.is_empty());
        assert_eq!(report.memory_history.len(), 9);
    }

    #[test]
    fn test_event_counts() {
        let mut data = input(Vec::new(), Vec::new(), 0.0);
        data.events = vec![
            event(ResourceType::Geometry, LifecycleEventType::Created),
            event(ResourceType::Geometry, LifecycleEventType::Created),
            event(ResourceType::Geometry, LifecycleEventType::Disposed),
            event(ResourceType::Texture, LifecycleEventType::Attached),
        ];
        let report = analyze_leaks(&data);
        assert_eq!(report.resource_stats.geometries.created, 2);
        assert_eq!(report.resource_stats.geometries.disposed, 1);
        assert_eq!(report.resource_stats.textures, CategoryStats::default());
    }

    #[test]
    fn test_options_reference_time_wins() {
        let options = LeakAnalysisOptions {
            now_ms: Some(42.0),
            ..Default::default()
        };
        let data = LeakAnalysisInput::new(Vec::new(), Vec::new(), Vec::new(), 2.0, options, 1000.0);
        assert_eq!(data.now_ms, 42.0);
        assert_eq!(THRESHOLD, data.leak_threshold_ms);
    }
}
