//! Engine statistics

use serde::Serialize;

/// Snapshot of dispatcher activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Tasks admitted
    pub total_tasks: u64,
    /// Tasks answered successfully
    pub completed_tasks: u64,
    /// Tasks answered with a failure or lost to a context fault
    pub failed_tasks: u64,
    /// Tasks whose timer fired first
    pub timed_out_tasks: u64,
    /// Tasks rejected by `cancel_all_tasks` or `dispose`
    pub cancelled_tasks: u64,
    /// Mean round-trip time over completed and failed tasks
    pub avg_processing_time_ms: f64,
    /// Tasks currently in flight
    pub pending_tasks: usize,
    /// Whether the isolated context is currently usable
    pub is_available: bool,
}

/// Resettable counters behind [`EngineStats`]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub total_processing_ms: f64,
}

impl Counters {
    pub fn record_response(&mut self, success: bool, round_trip_ms: f64) {
        self.total_processing_ms += round_trip_ms;
        if success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn avg_processing_time_ms(&self) -> f64 {
        let answered = self.completed + self.failed;
        if answered == 0 {
            0.0
        } else {
            self.total_processing_ms / answered as f64
        }
    }

    pub fn snapshot(&self, pending_tasks: usize, is_available: bool) -> EngineStats {
        EngineStats {
            total_tasks: self.total,
            completed_tasks: self.completed,
            failed_tasks: self.failed,
            timed_out_tasks: self.timed_out,
            cancelled_tasks: self.cancelled,
            avg_processing_time_ms: self.avg_processing_time_ms(),
            pending_tasks,
            is_available,
        }
    }
}
