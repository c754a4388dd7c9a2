//! Monotonic millisecond clock shared by callers and the dispatcher.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the first call in this process.
///
/// Leak analysis timestamps (`createdAt`, `detachedAt`, session start) are expected
/// on this clock when the caller lets the dispatcher stamp the reference time.
pub fn now_ms() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
}
