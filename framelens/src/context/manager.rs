//! Lazy, single-flight context lifecycle

use super::{ContextConnection, ContextError, ContextLauncher, GuardSlot};
use crate::registry::TaskRegistry;
use framelens_core::CustomTaskTable;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Default upper bound on launch plus handshake
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Slot = Arc<OnceCell<Option<Arc<ContextConnection>>>>;

/// Owns the current context, launching it at most once per generation.
///
/// Concurrent callers of [`ensure`](Self::ensure) share one launch. A failed or
/// unavailable launch is remembered as `None` until [`reinitialize`](Self::reinitialize).
pub(crate) struct ContextManager {
    launcher: Arc<dyn ContextLauncher>,
    custom: CustomTaskTable,
    registry: Arc<TaskRegistry>,
    handshake_timeout: Duration,
    slot: Mutex<Slot>,
    generation: AtomicU64,
    closed: AtomicBool,
}

impl ContextManager {
    pub fn new(
        launcher: Arc<dyn ContextLauncher>,
        custom: CustomTaskTable,
        registry: Arc<TaskRegistry>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            custom,
            registry,
            handshake_timeout,
            slot: Mutex::new(Arc::new(OnceCell::new())),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// The current context, launching it on first use.
    pub async fn ensure(&self) -> Option<Arc<ContextConnection>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let slot = Arc::clone(&*self.slot.lock());
        let connection = slot.get_or_init(|| self.launch()).await.clone();

        // Lost a race with shutdown
        if self.closed.load(Ordering::SeqCst) {
            if let Some(connection) = &connection {
                connection.shutdown();
            }
            return None;
        }
        connection
    }

    async fn launch(&self) -> Option<Arc<ContextConnection>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let launcher = Arc::clone(&self.launcher);
        let custom = self.custom.clone();
        let registry = Arc::clone(&self.registry);

        let timeout = self.handshake_timeout;
        let timeout_ms = timeout.as_millis() as u64;
        let guard = Arc::new(GuardSlot::default());
        let attempt_guard = Arc::clone(&guard);

        let attempt = tokio::task::spawn_blocking(move || -> Result<Option<ContextConnection>, ContextError> {
            match launcher.launch(&custom)? {
                Some(mut transport) => {
                    if !attempt_guard.hold(transport.guard.take()) {
                        return Err(ContextError::HandshakeTimeout(timeout_ms));
                    }
                    ContextConnection::connect(transport, attempt_guard, generation, registry)
                        .map(Some)
                }
                None => Ok(None),
            }
        });

        let result = match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ContextError::Join(e.to_string())),
            Err(_) => {
                // Tearing down the peer unblocks the pending hello read
                if let Some(stalled) = guard.release() {
                    tokio::task::spawn_blocking(move || drop(stalled));
                }
                Err(ContextError::HandshakeTimeout(timeout_ms))
            }
        };

        match result {
            Ok(Some(connection)) => {
                info!("Isolated context {} initialized", generation);
                Some(Arc::new(connection))
            }
            Ok(None) => {
                info!("Isolated context unavailable, using fallback execution");
                None
            }
            Err(e) => {
                warn!("Failed to initialize isolated context: {}, using fallback execution", e);
                None
            }
        }
    }

    /// The current context if it has been launched.
    pub fn current(&self) -> Option<Arc<ContextConnection>> {
        self.slot.lock().get().cloned().flatten()
    }

    pub fn is_available(&self) -> bool {
        self.current().is_some_and(|connection| connection.is_healthy())
    }

    /// Drop the current context and launch a fresh one.
    pub async fn reinitialize(&self) -> bool {
        self.retire();
        self.ensure()
            .await
            .is_some_and(|connection| connection.is_healthy())
    }

    /// Terminate the current context. No new context is launched afterwards.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.retire();
    }

    fn retire(&self) {
        let old = std::mem::replace(&mut *self.slot.lock(), Arc::new(OnceCell::new()));
        if let Some(Some(connection)) = old.get() {
            connection.shutdown();
        }
    }
}
