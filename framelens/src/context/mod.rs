//! Isolated execution context
//!
//! A context is a worker loop on the far side of a byte stream. Launchers decide
//! where that loop lives (a dedicated thread, a child process, or nowhere); the
//! connection owns the stream once the handshake has completed.
//!
//! ```text
//!  TaskDispatcher ──► commands (mpsc) ──► writer thread ──► pipe ──► WorkerMain
//!        ▲                                                               │
//!        └──── TaskRegistry::complete ◄── reader thread ◄── pipe ◄───────┘
//! ```

mod connection;
mod manager;
mod process;

pub(crate) use connection::ContextConnection;
pub(crate) use manager::{ContextManager, HANDSHAKE_TIMEOUT};
pub use process::ProcessLauncher;

use framelens_core::CustomTaskTable;
use framelens_ipc::FrameError;
use parking_lot::Mutex;
use std::io::{Read, Write};
use thiserror::Error;

/// Errors raised while bringing up a context
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Failed to launch context: {0}")]
    Launch(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(#[from] FrameError),

    #[error("Context protocol error: expected {expected}, got {got}")]
    Protocol { expected: String, got: String },

    #[error("Context handshake timed out after {0}ms")]
    HandshakeTimeout(u64),

    #[error("Launch task failed: {0}")]
    Join(String),
}

/// Byte stream to a running worker loop
pub struct ContextTransport {
    pub(crate) reader: Box<dyn Read + Send>,
    pub(crate) writer: Box<dyn Write + Send>,
    pub(crate) guard: Option<Box<dyn Send>>,
}

impl ContextTransport {
    /// Transport over a reader for worker messages and a writer for commands.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            guard: None,
        }
    }

    /// Attach a value dropped once the context's message stream has closed,
    /// such as a child process handle.
    pub fn with_guard(mut self, guard: impl Send + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }
}

#[derive(Default)]
enum GuardState {
    #[default]
    Empty,
    Holding(Box<dyn Send>),
    Released,
}

/// A transport's guard, shared between the connection and the launch that
/// may give up on it. Whoever releases first drops the guard.
#[derive(Default)]
pub(crate) struct GuardSlot(Mutex<GuardState>);

impl GuardSlot {
    /// Take custody of `guard`. Returns false, dropping it, once released.
    pub fn hold(&self, guard: Option<Box<dyn Send>>) -> bool {
        let mut state = self.0.lock();
        match *state {
            GuardState::Released => {
                drop(state);
                drop(guard);
                false
            }
            _ => {
                *state = match guard {
                    Some(guard) => GuardState::Holding(guard),
                    None => GuardState::Empty,
                };
                true
            }
        }
    }

    /// Hand back the guard for dropping. Later [`hold`](Self::hold) calls fail.
    pub fn release(&self) -> Option<Box<dyn Send>> {
        match std::mem::replace(&mut *self.0.lock(), GuardState::Released) {
            GuardState::Holding(guard) => Some(guard),
            _ => None,
        }
    }
}

/// Starts a worker loop and hands back its transport.
///
/// `Ok(None)` means isolation is unavailable in this environment; the
/// dispatcher then runs everything on the fallback path.
pub trait ContextLauncher: Send + Sync + 'static {
    /// Launch one context. `custom` holds the handlers the dispatcher knows about.
    fn launch(&self, custom: &CustomTaskTable) -> Result<Option<ContextTransport>, ContextError>;
}

/// Never provides a context
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLauncher;

impl ContextLauncher for DisabledLauncher {
    fn launch(&self, _custom: &CustomTaskTable) -> Result<Option<ContextTransport>, ContextError> {
        Ok(None)
    }
}

/// Hosts the worker loop on a dedicated thread over OS pipes
///
/// Nothing but serialized frames crosses between the dispatcher and the
/// thread. Closures registered on the dispatcher are available here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLauncher;

impl ContextLauncher for ThreadLauncher {
    #[cfg(not(target_family = "wasm"))]
    fn launch(&self, custom: &CustomTaskTable) -> Result<Option<ContextTransport>, ContextError> {
        use framelens_core::WorkerMain;
        use tracing::warn;

        let (command_read, command_write) = std::io::pipe()?;
        let (message_read, message_write) = std::io::pipe()?;
        let custom = custom.clone();

        std::thread::Builder::new()
            .name("framelens-context".to_string())
            .spawn(move || {
                let mut worker = WorkerMain::with_transport(command_read, message_write, custom);
                if let Err(e) = worker.run() {
                    warn!("context thread exited: {}", e);
                }
            })?;

        Ok(Some(ContextTransport::new(message_read, command_write)))
    }

    #[cfg(target_family = "wasm")]
    fn launch(&self, _custom: &CustomTaskTable) -> Result<Option<ContextTransport>, ContextError> {
        Ok(None)
    }
}
