//! Live link to a context after the handshake

use super::{ContextError, ContextTransport, GuardSlot};
use crate::registry::TaskRegistry;
use framelens_ipc::{
    ContextCommand, FrameError, FrameReader, FrameWriter, PROTOCOL_VERSION, WorkerCapabilities,
    WorkerMessage,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

struct LinkState {
    healthy: AtomicBool,
    closing: AtomicBool,
}

impl LinkState {
    /// Mark the link dead and reject its tasks. Only the first fault acts.
    fn fault(&self, registry: &TaskRegistry, generation: u64, reason: &str) {
        if !self.healthy.swap(false, Ordering::SeqCst) {
            return;
        }
        if !self.closing.load(Ordering::SeqCst) {
            error!("Isolated context {} failed: {}", generation, reason);
        }
        let rejected = registry.fail_context(generation, reason);
        if rejected > 0 {
            debug!("rejected {} task(s) pending on context {}", rejected, generation);
        }
    }
}

/// Handle on one running context
pub(crate) struct ContextConnection {
    generation: u64,
    commands: mpsc::UnboundedSender<ContextCommand>,
    state: Arc<LinkState>,
    capabilities: WorkerCapabilities,
}

impl ContextConnection {
    /// Complete the handshake over `transport` and start its I/O threads.
    ///
    /// Blocks until the worker's hello arrives. The reader thread releases
    /// `guard` once the message stream closes.
    pub fn connect(
        transport: ContextTransport,
        guard: Arc<GuardSlot>,
        generation: u64,
        registry: Arc<TaskRegistry>,
    ) -> Result<Self, ContextError> {
        let ContextTransport { reader, writer, .. } = transport;
        let mut reader = FrameReader::new(reader);
        let mut writer = FrameWriter::new(writer);

        let capabilities = match reader.read::<WorkerMessage>()? {
            WorkerMessage::Hello(caps) => {
                if caps.protocol_version != PROTOCOL_VERSION {
                    return Err(ContextError::Protocol {
                        expected: format!("protocol version {}", PROTOCOL_VERSION),
                        got: format!("protocol version {}", caps.protocol_version),
                    });
                }
                caps
            }
            other => {
                return Err(ContextError::Protocol {
                    expected: "Hello".to_string(),
                    got: format!("{:?}", other),
                });
            }
        };

        let state = Arc::new(LinkState {
            healthy: AtomicBool::new(true),
            closing: AtomicBool::new(false),
        });
        let (commands, mut command_rx) = mpsc::unbounded_channel::<ContextCommand>();

        let writer_state = Arc::clone(&state);
        let writer_registry = Arc::clone(&registry);
        std::thread::Builder::new()
            .name(format!("framelens-ctx{}-tx", generation))
            .spawn(move || {
                while let Some(command) = command_rx.blocking_recv() {
                    let last = matches!(command, ContextCommand::Shutdown);
                    if let Err(e) = writer.write(&command) {
                        writer_state.fault(&writer_registry, generation, &format!("write failed: {}", e));
                        break;
                    }
                    if last {
                        break;
                    }
                }
            })?;

        let reader_state = Arc::clone(&state);
        std::thread::Builder::new()
            .name(format!("framelens-ctx{}-rx", generation))
            .spawn(move || {
                loop {
                    match reader.read::<WorkerMessage>() {
                        Ok(WorkerMessage::Response(response)) => registry.complete(response),
                        Ok(WorkerMessage::Hello(_)) => {
                            warn!("Ignoring repeated hello from context {}", generation);
                        }
                        Err(FrameError::EndOfStream) => {
                            reader_state.fault(&registry, generation, "context exited");
                            break;
                        }
                        Err(e) => {
                            reader_state.fault(&registry, generation, &e.to_string());
                            break;
                        }
                    }
                }
                drop(guard.release());
            })?;

        debug!(
            "context {} ready (protocol v{}, pid {}, {} custom task(s))",
            generation,
            capabilities.protocol_version,
            capabilities.pid,
            capabilities.custom_tasks.len()
        );

        Ok(Self {
            generation,
            commands,
            state,
            capabilities,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn capabilities(&self) -> &WorkerCapabilities {
        &self.capabilities
    }

    pub fn is_healthy(&self) -> bool {
        self.state.healthy.load(Ordering::SeqCst)
    }

    /// Queue a command for the writer thread.
    pub fn send(&self, command: ContextCommand) -> Result<(), ContextError> {
        if !self.is_healthy() {
            return Err(ContextError::Ipc(FrameError::EndOfStream));
        }
        self.commands
            .send(command)
            .map_err(|_| ContextError::Ipc(FrameError::EndOfStream))
    }

    /// Ask the worker to exit. Its end of stream then faults the link quietly.
    pub fn shutdown(&self) {
        if self.state.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.commands.send(ContextCommand::Shutdown);
    }
}

impl Drop for ContextConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
