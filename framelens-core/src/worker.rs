//! Isolated Worker Entry Point
//!
//! The worker side of the context boundary. The same loop runs on a dedicated
//! thread (over in-process pipes) or in a child process.
//!
//! In a child process on Unix the transport is fd 3/4, announced through
//! `FRAMELENS_IPC_FD`, and SIGTERM requests a graceful exit. Elsewhere the
//! process falls back to stdin/stdout.

use crate::custom::CustomTaskTable;
use crate::runner::run_task;
use framelens_ipc::{
    ContextCommand, FrameError, FrameReader, FrameWriter, IPC_FD_ENV, WorkerCapabilities,
    WorkerMessage,
};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

/// Set by the SIGTERM handler.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Whether a graceful shutdown has been requested via SIGTERM.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Only touches an atomic, so it is async-signal-safe.
#[cfg(unix)]
fn install_sigterm_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(not(unix))]
fn install_sigterm_handler() {}

enum IpcTransport {
    #[cfg(unix)]
    Fds {
        read_fd: i32,
        write_fd: i32,
    },
    Stdio,
}

fn detect_transport() -> IpcTransport {
    #[cfg(unix)]
    if let Ok(val) = std::env::var(IPC_FD_ENV) {
        let parts: Vec<&str> = val.split(',').collect();
        if parts.len() == 2 {
            if let (Ok(r), Ok(w)) = (parts[0].parse::<i32>(), parts[1].parse::<i32>()) {
                return IpcTransport::Fds {
                    read_fd: r,
                    write_fd: w,
                };
            }
        }
        warn!(
            "invalid {}={:?} (expected <read_fd>,<write_fd>), falling back to stdio",
            IPC_FD_ENV, val
        );
    }
    IpcTransport::Stdio
}

type BoxedReader = Box<dyn Read + Send>;
type BoxedWriter = Box<dyn Write + Send>;

/// Worker main loop
pub struct WorkerMain {
    reader: FrameReader<BoxedReader>,
    writer: FrameWriter<BoxedWriter>,
    custom: CustomTaskTable,
    handle_signals: bool,
}

impl WorkerMain {
    /// Worker for a child process: fd 3/4 when `FRAMELENS_IPC_FD` is set,
    /// otherwise stdin/stdout. Only statically registered custom tasks are known.
    pub fn from_env() -> Self {
        let (reader, writer): (BoxedReader, BoxedWriter) = match detect_transport() {
            #[cfg(unix)]
            IpcTransport::Fds { read_fd, write_fd } => {
                let read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
                let write_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
                (Box::new(read_file), Box::new(write_file))
            }
            IpcTransport::Stdio => (Box::new(std::io::stdin()), Box::new(std::io::stdout())),
        };

        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
            custom: CustomTaskTable::with_registered(),
            handle_signals: true,
        }
    }

    /// Worker over an explicit transport, used by the thread context.
    pub fn with_transport<R, W>(reader: R, writer: W, custom: CustomTaskTable) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            reader: FrameReader::new(Box::new(reader)),
            writer: FrameWriter::new(Box::new(writer)),
            custom,
            handle_signals: false,
        }
    }

    /// Send the handshake, then answer commands until shutdown or end of stream.
    pub fn run(&mut self) -> Result<(), FrameError> {
        if self.handle_signals {
            install_sigterm_handler();
        }

        self.writer.write(&WorkerMessage::Hello(WorkerCapabilities::current(
            self.custom.names(),
        )))?;

        loop {
            if self.handle_signals && shutdown_requested() {
                debug!("worker: SIGTERM received, exiting");
                break;
            }

            let command: ContextCommand = match self.reader.read() {
                Ok(command) => command,
                Err(FrameError::EndOfStream) => break,
                Err(e) => return Err(e),
            };

            match command {
                ContextCommand::Run(request) => {
                    let response = run_task(&request, &self.custom);
                    self.writer.write(&WorkerMessage::Response(response))?;
                }
                ContextCommand::Shutdown => break,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelens_ipc::{TaskOutput, TaskPayload, TaskRequest};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Writer that keeps its bytes readable after the worker drops it.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn encode(commands: &[ContextCommand]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            for command in commands {
                writer.write(command).unwrap();
            }
        }
        buffer
    }

    fn decode(output: &SharedBuffer) -> Vec<WorkerMessage> {
        let bytes = output.0.lock().unwrap().clone();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let mut messages = Vec::new();
        while let Ok(message) = reader.read::<WorkerMessage>() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_hello_then_responses() {
        let input = encode(&[
            ContextCommand::Run(TaskRequest::new(
                "task_1",
                TaskPayload::PercentileCalc {
                    values: vec![1.0, 2.0, 3.0, 4.0],
                    percentiles: vec![50.0],
                },
            )),
            ContextCommand::Shutdown,
        ]);
        let output = SharedBuffer::default();

        let mut table = CustomTaskTable::new();
        table.register("noop", Ok);
        let mut worker = WorkerMain::with_transport(Cursor::new(input), output.clone(), table);
        worker.run().unwrap();

        let messages = decode(&output);
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            WorkerMessage::Hello(caps) => {
                assert_eq!(caps.protocol_version, framelens_ipc::PROTOCOL_VERSION);
                assert_eq!(caps.custom_tasks, vec!["noop"]);
            }
            other => panic!("expected hello, got {:?}", other),
        }
        match &messages[1] {
            WorkerMessage::Response(response) => {
                assert_eq!(response.id, "task_1");
                match &response.result {
                    Some(TaskOutput::PercentileCalc(result)) => assert_eq!(result.median, 2.5),
                    other => panic!("unexpected output: {:?}", other),
                }
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_end_of_stream_is_clean_exit() {
        let output = SharedBuffer::default();
        let mut worker =
            WorkerMain::with_transport(Cursor::new(Vec::new()), output.clone(), CustomTaskTable::new());
        assert!(worker.run().is_ok());
        assert_eq!(decode(&output).len(), 1);
    }

    #[test]
    fn test_corrupt_command_is_error() {
        let mut input = 8u32.to_le_bytes().to_vec();
        input.extend_from_slice(&[0xAB; 8]);
        let mut worker = WorkerMain::with_transport(
            Cursor::new(input),
            SharedBuffer::default(),
            CustomTaskTable::new(),
        );
        assert!(worker.run().is_err());
    }
}
