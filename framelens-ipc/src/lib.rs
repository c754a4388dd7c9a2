#![warn(missing_docs)]
//! FrameLens IPC Protocol
//!
//! Binary protocol between the task dispatcher and the isolated worker context.
//! Every request and response crosses the boundary as a length-prefixed rkyv
//! frame; nothing is shared in memory.

mod framing;
mod messages;

pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE, read_frame, write_frame};
pub use messages::{
    ContextCommand, TaskFailure, TaskKind, TaskOutput, TaskPayload, TaskRequest, TaskResponse,
    WorkerCapabilities, WorkerMessage,
};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable naming the worker's read and write descriptors
pub const IPC_FD_ENV: &str = "FRAMELENS_IPC_FD";

/// Command-line flag that turns the `framelens` binary into a worker process
pub const WORKER_FLAG: &str = "--framelens-worker";
