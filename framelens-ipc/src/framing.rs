//! Length-Prefixed Frame Encoding
//!
//! Message boundaries over the byte pipes joining dispatcher and worker.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  | rkyv payload     |
//! +----------------+------------------+
//! ```

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use thiserror::Error;

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// Errors raised while encoding or decoding frames
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying pipe failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// rkyv could not encode the message
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The payload failed validation against the expected archive layout
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Length prefix beyond [`MAX_FRAME_SIZE`]
    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Announced or encoded payload length
        size: usize,
        /// Limit in force
        max: usize,
    },

    /// Structurally malformed frame
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Peer closed the stream on a frame boundary
    #[error("End of stream")]
    EndOfStream,
}

fn check_frame_len(len: usize) -> Result<(), FrameError> {
    match len {
        0 => Err(FrameError::InvalidFrame("zero-length frame".to_string())),
        size if size > MAX_FRAME_SIZE => Err(FrameError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        }),
        _ => Ok(()),
    }
}

/// Serialize `message` and write it as one flushed frame.
pub fn write_frame<W, T>(writer: &mut BufWriter<W>, message: &T) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize<AllocSerializer<256>>,
{
    let bytes =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Serialization(e.to_string()))?;

    let len = bytes.len();
    check_frame_len(len)?;

    writer.write_all(&(len as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;

    Ok(())
}

/// Read one frame and deserialize it after validation.
///
/// A clean EOF before the length prefix is [`FrameError::EndOfStream`].
pub fn read_frame<R, T>(reader: &mut BufReader<R>) -> Result<T, FrameError>
where
    R: Read,
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::EndOfStream);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    check_frame_len(len)?;

    let mut buf = rkyv::AlignedVec::with_capacity(len);
    buf.resize(len, 0);
    reader.read_exact(&mut buf)?;

    let archived = rkyv::check_archived_root::<T>(&buf)
        .map_err(|e| FrameError::Deserialization(e.to_string()))?;

    let value: T = archived
        .deserialize(&mut Infallible)
        .expect("infallible deserialization");

    Ok(value)
}

/// Buffered frame sink over a pipe
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(PIPE_BUFFER_SIZE, writer),
        }
    }

    /// Write one message frame
    pub fn write<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        write_frame(&mut self.writer, message)
    }
}

/// Buffered frame source over a pipe
pub struct FrameReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(PIPE_BUFFER_SIZE, reader),
        }
    }

    /// Read one message frame
    pub fn read<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        read_frame(&mut self.reader)
    }
}
