//! Length-prefixed wire framing for worker sockets.
//!
//! Every message on a worker socket is one frame: a 4-byte big-endian
//! payload length followed by exactly that many payload bytes. The payload
//! encoding (JSON) is the concern of [`crate::message`]; this module only
//! moves opaque byte payloads.
//!
//! [`Framer`] is the receive half: bytes arrive from the socket in arbitrary
//! chunks, are buffered losslessly, and complete payloads are handed out in
//! order. A declared length above [`MAX_FRAME_LEN`] is unrecoverable since
//! the stream offset can no longer be trusted; callers are expected to drop
//! the connection.

use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Size of the length prefix preceding every payload.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload the framer will accept (16 MiB).
///
/// Parse responses for large modules are the biggest frames in practice and
/// stay far below this.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The declared payload length exceeds [`MAX_FRAME_LEN`].
    #[error("frame length {declared} exceeds maximum {max}")]
    Oversized { declared: usize, max: usize },
}

// ============================================================================
// Framer
// ============================================================================

/// Incremental decoder for length-prefixed frames.
///
/// Feed raw socket bytes with [`Framer::push`], then drain complete payloads
/// with [`Framer::next_frame`] until it returns `Ok(None)`. Partial prefixes
/// and partial payloads are retained across calls, so arbitrary chunking of
/// the byte stream never loses or reorders data.
#[derive(Debug, Default)]
pub struct Framer {
    buf: Vec<u8>,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes received from the socket.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes buffered but not yet returned as frames.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Returns the next complete payload, or `Ok(None)` if more bytes are
    /// needed.
    ///
    /// An oversized declared length returns an error and leaves the buffer
    /// untouched; the stream is not resynchronizable past that point.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.buf.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }
        let declared =
            u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if declared > MAX_FRAME_LEN {
            return Err(FrameError::Oversized {
                declared,
                max: MAX_FRAME_LEN,
            });
        }
        let total = LENGTH_PREFIX_LEN + declared;
        if self.buf.len() < total {
            return Ok(None);
        }
        let payload = self.buf[LENGTH_PREFIX_LEN..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(payload))
    }

    /// Encodes one payload as a frame ready to write to the socket.
    pub fn encode(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(FrameError::Oversized {
                declared: payload.len(),
                max: MAX_FRAME_LEN,
            });
        }
        let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        Ok(out)
    }
}

// ============================================================================
// Tests
// ============================================================================
