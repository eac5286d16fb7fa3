//! Line framing for the culfw protocol.
//!
//! culfw talks in ASCII lines:
//! ```text
//! ┌───────────────────┬──────────┐
//! │   command/reply   │  \r\n    │
//! │   ASCII text      │ 2 bytes  │
//! └───────────────────┴──────────┘
//! ```
//! Received lines may end in `\r\n`, `\n` or `\r`; empty lines are skipped.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::LineError;

/// Line terminator appended to outgoing commands.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Longest line accepted before the decoder gives up on the buffered data.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Encodes a command into a terminated line.
#[must_use]
pub fn encode(command: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(command.len() + LINE_TERMINATOR.len());
    buf.put_slice(command.as_bytes());
    buf.put_slice(LINE_TERMINATOR);
    buf.freeze()
}

/// Line decoder that handles partial reads.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    /// Creates a new line decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feeds data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete line.
    ///
    /// Returns `Ok(Some(line))` without its terminator, `Ok(None)` if more data
    /// is needed, or an error if a line is longer than [`MAX_LINE_LENGTH`],
    /// with or without its terminator. The oversized data is dropped so
    /// decoding can resume with the next line.
    pub fn decode(&mut self) -> Result<Option<String>, LineError> {
        loop {
            let Some(end) = self
                .buffer
                .iter()
                .position(|&b| b == b'\n' || b == b'\r')
            else {
                if self.buffer.len() > MAX_LINE_LENGTH {
                    let size = self.buffer.len();
                    self.buffer.clear();
                    return Err(LineError::TooLong {
                        size,
                        max: MAX_LINE_LENGTH,
                    });
                }
                return Ok(None);
            };

            let line = self.buffer.split_to(end);
            self.buffer.advance(1);

            if line.len() > MAX_LINE_LENGTH {
                return Err(LineError::TooLong {
                    size: line.len(),
                    max: MAX_LINE_LENGTH,
                });
            }

            if line.is_empty() {
                continue;
            }

            return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
        }
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
