//! Protocol definitions for culfw communication.
//!
//! This module contains the low-level protocol pieces:
//! - Line framing (culfw speaks CR/LF terminated ASCII lines)
//! - The command strings used by the handshake and release

pub mod command;
pub mod line;

pub use line::{LineDecoder, MAX_LINE_LENGTH, encode as encode_line};
