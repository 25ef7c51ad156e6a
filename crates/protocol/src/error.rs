//! Protocol error types
//!
//! Errors that can occur when decoding OSC datagrams. All variants are
//! recoverable: a listening loop logs the error and keeps serving.

use thiserror::Error;

/// Errors that can occur during codec operations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Datagram ended before a complete value could be read
    #[error("truncated packet: needed {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    /// A string ran to the end of the packet without a NUL terminator
    #[error("unterminated string at offset {offset}")]
    UnterminatedString { offset: usize },

    /// String bytes were not valid UTF-8
    #[error("invalid UTF-8 in string: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Message address did not start with `/`
    #[error("invalid address {0:?}: must start with '/'")]
    InvalidAddress(String),

    /// Type tag string did not start with `,`
    #[error("invalid type tag string {0:?}: must start with ','")]
    InvalidTypeTags(String),

    /// A type tag we do not decode
    #[error("unsupported type tag '{0}'")]
    UnsupportedType(char),

    /// Bundle element carried a nonsensical size
    #[error("invalid bundle element size {size}")]
    InvalidElementSize { size: i32 },

    /// Zero-length datagram
    #[error("empty packet")]
    Empty,
}

impl ProtocolError {
    /// Create a truncation error
    #[inline]
    pub fn truncated(needed: usize, remaining: usize) -> Self {
        Self::Truncated { needed, remaining }
    }
}
