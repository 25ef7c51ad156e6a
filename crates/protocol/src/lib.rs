//! OSC wire codec for cued
//!
//! This crate provides the types that flow through the scheduler:
//! - `Packet` - decoded datagram, either a timed `Bundle` or a `Message`
//! - `Message` - an address string plus typed arguments
//! - `Arg` - OSC 1.0 argument values (plus the common `d`/`h` extensions)
//!
//! # Design Principles
//!
//! - **Total decoding**: `decode` returns a typed `ProtocolError` for any
//!   malformed input and never panics, so listening loops can log and move on
//! - **Elements stay encoded**: bundle elements are kept as raw `Bytes` and
//!   only decoded when a consumer needs them - the scheduler re-transmits
//!   most payloads verbatim
//!
//! # Wire Format
//!
//! OSC 1.0 binary format: NUL-terminated strings padded to 4-byte
//! boundaries, a `,`-prefixed type tag string, big-endian numerics, and
//! length-prefixed blobs. Bundles are `#bundle\0` followed by a 64-bit NTP
//! timetag and size-prefixed encoded elements.

mod decode;
mod encode;
mod error;
mod time;
mod types;

pub use decode::{decode, decode_message};
pub use encode::{encode, encode_bundle};
pub use error::ProtocolError;
pub use time::{now_unix, timetag_to_unix, unix_to_timetag, TIMETAG_IMMEDIATE};
pub use types::{Arg, Bundle, Message, Packet};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// OSC alignment boundary in bytes
pub const OSC_ALIGNMENT: usize = 4;

/// Identifier string opening every encoded bundle (before padding)
pub const BUNDLE_TAG: &str = "#bundle";
