//! OSC datagram decoding
//!
//! Hand-written parser over the raw datagram, no intermediate allocation
//! beyond the decoded values themselves. Bundle elements are sliced out as
//! `Bytes` without being decoded; the scheduler decodes the one element it
//! routes and re-encodes nothing.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::time::timetag_to_unix;
use crate::types::{Arg, Bundle, Message, Packet};
use crate::{Result, BUNDLE_TAG, OSC_ALIGNMENT};

/// Decode a raw datagram into a packet
///
/// Dispatches on the leading bytes: `#bundle\0` means a bundle, anything
/// else is parsed as a message.
///
/// # Errors
///
/// Returns a `ProtocolError` describing the first malformed construct.
/// Never panics on arbitrary input.
pub fn decode(data: &[u8]) -> Result<Packet> {
    if data.is_empty() {
        return Err(ProtocolError::Empty);
    }

    if data.len() >= OSC_ALIGNMENT && data.starts_with(BUNDLE_TAG.as_bytes()) {
        decode_bundle(data).map(Packet::Bundle)
    } else {
        decode_message(data).map(Packet::Message)
    }
}

/// Decode a single message (also used for embedded bundle elements)
///
/// # Errors
///
/// Returns a `ProtocolError` if the address, type tags, or any argument
/// is malformed or truncated.
pub fn decode_message(data: &[u8]) -> Result<Message> {
    let mut r = Reader::new(data);

    let address = r.read_padded_str()?.to_string();
    if !address.starts_with('/') {
        return Err(ProtocolError::InvalidAddress(address));
    }

    // A bare address with no type tag string is a legal zero-arg message.
    if r.remaining() == 0 {
        return Ok(Message {
            address,
            args: Vec::new(),
        });
    }

    let tags = r.read_padded_str()?;
    if !tags.starts_with(',') {
        return Err(ProtocolError::InvalidTypeTags(tags.to_string()));
    }

    let tags = tags[1..].to_string();
    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        args.push(r.read_arg(tag)?);
    }

    Ok(Message { address, args })
}

/// Decode a bundle: `#bundle\0`, 64-bit timetag, size-prefixed elements
fn decode_bundle(data: &[u8]) -> Result<Bundle> {
    let mut r = Reader::new(data);

    // Consume the "#bundle" identifier (padded like any OSC string).
    r.read_padded_str()?;

    let time = timetag_to_unix(r.read_u64()?);

    let mut elements = Vec::new();
    while r.remaining() > 0 {
        let size = r.read_i32()?;
        if size < 0 {
            return Err(ProtocolError::InvalidElementSize { size });
        }
        let bytes = r.read_bytes(size as usize)?;
        elements.push(Bytes::copy_from_slice(bytes));
    }

    Ok(Bundle { time, elements })
}

/// Position-tracking reader over a datagram
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ProtocolError::truncated(n, self.remaining()));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_i32(&mut self) -> Result<i32> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_f32(&mut self) -> Result<f32> {
        let b = self.read_bytes(4)?;
        Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let b = self.read_bytes(8)?;
        Ok(f64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let b = self.read_bytes(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read a NUL-terminated string and skip its 4-byte padding
    fn read_padded_str(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let nul = self.buf[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::UnterminatedString { offset: start })?;

        let s = std::str::from_utf8(&self.buf[start..start + nul])?;

        // String occupies its bytes plus the NUL, rounded up to alignment.
        let padded = (nul + OSC_ALIGNMENT) & !(OSC_ALIGNMENT - 1);
        if self.remaining() < padded {
            return Err(ProtocolError::truncated(padded, self.remaining()));
        }
        self.pos = start + padded;
        Ok(s)
    }

    /// Read one argument value for the given type tag
    fn read_arg(&mut self, tag: char) -> Result<Arg> {
        match tag {
            'i' => Ok(Arg::Int(self.read_i32()?)),
            'f' => Ok(Arg::Float(self.read_f32()?)),
            's' => Ok(Arg::Str(self.read_padded_str()?.to_string())),
            'b' => {
                let size = self.read_i32()?;
                if size < 0 {
                    return Err(ProtocolError::InvalidElementSize { size });
                }
                let bytes = Bytes::copy_from_slice(self.read_bytes(size as usize)?);
                // Blobs pad to alignment like strings, but with no terminator.
                let pad = (OSC_ALIGNMENT - (size as usize % OSC_ALIGNMENT)) % OSC_ALIGNMENT;
                self.read_bytes(pad.min(self.remaining()))?;
                Ok(Arg::Blob(bytes))
            }
            'd' => Ok(Arg::Double(self.read_f64()?)),
            'h' => Ok(Arg::Long(self.read_i64()?)),
            other => Err(ProtocolError::UnsupportedType(other)),
        }
    }
}
