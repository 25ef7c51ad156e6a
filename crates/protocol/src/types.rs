//! Decoded OSC value types
//!
//! `Packet` is what `decode` produces from a raw datagram. Bundle elements
//! are kept as encoded `Bytes`; callers decode them on demand with
//! `decode_message`.

use std::fmt;

use bytes::Bytes;

/// A single typed OSC argument
///
/// Covers the OSC 1.0 core types (`i`, `f`, `s`, `b`) plus the widely used
/// 64-bit extensions (`d`, `h`).
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// 32-bit signed integer (`i`)
    Int(i32),
    /// 32-bit float (`f`)
    Float(f32),
    /// String (`s`)
    Str(String),
    /// Blob - length-prefixed opaque bytes (`b`)
    Blob(Bytes),
    /// 64-bit float (`d`)
    Double(f64),
    /// 64-bit signed integer (`h`)
    Long(i64),
}

impl Arg {
    /// The OSC type tag character for this argument
    pub fn type_tag(&self) -> char {
        match self {
            Self::Int(_) => 'i',
            Self::Float(_) => 'f',
            Self::Str(_) => 's',
            Self::Blob(_) => 'b',
            Self::Double(_) => 'd',
            Self::Long(_) => 'h',
        }
    }

    /// Borrow the string value, if this argument is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Widen to i64, if this argument is an integer type
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{:?}", v),
            Self::Blob(v) => write!(f, "blob[{}]", v.len()),
            Self::Double(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
        }
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// A decoded OSC message: address plus ordered arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Address pattern, always starting with `/`
    pub address: String,
    /// Ordered arguments
    pub args: Vec<Arg>,
}

impl Message {
    /// Create a message with no arguments
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument (builder style)
    #[must_use]
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// A decoded OSC bundle: absolute time plus still-encoded elements
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    /// Absolute delivery time in unix seconds; 0.0 means "immediately"
    pub time: f64,
    /// Encoded elements in wire order
    pub elements: Vec<Bytes>,
}

/// A decoded datagram
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Time-stamped container of encoded elements
    Bundle(Bundle),
    /// A plain message
    Message(Message),
}
