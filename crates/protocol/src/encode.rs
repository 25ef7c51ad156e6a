//! OSC datagram encoding
//!
//! Builds wire-format bytes from `Message` values. Encoding is total: any
//! `Message` produces a valid datagram, so these functions return plain
//! `Bytes` rather than a `Result`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::time::unix_to_timetag;
use crate::types::{Arg, Message};
use crate::{BUNDLE_TAG, OSC_ALIGNMENT};

/// Encode a message to wire format
pub fn encode(msg: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);

    put_padded_str(&mut buf, &msg.address);

    let mut tags = String::with_capacity(msg.args.len() + 1);
    tags.push(',');
    for arg in &msg.args {
        tags.push(arg.type_tag());
    }
    put_padded_str(&mut buf, &tags);

    for arg in &msg.args {
        put_arg(&mut buf, arg);
    }

    buf.freeze()
}

/// Encode a bundle from already-encoded elements
///
/// `time` is absolute unix seconds; non-positive times encode as the
/// immediate timetag.
pub fn encode_bundle(time: f64, elements: &[Bytes]) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + elements.iter().map(|e| e.len() + 4).sum::<usize>());

    put_padded_str(&mut buf, BUNDLE_TAG);
    buf.put_u64(unix_to_timetag(time));

    for element in elements {
        buf.put_i32(element.len() as i32);
        buf.put_slice(element);
    }

    buf.freeze()
}

/// Write a string with NUL terminator, padded to alignment
fn put_padded_str(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    let padded = (s.len() + OSC_ALIGNMENT) & !(OSC_ALIGNMENT - 1);
    for _ in s.len()..padded {
        buf.put_u8(0);
    }
}

/// Write one argument value
fn put_arg(buf: &mut BytesMut, arg: &Arg) {
    match arg {
        Arg::Int(v) => buf.put_i32(*v),
        Arg::Float(v) => buf.put_f32(*v),
        Arg::Str(v) => put_padded_str(buf, v),
        Arg::Blob(v) => {
            buf.put_i32(v.len() as i32);
            buf.put_slice(v);
            let pad = (OSC_ALIGNMENT - (v.len() % OSC_ALIGNMENT)) % OSC_ALIGNMENT;
            for _ in 0..pad {
                buf.put_u8(0);
            }
        }
        Arg::Double(v) => buf.put_f64(*v),
        Arg::Long(v) => buf.put_i64(*v),
    }
}
