//! NTP timetag conversion
//!
//! OSC bundles carry 64-bit NTP timetags: seconds since 1900-01-01 in the
//! high word, 1/2^32 fractional seconds in the low word. The scheduler works
//! in unix seconds as `f64`, so conversions live here.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the unix epoch (1970)
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// The reserved "execute immediately" timetag
pub const TIMETAG_IMMEDIATE: u64 = 1;

/// Convert an NTP timetag to unix seconds
///
/// The immediate timetag decodes to 0.0, which schedulers treat as
/// "deliver now". Timetags before the unix epoch clamp to 0.0.
pub fn timetag_to_unix(tag: u64) -> f64 {
    if tag == TIMETAG_IMMEDIATE {
        return 0.0;
    }

    let secs = tag >> 32;
    if secs < NTP_UNIX_OFFSET {
        return 0.0;
    }

    let frac = (tag & 0xFFFF_FFFF) as f64 / (1u64 << 32) as f64;
    (secs - NTP_UNIX_OFFSET) as f64 + frac
}

/// Convert unix seconds to an NTP timetag
///
/// Non-positive times encode as the immediate timetag.
pub fn unix_to_timetag(unix_secs: f64) -> u64 {
    if unix_secs <= 0.0 {
        return TIMETAG_IMMEDIATE;
    }

    let secs = unix_secs.trunc() as u64 + NTP_UNIX_OFFSET;
    let frac = (unix_secs.fract() * (1u64 << 32) as f64).round() as u64;
    (secs << 32) | (frac & 0xFFFF_FFFF)
}

/// Current wall-clock time in unix seconds
pub fn now_unix() -> f64 {
    // System clock before 1970 would be a host misconfiguration; treat as 0.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
