//! Extracted fields and the packed signed integer encoding used by the binary sink.

use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Longest packed encoding of an `i64`: ten 7-bit groups.
pub const MAX_PACKED_LEN: usize = 10;

/// One field extracted during a query, in order of occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Byte range of the source; `offset` is read through `mask` like the source itself.
    Bytes { offset: usize, len: usize, mask: usize },
    /// Parsed number. `digits` counts the digits seen, so `.05` keeps its leading zero.
    Number {
        negative: bool,
        magnitude: u64,
        base: u8,
        digits: u8,
    },
}

impl Capture {
    /// Signed value of a number capture. Magnitudes past `i64::MAX` wrap.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Capture::Number {
                negative,
                magnitude,
                ..
            } => {
                let m = magnitude as i64;
                Some(if negative { m.wrapping_neg() } else { m })
            }
            Capture::Bytes { .. } => None,
        }
    }

    /// Signed value of a number capture, `None` when it does not fit an `i64`.
    pub fn checked_i64(&self) -> Option<i64> {
        match *self {
            Capture::Number {
                negative,
                magnitude,
                ..
            } => {
                let m = i128::from(magnitude);
                i64::try_from(if negative { -m } else { m }).ok()
            }
            Capture::Bytes { .. } => None,
        }
    }

    /// Upper 32 bits of a number's magnitude.
    pub fn high(&self) -> Option<u32> {
        match self {
            Capture::Number { magnitude, .. } => Some((magnitude >> 32) as u32),
            Capture::Bytes { .. } => None,
        }
    }

    /// Lower 32 bits of a number's magnitude.
    pub fn low(&self) -> Option<u32> {
        match self {
            Capture::Number { magnitude, .. } => Some(*magnitude as u32),
            Capture::Bytes { .. } => None,
        }
    }

    /// `-1` or `1` for numbers.
    pub fn sign(&self) -> Option<i32> {
        match self {
            Capture::Number { negative, .. } => Some(if *negative { -1 } else { 1 }),
            Capture::Bytes { .. } => None,
        }
    }

    /// `base << 16 | digits` for numbers.
    pub fn meta(&self) -> Option<u32> {
        match self {
            Capture::Number { base, digits, .. } => Some((*base as u32) << 16 | *digits as u32),
            Capture::Bytes { .. } => None,
        }
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, Capture::Bytes { .. })
    }
}

/// Number of 7-bit groups needed to hold `value` with its sign.
fn packed_groups(value: i64) -> usize {
    (1..MAX_PACKED_LEN)
        .find(|&n| {
            let half = 1i64 << (7 * n - 1);
            (-half..half).contains(&value)
        })
        .unwrap_or(MAX_PACKED_LEN)
}

/// Write `value` as big-endian 7-bit groups; the final byte carries the 0x80 stop bit and
/// bit 6 of the first byte carries the sign.
pub fn write_packed_i64<W: Write>(w: &mut W, value: i64) -> io::Result<usize> {
    let groups = packed_groups(value);
    for g in (0..groups).rev() {
        let shift = (7 * g).min(63) as u32;
        let mut byte = ((value >> shift) & 0x7F) as u8;
        if g == 0 {
            byte |= 0x80;
        }
        w.write_u8(byte)?;
    }
    Ok(groups)
}

pub fn read_packed_i64<R: Read>(r: &mut R) -> io::Result<i64> {
    let first = r.read_u8()?;
    let mut value: i64 = if first & 0x40 != 0 { -1 } else { 0 };
    let mut byte = first;
    for _ in 0..MAX_PACKED_LEN {
        value = (value << 7) | (byte & 0x7F) as i64;
        if byte & 0x80 != 0 {
            return Ok(value);
        }
        byte = r.read_u8()?;
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "packed integer longer than 10 bytes",
    ))
}
