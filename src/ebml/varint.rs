//! EBML variable-length integer codec.
//!
//! An EBML VarInt is a self-delimiting big-endian integer: the number of
//! leading zero bits in the first byte (before the first set "marker" bit)
//! gives the total width in bytes. A **size** VarInt strips the marker bit
//! before interpreting the remaining bits as the value; an **element ID**
//! keeps the marker bit, since the raw byte sequence (with its marker) is
//! the canonical identity compared against known element IDs.

use std::io;

use crate::read::{read_u8, read_vec};

/// Maximum VarInt width this crate decodes. EBML IDs are at most 4 bytes
/// wide in Matroska; sizes can be up to 8.
pub const MAX_WIDTH: u8 = 8;

/// Identity of an EBML element: the raw marker-bit-included byte sequence.
///
/// Comparisons and hashing use the raw bytes directly, matching the spec's
/// instruction to never strip the marker bit from an element ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(Vec<u8>);

impl ElementId {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Build an `ElementId` from its canonical hex form, e.g. the Segment ID
    /// `0x1853_8067`. The number of significant bytes (ignoring leading
    /// zero bytes) determines the width.
    pub fn from_u32(value: u32) -> Self {
        let bytes = value.to_be_bytes();
        let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(3);
        ElementId(bytes[first_nonzero..].to_vec())
    }
}

/// Result of decoding a size VarInt: either a known value or the
/// "unknown size" sentinel (all value-bits set), which means "read until
/// the end of the enclosing element/stream".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Known(u64),
    Unknown,
}

impl Size {
    pub fn known(self) -> Option<u64> {
        match self {
            Size::Known(n) => Some(n),
            Size::Unknown => None,
        }
    }
}

/// Width in bytes of a VarInt given its first byte, or `None` if the byte
/// has no marker bit set (all-zero first byte, which is invalid).
fn width_from_first_byte(first_byte: u8) -> Option<u8> {
    for w in 1..=MAX_WIDTH {
        let mask = 0x80u8.checked_shr((w - 1) as u32).unwrap_or(0);
        if first_byte & mask != 0 {
            return Some(w);
        }
    }
    None
}

/// Read a raw VarInt: returns the marker-bit-included byte sequence and its
/// width. Used directly for element IDs.
pub fn read_raw<R: io::Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let first_byte = read_u8(reader)?;
    let width = width_from_first_byte(first_byte).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            "VarInt first byte has no marker bit set",
        )
    })?;

    let mut bytes = Vec::with_capacity(width as usize);
    bytes.push(first_byte);
    if width > 1 {
        bytes.extend(read_vec(reader, (width - 1) as usize)?);
    }
    Ok(bytes)
}

/// Read an element ID VarInt: the raw bytes, marker bit included.
pub fn read_element_id<R: io::Read>(reader: &mut R) -> io::Result<ElementId> {
    Ok(ElementId(read_raw(reader)?))
}

/// Interpret the raw bytes of a size VarInt (marker bit included, as
/// returned by [`read_raw`]): strip the marker and detect the "unknown
/// size" all-ones sentinel.
pub fn interpret_size_bytes(raw: &[u8]) -> Size {
    let width = raw.len() as u8;
    let mask = 0xFFu8 >> width;

    let mut value: u64 = (raw[0] & mask) as u64;
    for &b in &raw[1..] {
        value = (value << 8) | b as u64;
    }

    let max = (1u64 << (7 * width)) - 1;
    if value == max {
        Size::Unknown
    } else {
        Size::Known(value)
    }
}

/// Read a size VarInt: the marker bit is stripped and the remaining bits
/// form a big-endian unsigned integer. A value of `2^(7*width) - 1` (all
/// value-bits set) denotes "unknown size".
pub fn read_size<R: io::Read>(reader: &mut R) -> io::Result<(Size, u8)> {
    let raw = read_raw(reader)?;
    let width = raw.len() as u8;
    Ok((interpret_size_bytes(&raw), width))
}

/// Read a size VarInt and also return its raw, marker-included bytes
/// exactly as they appeared on the wire (used where a caller must
/// re-emit an element header byte-for-byte, e.g. the sample rebuilder).
pub fn read_size_raw<R: io::Read>(reader: &mut R) -> io::Result<(Size, Vec<u8>)> {
    let raw = read_raw(reader)?;
    let size = interpret_size_bytes(&raw);
    Ok((size, raw))
}

/// Read a size VarInt and decode it as a *signed* delta, as used by EBML
/// lacing (§4.4): the unsigned value is re-centered around
/// `2^(7*width - 1) - 1`. Returns the delta and the VarInt's width in bytes.
pub fn read_signed<R: io::Read>(reader: &mut R) -> io::Result<(i64, u8)> {
    let (size, width) = read_size(reader)?;
    let value = match size {
        Size::Known(v) => v,
        // A signed VarInt's all-ones pattern is just the largest magnitude
        // negative delta representable at this width, not a sentinel.
        Size::Unknown => (1u64 << (7 * width)) - 1,
    };
    let bias = (1i64 << (7 * width - 1)) - 1;
    Ok((value as i64 - bias, width))
}

/// Encode `value` as a size VarInt of exactly `width` bytes.
///
/// # Panics
/// Panics if `value` does not fit in `7 * width` bits.
pub fn write_size(value: u64, width: u8) -> Vec<u8> {
    assert!(width >= 1 && width <= MAX_WIDTH);
    let max = (1u64 << (7 * width)) - 1;
    assert!(value <= max, "value does not fit in a width-{width} VarInt");

    let marker = 0x80u8.checked_shr((width - 1) as u32).unwrap_or(0);
    let mut bytes = value.to_be_bytes()[8 - width as usize..].to_vec();
    bytes[0] |= marker;
    bytes
}

/// Smallest width that can hold `value` as a size VarInt (leaving the
/// "unknown size" sentinel value unused).
pub fn min_width_for(value: u64) -> u8 {
    for w in 1..=MAX_WIDTH {
        let max = (1u64 << (7 * w)) - 1;
        if value < max {
            return w;
        }
    }
    MAX_WIDTH
}
