//! Block / SimpleBlock header decoding, including the four lacing modes
//! Matroska supports for packing several frames into one block.

use std::io;

use crate::ebml::varint;
use crate::error::{Context, Error};
use crate::read::{read_i16_be, read_u8};

/// Which lacing scheme packs frames into this block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lacing {
    None,
    Xiph,
    Fixed,
    Ebml,
}

impl Lacing {
    fn from_flags(flags: u8) -> Self {
        match (flags >> 1) & 0x03 {
            0 => Lacing::None,
            1 => Lacing::Xiph,
            2 => Lacing::Fixed,
            3 => Lacing::Ebml,
            _ => unreachable!("2-bit field"),
        }
    }
}

/// A decoded Block/SimpleBlock header: which track it belongs to, and the
/// byte offset/size of each laced frame relative to the start of the
/// element's payload.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub track_number: u64,
    pub timecode: i16,
    pub flags: u8,
    pub lacing: Lacing,
    /// Byte offset of each frame's data from the start of the element
    /// payload (i.e. right after the element's own ID+size header).
    pub frame_offsets: Vec<u64>,
    pub frame_sizes: Vec<u64>,
    /// Total bytes consumed by the laced header itself (track number +
    /// timecode + flags + any lacing tables), i.e. the offset at which
    /// `frame_offsets[0]` starts.
    pub header_length: u64,
}

/// Decode a Block/SimpleBlock header from `reader`, which must be
/// positioned at the start of the element's payload. `element_size` is the
/// element's total payload size in bytes (used to derive the last frame's
/// size and, for fixed lacing, every frame's size).
pub fn decode<R: io::Read>(
    reader: &mut R,
    element_size: u64,
    offset: u64,
) -> Result<BlockHeader, Error> {
    let (track_size, track_width) = varint::read_size(reader)?;
    let track_number = track_size.known().ok_or_else(|| Error::EbmlMalformed {
        offset,
        context: Context::None,
    })?;

    let timecode = read_i16_be(reader)?;
    let flags = read_u8(reader)?;
    let lacing = Lacing::from_flags(flags);

    let mut consumed = track_width as u64 + 2 + 1;

    if lacing == Lacing::None {
        let frame_size = element_size.checked_sub(consumed).ok_or(Error::EbmlMalformed {
            offset,
            context: Context::None,
        })?;
        return Ok(BlockHeader {
            track_number,
            timecode,
            flags,
            lacing,
            frame_offsets: vec![consumed],
            frame_sizes: vec![frame_size],
            header_length: consumed,
        });
    }

    let frame_count = read_u8(reader)? as usize + 1;
    consumed += 1;

    let mut sizes = Vec::with_capacity(frame_count);

    match lacing {
        Lacing::Xiph => {
            for _ in 0..frame_count - 1 {
                let mut size: u64 = 0;
                loop {
                    let b = read_u8(reader)?;
                    consumed += 1;
                    size += b as u64;
                    if b != 0xFF {
                        break;
                    }
                }
                sizes.push(size);
            }
        }
        Lacing::Ebml => {
            let (first_size, first_width) = varint::read_size(reader)?;
            let first_size = first_size.known().ok_or(Error::EbmlMalformed {
                offset,
                context: Context::None,
            })?;
            consumed += first_width as u64;
            sizes.push(first_size);

            for _ in 1..frame_count - 1 {
                let (delta, delta_width) = varint::read_signed(reader)?;
                consumed += delta_width as u64;
                let previous = *sizes.last().unwrap() as i64;
                let next = previous + delta;
                if next < 0 {
                    return Err(Error::EbmlMalformed {
                        offset,
                        context: Context::None,
                    });
                }
                sizes.push(next as u64);
            }
        }
        Lacing::Fixed => {
            // no per-size bytes; computed once `consumed` is final, below.
        }
        Lacing::None => unreachable!("handled above"),
    }

    if lacing == Lacing::Fixed {
        let remaining = element_size.checked_sub(consumed).ok_or(Error::EbmlMalformed {
            offset,
            context: Context::None,
        })?;
        if remaining % frame_count as u64 != 0 {
            return Err(Error::EbmlMalformed {
                offset,
                context: Context::None,
            });
        }
        let frame_size = remaining / frame_count as u64;
        sizes = vec![frame_size; frame_count - 1];
    }

    let sum_known: u64 = sizes.iter().sum();
    let remaining_total = element_size.checked_sub(consumed).ok_or(Error::EbmlMalformed {
        offset,
        context: Context::None,
    })?;
    let last_size = remaining_total
        .checked_sub(sum_known)
        .ok_or(Error::EbmlMalformed {
            offset,
            context: Context::None,
        })?;
    sizes.push(last_size);

    let header_length = consumed;
    let mut frame_offsets = Vec::with_capacity(frame_count);
    let mut cursor = header_length;
    for size in &sizes {
        frame_offsets.push(cursor);
        cursor += size;
    }

    Ok(BlockHeader {
        track_number,
        timecode,
        flags,
        lacing,
        frame_offsets,
        frame_sizes: sizes,
        header_length,
    })
}
