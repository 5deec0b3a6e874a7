//! SRR block parsing: the common 7-byte header shared by every block, and
//! the tagged union of block bodies that hang off it.

use std::io;

use crate::error::{Context, Error, Result};
use crate::read::{read_u16, read_u32, read_u8, read_utf8, read_vec};

use super::rar_blocks::{RarArchiveEnd, RarNewSub, RarPackedFile, RarVolumeHeader};

pub const SRR_HEADER: u8 = 0x69;
pub const SRR_STORED_FILE: u8 = 0x6A;
pub const SRR_OSO_HASH: u8 = 0x6B;
pub const SRR_PADDING: u8 = 0x6C;
pub const SRR_RAR_FILE: u8 = 0x71;
pub const RAR_MARKER: u8 = 0x72;
pub const RAR_VOLUME_HEADER: u8 = 0x73;
pub const RAR_PACKED_FILE: u8 = 0x74;
pub const RAR_OLD_STYLE_FIRST: u8 = 0x75;
pub const RAR_OLD_STYLE_LAST: u8 = 0x79;
pub const RAR_NEW_SUB: u8 = 0x7A;
pub const RAR_ARCHIVE_END: u8 = 0x7B;

/// `contains_data`/"add_size present" flag shared across block types.
const FLAG_ADD_SIZE: u16 = 0x8000;

/// Display-only name for a block type tag. A constant lookup rather than
/// module-mutable state (no registry to populate or race on).
pub const fn block_type_name(tag: u8) -> &'static str {
    match tag {
        SRR_HEADER => "SRR Header",
        SRR_STORED_FILE => "SRR Stored File",
        SRR_OSO_HASH => "SRR OSO Hash",
        SRR_PADDING => "SRR Padding",
        SRR_RAR_FILE => "SRR RAR File",
        RAR_MARKER => "RAR Marker",
        RAR_VOLUME_HEADER => "RAR Volume Header",
        RAR_PACKED_FILE => "RAR File",
        RAR_OLD_STYLE_FIRST..=RAR_OLD_STYLE_LAST => "RAR Old-Style Block",
        RAR_NEW_SUB => "RAR New Sub",
        RAR_ARCHIVE_END => "RAR Archive End",
        _ => "Unknown Block",
    }
}

#[derive(Debug, Clone)]
pub struct SrrHeader {
    pub app_name: Option<String>,
}

impl SrrHeader {
    fn read<R: io::Read>(reader: &mut R, head_flags: u16) -> io::Result<Self> {
        let app_name = if head_flags & 0x0001 != 0 {
            let len = read_u16(reader)? as usize;
            Some(read_utf8(reader, len)?)
        } else {
            None
        };
        Ok(SrrHeader { app_name })
    }
}

#[derive(Debug, Clone)]
pub struct SrrStoredFile {
    pub file_size: u32,
    pub file_name: String,
}

impl SrrStoredFile {
    fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let file_size = read_u32(reader)?;
        let name_len = read_u16(reader)? as usize;
        let file_name = read_utf8(reader, name_len)?;
        Ok(SrrStoredFile { file_size, file_name })
    }
}

#[derive(Debug, Clone)]
pub struct SrrRarFile {
    pub file_name: String,
}

impl SrrRarFile {
    fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let name_len = read_u16(reader)? as usize;
        let file_name = read_utf8(reader, name_len)?;
        Ok(SrrRarFile { file_name })
    }
}

/// Concrete block body. Every variant's bytes are also retained verbatim in
/// [`SrrBlock::raw_header`]; subtypes exist for inspection, never for
/// re-serialization.
#[derive(Debug, Clone)]
pub enum BlockKind {
    SrrHeader(SrrHeader),
    StoredFile(SrrStoredFile),
    RarFile(SrrRarFile),
    OsoHash,
    Padding,
    RarMarker,
    RarVolumeHeader(RarVolumeHeader),
    RarPackedFile(RarPackedFile),
    RarNewSub(RarNewSub),
    RarOldStyle,
    RarArchiveEnd(RarArchiveEnd),
    /// Block type this crate does not interpret. Preserved via the common
    /// header's `raw_header` bytes; never a fatal error.
    Unknown,
}

/// One record in an SRR's block stream.
#[derive(Debug, Clone)]
pub struct SrrBlock {
    pub position: u64,
    pub head_crc: u16,
    pub head_type: u8,
    pub head_flags: u16,
    pub head_size: u16,
    pub raw_header: Vec<u8>,
    pub add_size: Option<u32>,
    pub kind: BlockKind,
}

impl SrrBlock {
    /// Size of this block's data past its header: only a stored file's
    /// payload actually sits in the SRR stream, RarPackedFile/RarNewSub
    /// carry `add_size` as metadata about a payload this crate never holds.
    pub fn data_size(&self) -> u64 {
        match self.kind {
            BlockKind::StoredFile(_) => self.add_size.unwrap_or(0) as u64,
            _ => 0,
        }
    }

    /// Offset immediately past this block (header + [`Self::data_size`]),
    /// i.e. where the next block in the stream begins.
    pub fn end_position(&self) -> u64 {
        self.position + self.head_size as u64 + self.data_size()
    }

    pub fn read<R: io::Read + io::Seek>(reader: &mut R) -> Result<Self> {
        let position = reader.stream_position()?;

        let head_crc = read_u16(reader)?;
        let head_type = read_u8(reader)?;
        let head_flags = read_u16(reader)?;
        let head_size = read_u16(reader)?;

        if head_size < 7 {
            return Err(Error::TruncatedBlock {
                offset: position,
                head_size,
                context: Context::BlockType(head_type),
            });
        }

        let raw_header = read_vec(reader, (head_size - 7) as usize)?;

        let add_size = if matches!(head_type, RAR_PACKED_FILE | RAR_NEW_SUB)
            || head_flags & FLAG_ADD_SIZE != 0
        {
            raw_header
                .get(0..4)
                .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
        } else {
            None
        };

        let mut body = io::Cursor::new(&raw_header);
        let kind = parse_body(head_type, head_flags, &mut body).unwrap_or(BlockKind::Unknown);

        Ok(SrrBlock {
            position,
            head_crc,
            head_type,
            head_flags,
            head_size,
            raw_header,
            add_size,
            kind,
        })
    }
}

fn parse_body<R: io::Read>(head_type: u8, head_flags: u16, reader: &mut R) -> io::Result<BlockKind> {
    Ok(match head_type {
        SRR_HEADER => BlockKind::SrrHeader(SrrHeader::read(reader, head_flags)?),
        SRR_STORED_FILE => BlockKind::StoredFile(SrrStoredFile::read(reader)?),
        SRR_RAR_FILE => BlockKind::RarFile(SrrRarFile::read(reader)?),
        SRR_OSO_HASH => BlockKind::OsoHash,
        SRR_PADDING => BlockKind::Padding,
        RAR_MARKER => BlockKind::RarMarker,
        RAR_VOLUME_HEADER => BlockKind::RarVolumeHeader(RarVolumeHeader::read(reader)?),
        RAR_PACKED_FILE => BlockKind::RarPackedFile(RarPackedFile::read(reader, head_flags)?),
        RAR_NEW_SUB => BlockKind::RarNewSub(RarNewSub::read(reader)?),
        RAR_OLD_STYLE_FIRST..=RAR_OLD_STYLE_LAST => BlockKind::RarOldStyle,
        RAR_ARCHIVE_END => BlockKind::RarArchiveEnd(RarArchiveEnd::read(reader, head_flags)?),
        _ => BlockKind::Unknown,
    })
}
