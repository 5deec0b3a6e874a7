//! RAR 3.x block bodies embedded in an SRR's block stream.
//!
//! These mirror the on-disk RAR headers this crate never decompresses: only
//! enough of each block is parsed to drive volume reconstruction (§4.8), the
//! rest is preserved in [`super::block::SrrBlock::raw_header`].

use std::io;

use crate::read::{read_const_bytes, read_u16, read_u32, read_u8, read_utf8};
use crate::time_conv;

flags! {
    /// [`RarPackedFile`] flags (shared bit layout with RAR's own FILE_HEAD).
    pub struct RarPackedFileFlags(u16) {
        pub is_large_file = 0x0100;
        pub has_salt = 0x0400;
        pub has_extended_time = 0x1000;
    }
}

flags! {
    /// [`RarArchiveEnd`] flags.
    pub struct RarArchiveEndFlags(u16) {
        pub has_next_volume = 0x0001;
        pub(self) has_crc32 = 0x0002;
        pub reserve_space = 0x0004;
        pub(self) has_volume_number = 0x0008;
    }
}

/// The fixed 7-byte RAR archive signature.
pub const RAR_MARKER_SIGNATURE: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];

#[derive(Debug, Clone)]
pub struct RarVolumeHeader {
    pub reserved1: u16,
    pub reserved2: u32,
}

impl RarVolumeHeader {
    pub(super) fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        Ok(RarVolumeHeader {
            reserved1: read_u16(reader)?,
            reserved2: read_u32(reader)?,
        })
    }
}

/// Timestamps decoded when [`RarPackedFileFlags::has_extended_time`] is set.
///
/// See RAR 3.x's EXT_TIME encoding: a 2-byte word holds four 4-bit
/// timestamp-presence nibbles (mtime, ctime, atime, archive time, from
/// high to low); each present timestamp optionally adds a second and a
/// sub-second increment of 0-3 bytes.
#[derive(Debug, Clone)]
pub struct ExtTime {
    pub modification_time: Result<time::PrimitiveDateTime, u32>,
    pub creation_time: Option<Result<time::PrimitiveDateTime, u32>>,
    pub access_time: Option<Result<time::PrimitiveDateTime, u32>>,
    pub archive_time: Option<Result<time::PrimitiveDateTime, u32>>,
}

struct TimeNibble(u8);

impl TimeNibble {
    fn exists(&self) -> bool {
        self.0 & 0x8 != 0
    }

    fn add_second(&self) -> bool {
        self.0 & 0x4 != 0
    }

    fn precision(&self) -> u8 {
        self.0 & 0x3
    }
}

fn nibble(all_flags: u16, index: u8) -> TimeNibble {
    TimeNibble(((all_flags >> (index * 4)) & 0xF) as u8)
}

fn read_nanos_increment<R: io::Read>(reader: &mut R, precision: u8) -> io::Result<u32> {
    let mut value: u32 = 0;
    for i in 0..precision {
        let byte = read_u8(reader)?;
        value |= (byte as u32) << (8 * i);
    }
    Ok(value << ((3 - precision) * 8))
}

fn apply_increment<R: io::Read>(
    mut t: time::PrimitiveDateTime,
    nibble: &TimeNibble,
    reader: &mut R,
) -> io::Result<time::PrimitiveDateTime> {
    if nibble.add_second() {
        t = t.saturating_add(time::Duration::SECOND);
    }
    let nanos = read_nanos_increment(reader, nibble.precision())? as i64 * 100;
    Ok(t.saturating_add(time::Duration::nanoseconds(nanos)))
}

fn read_optional_time<R: io::Read>(
    reader: &mut R,
    nibble: TimeNibble,
) -> io::Result<Option<Result<time::PrimitiveDateTime, u32>>> {
    if !nibble.exists() {
        return Ok(None);
    }
    let dos_time = read_u32(reader)?;
    Ok(Some(match time_conv::parse_dos_datetime(dos_time) {
        Ok(t) => Ok(apply_increment(t, &nibble, reader)?),
        Err(_) => Err(dos_time),
    }))
}

impl ExtTime {
    fn read<R: io::Read>(
        reader: &mut R,
        modification_time: Result<time::PrimitiveDateTime, u32>,
    ) -> io::Result<Self> {
        let all_flags = read_u16(reader)?;

        let mtime_nibble = nibble(all_flags, 3);
        let modification_time = if mtime_nibble.exists() {
            match modification_time {
                Ok(t) => Ok(apply_increment(t, &mtime_nibble, reader)?),
                err => err,
            }
        } else {
            modification_time
        };

        let creation_time = read_optional_time(reader, nibble(all_flags, 2))?;
        let access_time = read_optional_time(reader, nibble(all_flags, 1))?;
        let archive_time = read_optional_time(reader, nibble(all_flags, 0))?;

        Ok(ExtTime {
            modification_time,
            creation_time,
            access_time,
            archive_time,
        })
    }
}

/// The pivotal SRR record: a RAR FILE_HEAD whose packed payload is NOT
/// present in the SRR stream and must be sourced from the original file.
#[derive(Debug, Clone)]
pub struct RarPackedFile {
    pub flags: RarPackedFileFlags,
    pub packed_size: u64,
    pub unpacked_size: u64,
    pub host_os: u8,
    pub file_crc: u32,
    pub modification_time: Result<time::PrimitiveDateTime, u32>,
    pub creation_time: Option<Result<time::PrimitiveDateTime, u32>>,
    pub access_time: Option<Result<time::PrimitiveDateTime, u32>>,
    pub archive_time: Option<Result<time::PrimitiveDateTime, u32>>,
    pub rar_version: u8,
    pub method: u8,
    pub attrs: u32,
    pub file_name: String,
    pub salt: Option<[u8; 8]>,
}

impl RarPackedFile {
    pub(super) fn read<R: io::Read>(reader: &mut R, head_flags: u16) -> io::Result<Self> {
        let flags = RarPackedFileFlags::new(head_flags);

        let low_packed_size = read_u32(reader)? as u64;
        let low_unpacked_size = read_u32(reader)? as u64;
        let host_os = read_u8(reader)?;
        let file_crc = read_u32(reader)?;
        let dos_time = read_u32(reader)?;
        let mut modification_time = time_conv::parse_dos_datetime(dos_time).map_err(|_| dos_time);
        let rar_version = read_u8(reader)?;
        let method = read_u8(reader)?;
        let name_size = read_u16(reader)? as usize;
        let attrs = read_u32(reader)?;

        // Per documented RAR 3.x layout: high halves immediately follow the
        // 25-byte prefix, ahead of the name, salt, and extended-time fields.
        let (packed_size, unpacked_size) = if flags.is_large_file() {
            let high_packed_size = read_u32(reader)? as u64;
            let high_unpacked_size = read_u32(reader)? as u64;
            (
                (high_packed_size << 32) | low_packed_size,
                (high_unpacked_size << 32) | low_unpacked_size,
            )
        } else {
            (low_packed_size, low_unpacked_size)
        };

        let file_name = read_utf8(reader, name_size)?;

        let salt = if flags.has_salt() {
            Some(read_const_bytes(reader)?)
        } else {
            None
        };

        let mut creation_time = None;
        let mut access_time = None;
        let mut archive_time = None;

        if flags.has_extended_time() {
            let ext = ExtTime::read(reader, modification_time)?;
            modification_time = ext.modification_time;
            creation_time = ext.creation_time;
            access_time = ext.access_time;
            archive_time = ext.archive_time;
        }

        Ok(RarPackedFile {
            flags,
            packed_size,
            unpacked_size,
            host_os,
            file_crc,
            modification_time,
            creation_time,
            access_time,
            archive_time,
            rar_version,
            method,
            attrs,
            file_name,
            salt,
        })
    }
}

/// A RAR "new-style" service sub-block (`RR`, `CMT`, `AV`, …), preserved
/// verbatim. Structurally the same 25-byte prefix as [`RarPackedFile`], but
/// without the LARGE_FILE/SALT/EXT_TIME extensions.
#[derive(Debug, Clone)]
pub struct RarNewSub {
    pub packed_size: u32,
    pub unpacked_size: u32,
    pub host_os: u8,
    pub file_crc: u32,
    pub file_datetime: u32,
    pub rar_version: u8,
    pub method: u8,
    pub attrs: u32,
    pub sub_type: String,
}

impl RarNewSub {
    pub(super) fn read<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let packed_size = read_u32(reader)?;
        let unpacked_size = read_u32(reader)?;
        let host_os = read_u8(reader)?;
        let file_crc = read_u32(reader)?;
        let file_datetime = read_u32(reader)?;
        let rar_version = read_u8(reader)?;
        let method = read_u8(reader)?;
        let name_size = read_u16(reader)? as usize;
        let attrs = read_u32(reader)?;
        let sub_type = read_utf8(reader, name_size)?;

        Ok(RarNewSub {
            packed_size,
            unpacked_size,
            host_os,
            file_crc,
            file_datetime,
            rar_version,
            method,
            attrs,
            sub_type,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RarArchiveEnd {
    pub flags: RarArchiveEndFlags,
    pub archive_data_crc32: Option<u32>,
    pub volume_number: Option<u16>,
}

impl RarArchiveEnd {
    pub(super) fn read<R: io::Read>(reader: &mut R, head_flags: u16) -> io::Result<Self> {
        let flags = RarArchiveEndFlags::new(head_flags);

        let archive_data_crc32 = if flags.has_crc32() {
            Some(read_u32(reader)?)
        } else {
            None
        };
        let volume_number = if flags.has_volume_number() {
            Some(read_u16(reader)?)
        } else {
            None
        };

        Ok(RarArchiveEnd {
            flags,
            archive_data_crc32,
            volume_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn archive_end_decodes_crc_and_volume_number() {
        let body = [0xBE, 0xBA, 0xFE, 0xCA, 0x05, 0x00];
        let mut cursor = Cursor::new(body);
        let end = RarArchiveEnd::read(&mut cursor, 0x000B).unwrap();
        assert_eq!(end.archive_data_crc32, Some(0xCAFE_BABE));
        assert_eq!(end.volume_number, Some(5));
        assert!(end.flags.has_next_volume());
        assert!(!end.flags.reserve_space());
    }

    #[test]
    fn large_file_combines_high_and_low_halves() {
        let mut body = Vec::new();
        body.extend_from_slice(&0x10000000u32.to_le_bytes()); // low_packed
        body.extend_from_slice(&0u32.to_le_bytes()); // low_unpacked
        body.push(3); // host_os
        body.extend_from_slice(&0u32.to_le_bytes()); // file_crc
        body.extend_from_slice(&0u32.to_le_bytes()); // dos time
        body.push(29); // rar_version
        body.push(0x30); // method
        body.extend_from_slice(&0u16.to_le_bytes()); // name_size = 0
        body.extend_from_slice(&0u32.to_le_bytes()); // attrs
        body.extend_from_slice(&1u32.to_le_bytes()); // high_packed
        body.extend_from_slice(&0u32.to_le_bytes()); // high_unpacked

        let mut cursor = Cursor::new(body);
        let file = RarPackedFile::read(&mut cursor, 0x0100).unwrap();
        assert_eq!(file.packed_size, 4_563_402_752);
    }
}
