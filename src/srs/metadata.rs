//! SRS metadata extractor: walks the EBML tree for `FileData` and
//! `TrackData` records, falling back to a bounded byte scan for legacy
//! files that don't nest them inside a proper `ReSample` container.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::ebml::element::{self, EbmlElement, ElementIterator};
use crate::ebml::varint::{self, ElementId, Size};
use crate::error::{Context, Error, Result};
use crate::read::{read_u16, read_u32, read_u64, read_u8, read_utf8, read_vec};

const FALLBACK_SCAN_LIMIT: u64 = 1024 * 1024;

fn file_data_id() -> ElementId {
    ElementId::from_u32(0x6A75)
}

fn track_data_id() -> ElementId {
    ElementId::from_u32(0x6B75)
}

fn legacy_container_id() -> ElementId {
    ElementId::from_u32(0xC0)
}

fn legacy_file_data_id() -> ElementId {
    ElementId::from_u32(0xC1)
}

fn legacy_track_data_id() -> ElementId {
    ElementId::from_u32(0xC2)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    pub flags: u16,
    pub app_name: String,
    pub sample_name: String,
    pub original_size: u64,
    pub crc32: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackData {
    pub flags: u16,
    pub track_number: u64,
    pub data_length: u64,
    pub match_offset: u64,
    pub signature: Vec<u8>,
}

fn read_length_prefixed_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_u16(reader)? as usize;
    Ok(read_utf8(reader, len)?)
}

fn parse_file_data<R: Read>(reader: &mut R) -> Result<FileData> {
    let flags = read_u16(reader)?;
    let app_name = read_length_prefixed_string(reader)?;
    let sample_name = read_length_prefixed_string(reader)?;
    let original_size = read_u64(reader)?;
    let crc32 = read_u32(reader)?;
    Ok(FileData {
        flags,
        app_name,
        sample_name,
        original_size,
        crc32,
    })
}

fn parse_track_data<R: Read + Seek>(reader: &mut R, data_end: u64) -> Result<TrackData> {
    let flags = read_u16(reader)?;
    let track_number = if flags & 0x08 != 0 {
        read_u32(reader)? as u64
    } else {
        read_u16(reader)? as u64
    };
    let data_length = if flags & 0x04 != 0 {
        read_u64(reader)?
    } else {
        read_u32(reader)? as u64
    };
    let match_offset = read_u64(reader)?;
    let signature_length = read_u16(reader)? as u64;

    let position = reader.stream_position()?;
    let available = data_end.saturating_sub(position);
    let signature_length = signature_length.min(available) as usize;
    let signature = read_vec(reader, signature_length)?;

    Ok(TrackData {
        flags,
        track_number,
        data_length,
        match_offset,
        signature,
    })
}

fn collect_children<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
) -> Result<Vec<EbmlElement>> {
    let mut out = Vec::new();
    for element in ElementIterator::new(reader, start, end) {
        out.push(element?);
    }
    Ok(out)
}

fn walk<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
    depth: u32,
    file_data: &mut Option<FileData>,
    tracks: &mut Vec<TrackData>,
) -> Result<()> {
    if depth > element::MAX_DEPTH {
        return Ok(());
    }

    for child in collect_children(reader, start, end)? {
        let child_end = child.data_end(end);
        if child.id == file_data_id() {
            reader.seek(SeekFrom::Start(child.data_position))?;
            *file_data = Some(parse_file_data(reader)?);
        } else if child.id == track_data_id() {
            reader.seek(SeekFrom::Start(child.data_position))?;
            tracks.push(parse_track_data(reader, child_end)?);
        } else if element::is_container(&child.id) {
            walk(reader, child.data_position, child_end, depth + 1, file_data, tracks)?;
        }
    }
    Ok(())
}

/// Byte-wise search for a legacy `0xC0` container in the first
/// [`FALLBACK_SCAN_LIMIT`] bytes, descending into `0xC1`/`0xC2` children.
/// Only consulted when the structured walk finds neither record.
fn fallback_scan<R: Read + Seek>(
    reader: &mut R,
    len: u64,
) -> Result<(Option<FileData>, Vec<TrackData>)> {
    let scan_limit = len.min(FALLBACK_SCAN_LIMIT);
    let mut file_data = None;
    let mut tracks = Vec::new();
    let mut position = 0u64;

    while position < scan_limit {
        reader.seek(SeekFrom::Start(position))?;
        let marker = match read_u8(reader) {
            Ok(b) => b,
            Err(_) => break,
        };

        if marker == legacy_container_id().as_bytes()[0] {
            if let Ok((size, _)) = varint::read_size(reader) {
                if let Size::Known(n) = size {
                    if let Ok(data_position) = reader.stream_position() {
                        let data_end = data_position.saturating_add(n).min(len);
                        if let Ok(children) = collect_children(reader, data_position, data_end) {
                            for child in children {
                                let child_end = child.data_end(data_end);
                                if child.id == legacy_file_data_id() {
                                    reader.seek(SeekFrom::Start(child.data_position))?;
                                    if let Ok(fd) = parse_file_data(reader) {
                                        file_data = Some(fd);
                                    }
                                } else if child.id == legacy_track_data_id() {
                                    reader.seek(SeekFrom::Start(child.data_position))?;
                                    if let Ok(td) = parse_track_data(reader, child_end) {
                                        tracks.push(td);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        position += 1;
    }

    Ok((file_data, tracks))
}

/// Parse an SRS file's `FileData` and `TrackData` records.
pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<(FileData, Vec<TrackData>)> {
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let mut file_data = None;
    let mut tracks = Vec::new();
    walk(reader, 0, len, 0, &mut file_data, &mut tracks)?;

    if file_data.is_none() && tracks.is_empty() {
        let (fallback_file_data, fallback_tracks) = fallback_scan(reader, len)?;
        file_data = fallback_file_data;
        tracks = fallback_tracks;
    }

    let file_data = file_data.ok_or(Error::EbmlMalformed {
        offset: 0,
        context: Context::None,
    })?;
    Ok((file_data, tracks))
}

/// Index `TrackData` records by track number for the extractor.
pub fn by_track_number(tracks: &[TrackData]) -> HashMap<u64, &TrackData> {
    tracks.iter().map(|t| (t.track_number, t)).collect()
}
