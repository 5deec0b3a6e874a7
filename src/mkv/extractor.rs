//! MKV track-data extractor: pulls the frame bytes a set of `TrackData`
//! records point at out of the original source file.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::ebml::element::{self, EbmlElement, ElementIterator};
use crate::ebml::varint::Size;
use crate::error::Result;
use crate::mkv::block;
use crate::read::read_vec;
use crate::srs::metadata::{self, TrackData};

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

/// Extract, for each requested track, the prefix of its frame-data bytes
/// starting at (or after) `match_offset` up to `data_length` bytes.
pub fn extract_mkv_tracks<R: Read + Seek>(
    source: &mut R,
    tracks: &[TrackData],
) -> Result<HashMap<u64, Vec<u8>>> {
    let by_track = metadata::by_track_number(tracks);
    let mut outputs: HashMap<u64, Vec<u8>> =
        tracks.iter().map(|t| (t.track_number, Vec::new())).collect();

    let Some(min_match_offset) = tracks.iter().map(|t| t.match_offset).min() else {
        return Ok(outputs);
    };

    let len = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;

    walk_segment(source, 0, len, 0, min_match_offset, &by_track, &mut outputs)?;
    Ok(outputs)
}

fn all_quotas_filled(by_track: &HashMap<u64, &TrackData>, outputs: &HashMap<u64, Vec<u8>>) -> bool {
    by_track
        .values()
        .all(|t| outputs.get(&t.track_number).map_or(true, |v| v.len() as u64 >= t.data_length))
}

fn walk_segment<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
    depth: u32,
    min_match_offset: u64,
    by_track: &HashMap<u64, &TrackData>,
    outputs: &mut HashMap<u64, Vec<u8>>,
) -> Result<()> {
    if depth > element::MAX_DEPTH {
        return Ok(());
    }

    for child in collect_children(reader, start, end)? {
        if all_quotas_filled(by_track, outputs) {
            return Ok(());
        }

        let child_end = child.data_end(end);
        if child.id == element::CLUSTER() {
            if child_end < min_match_offset {
                continue;
            }
            descend_cluster(reader, child.data_position, child_end, by_track, outputs)?;
        } else if element::is_container(&child.id) {
            walk_segment(
                reader,
                child.data_position,
                child_end,
                depth + 1,
                min_match_offset,
                by_track,
                outputs,
            )?;
        }
    }
    Ok(())
}

fn descend_cluster<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
    by_track: &HashMap<u64, &TrackData>,
    outputs: &mut HashMap<u64, Vec<u8>>,
) -> Result<()> {
    for child in collect_children(reader, start, end)? {
        if child.id == element::BLOCK_GROUP() {
            let child_end = child.data_end(end);
            for grandchild in collect_children(reader, child.data_position, child_end)? {
                if grandchild.id == element::block_id() {
                    process_block(reader, &grandchild, child_end, by_track, outputs)?;
                }
            }
        } else if child.id == element::simple_block_id() {
            process_block(reader, &child, end, by_track, outputs)?;
        }
    }
    Ok(())
}

fn process_block<R: Read + Seek>(
    reader: &mut R,
    element: &EbmlElement,
    parent_end: u64,
    by_track: &HashMap<u64, &TrackData>,
    outputs: &mut HashMap<u64, Vec<u8>>,
) -> Result<()> {
    let element_size = match element.size {
        Size::Known(n) => n,
        Size::Unknown => element.data_end(parent_end) - element.data_position,
    };

    reader.seek(SeekFrom::Start(element.data_position))?;
    let header = block::decode(reader, element_size, element.data_position)?;

    let Some(track) = by_track.get(&header.track_number) else {
        return Ok(());
    };
    let out = outputs.entry(header.track_number).or_default();

    for (frame_offset, frame_size) in header.frame_offsets.iter().zip(header.frame_sizes.iter()) {
        if out.len() as u64 >= track.data_length {
            break;
        }
        let frame_data_start = element.data_position + frame_offset;
        if frame_data_start < track.match_offset {
            continue;
        }
        let remaining_quota = track.data_length - out.len() as u64;
        let take = (*frame_size).min(remaining_quota);
        if take == 0 {
            continue;
        }
        reader.seek(SeekFrom::Start(frame_data_start))?;
        out.extend_from_slice(&read_vec(reader, take as usize)?);
    }
    Ok(())
}
