//! Sample MKV rebuilder: streams an SRS, splicing extracted per-track
//! frame bytes back in place of the SRS's placeholder frame data.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::ebml::element::{self, MAX_DEPTH};
use crate::ebml::varint::{self, ElementId, Size};
use crate::error::Result;
use crate::mkv::block;

const COPY_CHUNK: usize = 1024 * 1024;

fn write_tracked<W: Write>(
    output: &mut W,
    bytes: &[u8],
    hasher: &mut crc32fast::Hasher,
    written: &mut u64,
) -> io::Result<()> {
    output.write_all(bytes)?;
    hasher.update(bytes);
    *written += bytes.len() as u64;
    Ok(())
}

fn stream_copy<R: Read, W: Write>(
    reader: &mut R,
    output: &mut W,
    mut remaining: u64,
    hasher: &mut crc32fast::Hasher,
    written: &mut u64,
) -> Result<()> {
    let mut buf = vec![0u8; COPY_CHUNK.min(remaining.max(1) as usize)];
    while remaining > 0 {
        let take = (remaining as usize).min(buf.len());
        reader.read_exact(&mut buf[..take])?;
        write_tracked(output, &buf[..take], hasher, written)?;
        remaining -= take as u64;
    }
    Ok(())
}

/// Re-emit `srs` to `output`, dropping the `ReSample` container and
/// splicing `per_track` frame-data bytes into every Block/SimpleBlock.
/// Returns the number of bytes written and their CRC-32.
pub fn rebuild_sample<R: Read + Seek, W: Write>(
    srs: &mut R,
    per_track: &HashMap<u64, Vec<u8>>,
    output: &mut W,
) -> Result<(u64, u32)> {
    let len = srs.seek(SeekFrom::End(0))?;
    srs.seek(SeekFrom::Start(0))?;

    let mut hasher = crc32fast::Hasher::new();
    let mut written = 0u64;
    let mut cursors: HashMap<u64, usize> = HashMap::new();

    walk(srs, 0, len, 0, per_track, &mut cursors, output, &mut hasher, &mut written)?;

    Ok((written, hasher.finalize()))
}

#[allow(clippy::too_many_arguments)]
fn walk<R: Read + Seek, W: Write>(
    reader: &mut R,
    start: u64,
    end: u64,
    depth: u32,
    per_track: &HashMap<u64, Vec<u8>>,
    cursors: &mut HashMap<u64, usize>,
    output: &mut W,
    hasher: &mut crc32fast::Hasher,
    written: &mut u64,
) -> Result<()> {
    if depth > MAX_DEPTH {
        return Ok(());
    }

    let mut position = start;
    while position < end {
        reader.seek(SeekFrom::Start(position))?;

        let id = varint::read_element_id(reader)?;
        let (size, size_raw) = varint::read_size_raw(reader)?;
        let data_position = reader.stream_position()?;
        let data_end = match size {
            Size::Known(n) => data_position + n,
            Size::Unknown => end,
        };

        if id == element::RESAMPLE() {
            position = data_end;
            continue;
        }

        if id == element::block_id() || id == element::simple_block_id() {
            write_tracked(output, id.as_bytes(), hasher, written)?;
            write_tracked(output, &size_raw, hasher, written)?;
            emit_block(reader, &id, data_position, data_end, per_track, cursors, output, hasher, written)?;
            position = data_end;
            continue;
        }

        if element::is_container(&id) {
            write_tracked(output, id.as_bytes(), hasher, written)?;
            write_tracked(output, &size_raw, hasher, written)?;
            walk(reader, data_position, data_end, depth + 1, per_track, cursors, output, hasher, written)?;
            position = data_end;
            continue;
        }

        write_tracked(output, id.as_bytes(), hasher, written)?;
        write_tracked(output, &size_raw, hasher, written)?;
        reader.seek(SeekFrom::Start(data_position))?;
        stream_copy(reader, output, data_end - data_position, hasher, written)?;
        position = data_end;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_block<R: Read + Seek, W: Write>(
    reader: &mut R,
    _id: &ElementId,
    data_position: u64,
    data_end: u64,
    per_track: &HashMap<u64, Vec<u8>>,
    cursors: &mut HashMap<u64, usize>,
    output: &mut W,
    hasher: &mut crc32fast::Hasher,
    written: &mut u64,
) -> Result<()> {
    let element_size = data_end - data_position;
    reader.seek(SeekFrom::Start(data_position))?;
    let header = block::decode(reader, element_size, data_position)?;

    reader.seek(SeekFrom::Start(data_position))?;
    let mut laced_header = vec![0u8; header.header_length as usize];
    reader.read_exact(&mut laced_header)?;
    write_tracked(output, &laced_header, hasher, written)?;

    // Advance the SRS cursor past the placeholder frame bytes without
    // reading them; the real bytes come from the extracted per-track stream.
    let placeholder_len: u64 = header.frame_sizes.iter().sum();
    reader.seek(SeekFrom::Start(data_position + header.header_length + placeholder_len))?;

    let cursor = cursors.entry(header.track_number).or_insert(0);
    let track_bytes = per_track.get(&header.track_number);

    for &frame_size in &header.frame_sizes {
        let available = track_bytes.map_or(0, |b| b.len().saturating_sub(*cursor));
        let take = (frame_size as usize).min(available);
        if take > 0 {
            let bytes = &track_bytes.unwrap()[*cursor..*cursor + take];
            write_tracked(output, bytes, hasher, written)?;
            *cursor += take;
        }
        let pad = frame_size as usize - take;
        if pad > 0 {
            write_tracked(output, &vec![0u8; pad], hasher, written)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn simple_block(track: u8, placeholder: &[u8]) -> Vec<u8> {
        let mut body = vec![0x80 | track, 0x00, 0x00, 0x00];
        body.extend_from_slice(placeholder);
        let mut out = vec![0xA3];
        out.extend(varint::write_size(body.len() as u64, varint::min_width_for(body.len() as u64)));
        out.extend(body);
        out
    }

    fn wrap(id: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend(varint::write_size(payload.len() as u64, varint::min_width_for(payload.len() as u64)));
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn splices_track_bytes_over_placeholder_and_drops_resample() {
        let block = simple_block(1, &[0u8; 4]); // 4-byte zeroed placeholder frame
        let cluster = wrap(&[0x1F, 0x43, 0xB6, 0x75], &block);

        let resample_payload = wrap(&[0x6A, 0x75], b"unused-placeholder-metadata");
        let mut segment_payload = Vec::new();
        segment_payload.extend(wrap(&[0x1F, 0x69, 0x75, 0x76], &resample_payload));
        segment_payload.extend(cluster);

        let segment = wrap(&[0x18, 0x53, 0x80, 0x67], &segment_payload);
        let mut srs = Cursor::new(segment);

        let mut tracks = HashMap::new();
        tracks.insert(1u64, vec![0xDEu8, 0xAD, 0xBE, 0xEF]);

        let mut output = Vec::new();
        let (written, crc) = rebuild_sample(&mut srs, &tracks, &mut output).unwrap();

        assert_eq!(written, output.len() as u64);
        // the ReSample container must not appear in the output at all
        assert!(!contains(&output, &[0x1F, 0x69, 0x75, 0x76]));
        assert!(contains(&output, &[0xDE, 0xAD, 0xBE, 0xEF]));
        assert_eq!(crc, crc32fast::hash(&output));
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }
}
