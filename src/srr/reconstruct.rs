//! Volume reconstruction engine (§4.8): groups SRR blocks by target RAR
//! volume, interleaves stored headers with source payload spans, and
//! writes each volume file in full before starting the next.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Context, Error, Result};
use crate::resolver::{normalize_relative_name, SourceResolver};

use super::block::{BlockKind, SrrBlock};
use super::rar_blocks::RAR_MARKER_SIGNATURE;

/// One `SrrRarFile`-delimited group of blocks: everything from a volume
/// marker up to (but not including) the next one.
#[derive(Debug)]
pub struct Volume {
    pub file_name: String,
    pub blocks: Vec<SrrBlock>,
}

/// Sort key for RAR volume names: `.rar` first, then `.r00`, `.r01`, …
/// ascending by numeric suffix; names that don't fit that convention sort
/// after every conforming name, lexicographically among themselves.
pub fn volume_order(name: &str) -> (u32, String) {
    let lower = name.to_lowercase();
    if lower.ends_with(".rar") {
        return (0, lower);
    }
    let ext = lower.rsplit('.').next().unwrap_or("");
    if ext.len() == 3 && ext.starts_with('r') {
        if let Ok(n) = ext[1..].parse::<u32>() {
            return (n + 1, lower);
        }
    }
    (u32::MAX, lower)
}

/// Partition a block stream into volume groups, keyed by each
/// `SrrRarFile`'s `file_name`. Blocks preceding the first `SrrRarFile`
/// (the `SrrHeader`, stored-file records, etc.) belong to no volume and are
/// dropped here — they're handled by the stored-file extractor instead.
pub fn group_volumes(blocks: Vec<SrrBlock>) -> Vec<Volume> {
    let mut volumes: Vec<Volume> = Vec::new();

    for block in blocks {
        if let BlockKind::RarFile(ref rar_file) = block.kind {
            volumes.push(Volume {
                file_name: rar_file.file_name.clone(),
                blocks: Vec::new(),
            });
            continue;
        }
        if let Some(current) = volumes.last_mut() {
            current.blocks.push(block);
        }
    }

    volumes.sort_by(|a, b| volume_order(&a.file_name).cmp(&volume_order(&b.file_name)));
    volumes
}

fn canonical_header_bytes(block: &SrrBlock) -> Vec<u8> {
    let mut out = Vec::with_capacity(block.head_size as usize);
    out.extend_from_slice(&block.head_crc.to_le_bytes());
    out.push(block.head_type);
    out.extend_from_slice(&block.head_flags.to_le_bytes());
    out.extend_from_slice(&block.head_size.to_le_bytes());
    out.extend_from_slice(&block.raw_header);
    out
}

/// Holds at most one open [`crate::resolver::SourceHandle`] at a time, per
/// §5's resource policy: opening a source under a new name closes whatever
/// was open before. Consecutive `RarPackedFile` blocks naming the same
/// source (the common case: chunk continuations across volumes) reuse the
/// same handle, so its cursor keeps advancing instead of resetting.
struct SourcePool {
    current: Option<(String, crate::resolver::SourceHandle)>,
}

impl SourcePool {
    fn new() -> Self {
        SourcePool { current: None }
    }

    fn get(
        &mut self,
        name: &str,
        resolver: &mut dyn SourceResolver,
    ) -> Result<&mut crate::resolver::SourceHandle> {
        let needs_swap = !matches!(&self.current, Some((cur, _)) if cur == name);
        if needs_swap {
            let handle = resolver.resolve(name)?;
            self.current = Some((name.to_string(), handle));
        }
        Ok(&mut self.current.as_mut().unwrap().1)
    }
}

/// Run the full volume reconstruction described in §4.8 and return the
/// paths written, keyed by volume file name.
pub fn reconstruct_volumes(
    blocks: Vec<SrrBlock>,
    resolver: &mut dyn SourceResolver,
    output_root: &Path,
) -> Result<BTreeMap<String, PathBuf>> {
    let volumes = group_volumes(blocks);
    let mut written = BTreeMap::new();
    let mut pool = SourcePool::new();

    for volume in volumes {
        let relative = normalize_relative_name(&volume.file_name);
        let out_path = output_root.join(&relative);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&out_path)?;
        write_volume(&volume, &mut out, resolver, &mut pool)?;
        out.flush()?;

        written.insert(volume.file_name.clone(), out_path);
    }

    Ok(written)
}

fn write_volume<W: Write>(
    volume: &Volume,
    out: &mut W,
    resolver: &mut dyn SourceResolver,
    pool: &mut SourcePool,
) -> Result<()> {
    for block in &volume.blocks {
        match &block.kind {
            BlockKind::RarMarker => {
                out.write_all(&RAR_MARKER_SIGNATURE)?;
            }
            BlockKind::RarPackedFile(file) => {
                out.write_all(&canonical_header_bytes(block))?;

                let handle = pool.get(&file.file_name, resolver)?;
                if handle.remaining() < file.packed_size {
                    return Err(Error::SourceExhausted {
                        name: file.file_name.clone(),
                        consumed: handle.cursor(),
                        needed: file.packed_size,
                    });
                }
                handle.copy_to(file.packed_size, out)?;
            }
            BlockKind::RarVolumeHeader(_)
            | BlockKind::RarNewSub(_)
            | BlockKind::RarOldStyle
            | BlockKind::RarArchiveEnd(_) => {
                out.write_all(&canonical_header_bytes(block))?;
            }
            _ => {
                // Any other block type encountered inside a volume group is
                // preserved verbatim rather than rejected.
                out.write_all(&canonical_header_bytes(block))?;
            }
        }
    }
    Ok(())
}

/// Sum of `full_packed_size` across every `RarPackedFile` block referencing
/// `source_name`, used by tests and callers to assert the §8 "completeness"
/// invariant before attempting reconstruction.
pub fn total_packed_size(volumes: &[Volume], source_name: &str) -> u64 {
    volumes
        .iter()
        .flat_map(|v| &v.blocks)
        .filter_map(|b| match &b.kind {
            BlockKind::RarPackedFile(f) if f.file_name == source_name => Some(f.packed_size),
            _ => None,
        })
        .sum()
}

#[allow(dead_code)]
fn context_for(block: &SrrBlock) -> Context {
    Context::BlockType(block.head_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CrateResult;
    use crate::resolver::SourceHandle;
    use std::collections::HashMap;
    use std::io::Cursor;

    struct MapResolver {
        sources: HashMap<String, Vec<u8>>,
    }

    impl SourceResolver for MapResolver {
        fn resolve(&mut self, logical_name: &str) -> CrateResult<SourceHandle> {
            let bytes = self
                .sources
                .get(logical_name)
                .ok_or_else(|| Error::MissingSource { name: logical_name.to_string() })?
                .clone();
            Ok(SourceHandle::new(Box::new(Cursor::new(bytes)))?)
        }
    }

    fn rar_file_block(name: &str) -> SrrBlock {
        let mut raw = (name.len() as u16).to_le_bytes().to_vec();
        raw.extend_from_slice(name.as_bytes());
        make_block(super::super::block::SRR_RAR_FILE, 0, raw)
    }

    fn marker_block() -> SrrBlock {
        make_block(super::super::block::RAR_MARKER, 0, Vec::new())
    }

    fn packed_file_block(name: &str, packed_size: u32) -> SrrBlock {
        let mut raw = packed_size.to_le_bytes().to_vec(); // packed_size
        raw.extend_from_slice(&0u32.to_le_bytes()); // unpacked_size
        raw.push(0); // host_os
        raw.extend_from_slice(&0u32.to_le_bytes()); // crc
        raw.extend_from_slice(&0u32.to_le_bytes()); // dos time
        raw.push(29); // version
        raw.push(0x30); // method
        raw.extend_from_slice(&(name.len() as u16).to_le_bytes());
        raw.extend_from_slice(&0u32.to_le_bytes()); // attrs
        raw.extend_from_slice(name.as_bytes());
        make_block(super::super::block::RAR_PACKED_FILE, 0, raw)
    }

    fn make_block(head_type: u8, head_flags: u16, raw_header: Vec<u8>) -> SrrBlock {
        let head_size = 7 + raw_header.len() as u16;
        let mut header_plus_body = vec![0x69u8, 0x69, head_type];
        header_plus_body.extend_from_slice(&head_flags.to_le_bytes());
        header_plus_body.extend_from_slice(&head_size.to_le_bytes());
        header_plus_body.extend_from_slice(&raw_header);
        let mut cursor = Cursor::new(header_plus_body);
        SrrBlock::read(&mut cursor).unwrap()
    }

    #[test]
    fn volume_order_sorts_rar_before_numbered_parts() {
        let mut names = vec!["x.r01", "x.rar", "x.r00", "x.r10"];
        names.sort_by(|a, b| volume_order(a).cmp(&volume_order(b)));
        assert_eq!(names, vec!["x.rar", "x.r00", "x.r01", "x.r10"]);
    }

    #[test]
    fn single_volume_reconstruction_matches_spec_layout() {
        let source = (0u32..1000).map(|i| (i % 256) as u8).collect::<Vec<_>>();
        let mut resolver = MapResolver {
            sources: [("movie.bin".to_string(), source.clone())].into_iter().collect(),
        };

        let blocks = vec![
            rar_file_block("x.rar"),
            marker_block(),
            packed_file_block("movie.bin", 1000),
        ];

        let dir = std::env::temp_dir().join(format!("srskit-reconstruct-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let written = reconstruct_volumes(blocks, &mut resolver, &dir).unwrap();
        let path = written.get("x.rar").unwrap();
        let output = std::fs::read(path).unwrap();

        assert_eq!(&output[0..7], &RAR_MARKER_SIGNATURE);
        assert!(output.ends_with(&source));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn multi_volume_reconstruction_splits_one_source_across_volumes() {
        let source = (0u32..1500).map(|i| (i % 256) as u8).collect::<Vec<_>>();
        let mut resolver = MapResolver {
            sources: [("big.bin".to_string(), source.clone())].into_iter().collect(),
        };

        let blocks = vec![
            rar_file_block("x.rar"),
            marker_block(),
            packed_file_block("big.bin", 1000),
            rar_file_block("x.r00"),
            marker_block(),
            packed_file_block("big.bin", 500),
        ];

        let dir = std::env::temp_dir().join(format!("srskit-reconstruct-multi-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let written = reconstruct_volumes(blocks, &mut resolver, &dir).unwrap();
        let first = std::fs::read(written.get("x.rar").unwrap()).unwrap();
        let second = std::fs::read(written.get("x.r00").unwrap()).unwrap();

        // marker(7) + common header(7) + fixed prefix(25) + name "big.bin"(7)
        let prefix_len = 7 + 7 + 25 + "big.bin".len();
        let mut combined = first[prefix_len..].to_vec();
        combined.extend_from_slice(&second[prefix_len..]);
        assert_eq!(combined, source);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_source_is_fatal() {
        let mut resolver = MapResolver { sources: HashMap::new() };
        let blocks = vec![rar_file_block("x.rar"), packed_file_block("absent.bin", 10)];
        let dir = std::env::temp_dir().join(format!("srskit-reconstruct-missing-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let err = reconstruct_volumes(blocks, &mut resolver, &dir).unwrap_err();
        assert!(matches!(err, Error::MissingSource { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
