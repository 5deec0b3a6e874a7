//! Boundary traits the core crate consumes from its caller: locating
//! uncompressed source files, persisting extracted stored files, and
//! supplying SFV entries for CRC validation. The core never touches a
//! filesystem path directly; every I/O entry point funnels through these.

use std::io::{self, Read, Seek};

use crate::error::Result;
use crate::sfv::parser::SfvEntry;

/// Object-safe alias for a seekable byte source.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// An opened source file plus the bookkeeping §4.8's reconstruction needs:
/// total length and a monotonically advancing read cursor, shared across
/// every `RarPackedFile` block that references the same logical name.
pub struct SourceHandle {
    reader: Box<dyn ReadSeek>,
    len: u64,
    cursor: u64,
}

impl SourceHandle {
    pub fn new(mut reader: Box<dyn ReadSeek>) -> io::Result<Self> {
        let len = reader.seek(io::SeekFrom::End(0))?;
        reader.seek(io::SeekFrom::Start(0))?;
        Ok(SourceHandle { reader, len, cursor: 0 })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.cursor)
    }

    /// Read exactly `count` bytes from the current cursor, advancing it.
    pub fn read_exact_advance(&mut self, count: u64) -> io::Result<Vec<u8>> {
        self.reader.seek(io::SeekFrom::Start(self.cursor))?;
        let mut buf = vec![0u8; count as usize];
        self.reader.read_exact(&mut buf)?;
        self.cursor += count;
        Ok(buf)
    }

    /// Stream exactly `count` bytes from the current cursor to `out`,
    /// advancing it, in bounded chunks (never materializing more than one
    /// chunk in memory regardless of `count`).
    pub fn copy_to<W: io::Write>(&mut self, count: u64, out: &mut W) -> io::Result<()> {
        const CHUNK: usize = 1024 * 1024;
        self.reader.seek(io::SeekFrom::Start(self.cursor))?;
        let mut remaining = count;
        let mut buf = vec![0u8; CHUNK.min(count.max(1) as usize)];
        while remaining > 0 {
            let take = (remaining as usize).min(buf.len());
            self.reader.read_exact(&mut buf[..take])?;
            out.write_all(&buf[..take])?;
            remaining -= take as u64;
        }
        self.cursor += count;
        Ok(())
    }
}

/// Resolves the logical file names seen on `RarPackedFile` blocks to
/// opened, seekable sources. Matching is by exact string; the engine never
/// invents or rewrites names.
pub trait SourceResolver {
    fn resolve(&mut self, logical_name: &str) -> Result<SourceHandle>;
}

/// Persists an extracted `SrrStoredFile` payload under a caller-owned
/// output root. `normalized_name` has already had backslashes converted to
/// forward slashes and leading separators stripped.
pub trait StoredFileSink {
    fn store(&mut self, normalized_name: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Supplies parsed SFV entries for CRC validation.
pub trait SfvProvider {
    fn entries(&self) -> &[SfvEntry];
}

/// Normalize a stored-file or RAR-volume relative name: backslashes become
/// forward slashes, and leading separators are stripped so the name can
/// never escape a caller-provided output root.
pub fn normalize_relative_name(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn normalize_strips_leading_separators_and_backslashes() {
        assert_eq!(normalize_relative_name("\\foo\\bar.nfo"), "foo/bar.nfo");
        assert_eq!(normalize_relative_name("/abs/path.sfv"), "abs/path.sfv");
        assert_eq!(normalize_relative_name("plain.nfo"), "plain.nfo");
    }

    #[test]
    fn source_handle_tracks_cursor_across_reads() {
        let data = (0u32..16).map(|n| n as u8).collect::<Vec<_>>();
        let mut handle = SourceHandle::new(Box::new(Cursor::new(data.clone()))).unwrap();
        assert_eq!(handle.len(), 16);
        let first = handle.read_exact_advance(4).unwrap();
        assert_eq!(first, data[0..4]);
        assert_eq!(handle.cursor(), 4);
        let mut sink = Vec::new();
        handle.copy_to(12, &mut sink).unwrap();
        assert_eq!(sink, data[4..16]);
        assert_eq!(handle.remaining(), 0);
    }
}
