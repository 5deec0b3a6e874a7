//! CRC-32 validation (§4.9): standard IEEE 802.3 polynomial, as computed by
//! `crc32fast` (reflected input/output, initial/final 0xFFFFFFFF — the same
//! construction `crc32fast::Hasher` uses throughout the SRS rebuilder).

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const CHUNK: usize = 1024 * 1024;

/// Stream `path` through a CRC-32 and compare against `expected`.
pub fn verify_crc(path: &Path, expected: u32) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; CHUNK];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize() == expected)
}

/// Stream an arbitrary reader through a CRC-32, for callers that already
/// hold an open handle rather than a path (e.g. a freshly reconstructed
/// volume still open for writing elsewhere).
pub fn crc32_of<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}
