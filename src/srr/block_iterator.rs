use std::io;

use crate::error::Result;

use super::block::SrrBlock;

/// Streams [`SrrBlock`]s from an `.srr` file, advancing past each block's
/// header and (when present) its `add_size` payload.
///
/// An SRR can embed more than one RAR volume group (each opened by its own
/// `SrrRarFile` marker), and each group may carry its own `RarArchiveEnd`
/// block. `RarArchiveEnd` therefore terminates only the group it belongs to,
/// not the whole block stream — iteration stops solely at true end-of-file.
#[derive(Debug)]
pub struct BlockIterator<R: io::Read + io::Seek> {
    reader: R,
    file_size: u64,
    next_block_position: u64,
}

impl<R: io::Read + io::Seek> BlockIterator<R> {
    pub fn new(reader: R, offset: u64, file_size: u64) -> Self {
        Self {
            reader,
            file_size,
            next_block_position: offset,
        }
    }

    fn read_block(&mut self) -> Result<SrrBlock> {
        self.reader.seek(io::SeekFrom::Start(self.next_block_position))?;

        let block = SrrBlock::read(&mut self.reader)?;
        self.next_block_position = block.end_position();

        Ok(block)
    }

    /// Consume the iterator and recover the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: io::Read + io::Seek> Iterator for BlockIterator<R> {
    type Item = Result<SrrBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_block_position >= self.file_size {
            return None;
        }

        Some(self.read_block())
    }
}
