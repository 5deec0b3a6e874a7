//! SRR archive parsing: block stream, reconstruction of RAR volumes from
//! a `.srr` plus its referenced source files.

mod rar_blocks;

pub mod block;
pub mod block_iterator;
pub mod reconstruct;

pub use block::{block_type_name, BlockKind, SrrBlock};
pub use block_iterator::BlockIterator;
pub use rar_blocks::{
    ExtTime, RarArchiveEnd, RarArchiveEndFlags, RarNewSub, RarPackedFile, RarPackedFileFlags,
    RarVolumeHeader, RAR_MARKER_SIGNATURE,
};
pub use reconstruct::{reconstruct_volumes, volume_order, Volume};
