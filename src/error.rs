use thiserror::Error;

/// Specialized [`Result`] type used throughout this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// The pipeline stage / logical entity an [`Error`] occurred in.
///
/// Carried alongside every fatal error so a caller can report *what* failed
/// without re-deriving it from the byte offset alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Context {
    /// No further context is available.
    None,
    /// Failure while parsing or reconstructing a specific RAR volume.
    Volume(String),
    /// Failure tied to a specific MKV/SRS track number.
    Track(u64),
    /// Failure tied to a specific SRR/RAR block type tag.
    BlockType(u8),
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Context::None => write!(f, "<no context>"),
            Context::Volume(name) => write!(f, "volume {name:?}"),
            Context::Track(n) => write!(f, "track {n}"),
            Context::BlockType(t) => write!(f, "block type 0x{t:02X}"),
        }
    }
}

/// A fatal error that may occur while parsing or reconstructing
/// SRR/SRS/RAR/EBML data.
///
/// `unknown-block-type` from the spec is intentionally not a variant here:
/// an unrecognized SRR or RAR block is preserved as an opaque value instead
/// of raising an error (see [`crate::srr::block::BlockKind::Unknown`]).
#[derive(Debug, Error)]
pub enum Error {
    /// The stream did not start with the expected magic bytes.
    #[error("invalid magic at offset {offset} ({context})")]
    InvalidMagic { offset: u64, context: Context },

    /// Fewer bytes were available than the format requires.
    #[error("short read at offset {offset}: expected {expected} more bytes ({context})")]
    ShortRead {
        offset: u64,
        expected: u64,
        context: Context,
    },

    /// A block's declared header size was too small to be valid.
    #[error("truncated block at offset {offset}: head_size {head_size} < 7 ({context})")]
    TruncatedBlock {
        offset: u64,
        head_size: u16,
        context: Context,
    },

    /// A [`crate::resolver::SourceResolver`] could not find a named source file.
    #[error("missing source file {name:?}")]
    MissingSource { name: String },

    /// A source file ran out of bytes before all referencing blocks were satisfied.
    #[error("source {name:?} exhausted after {consumed} of {needed} required bytes")]
    SourceExhausted {
        name: String,
        consumed: u64,
        needed: u64,
    },

    /// Two records that were expected to name the same logical file disagree.
    #[error("name mismatch: expected {expected:?}, found {found:?}")]
    UnexpectedNameMismatch { expected: String, found: String },

    /// A byte count computed during reconstruction did not match what was expected.
    #[error("size mismatch at offset {offset}: expected {expected}, found {found} ({context})")]
    SizeMismatch {
        offset: u64,
        expected: u64,
        found: u64,
        context: Context,
    },

    /// CRC-32 of a reconstructed file did not match the expected checksum.
    #[error("crc mismatch for {name:?}: expected {expected:08X}, found {found:08X}")]
    CrcMismatch {
        name: String,
        expected: u32,
        found: u32,
    },

    /// An EBML element violated the container/size rules in a way that
    /// cannot be recovered from.
    #[error("malformed EBML element at offset {offset} ({context})")]
    EbmlMalformed { offset: u64, context: Context },

    /// A Block/SimpleBlock declared a lacing mode this crate does not decode.
    #[error("unsupported lacing mode {mode} at offset {offset}")]
    UnsupportedLacing { offset: u64, mode: u8 },

    /// Unclassified I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True if this error originated from an `UnexpectedEof` while reading.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
