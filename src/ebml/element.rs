//! Generic EBML element-tree walker.
//!
//! This does not know anything about Matroska or SRS semantics beyond the
//! small set of container IDs needed to decide whether to descend into an
//! element's payload or treat it as an opaque leaf. Callers own all
//! interpretation of leaf payloads.

use std::io::{self, Seek, SeekFrom};

use super::varint::{self, ElementId, Size};

/// One element header: its identity, declared size, and the stream
/// position immediately after the header (where its payload starts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EbmlElement {
    pub id: ElementId,
    pub size: Size,
    pub data_position: u64,
}

impl EbmlElement {
    /// Resolve this element's payload end, given the end of its enclosing
    /// element. An "unknown size" element spans to the end of its parent.
    pub fn data_end(&self, parent_end: u64) -> u64 {
        match self.size {
            Size::Known(n) => self.data_position + n,
            Size::Unknown => parent_end,
        }
    }
}

/// Maximum nesting depth the recursive callers in this crate will descend
/// (Design Note: bound recursion on malformed/cyclic-looking input).
pub const MAX_DEPTH: u32 = 12;

macro_rules! container_ids {
    ($($name:ident = $value:expr;)*) => {
        $(
            #[allow(non_snake_case)]
            pub fn $name() -> ElementId {
                ElementId::from_u32($value)
            }
        )*
    };
}

container_ids! {
    SEGMENT = 0x1853_8067;
    CLUSTER = 0x1F43_B675;
    BLOCK_GROUP = 0x00A0;
    SEEK_HEAD = 0x114D_9B74;
    INFO = 0x1549_A966;
    TRACKS = 0x1654_AE6B;
    RESAMPLE = 0x1F69_7576;
}

/// Well-known leaf IDs needed by more than one module.
pub fn block_id() -> ElementId {
    ElementId::from_u32(0x00A1)
}

pub fn simple_block_id() -> ElementId {
    ElementId::from_u32(0x00A3)
}

/// True if `id` is one of the container element types this crate descends
/// into automatically.
pub fn is_container(id: &ElementId) -> bool {
    [SEGMENT(), CLUSTER(), BLOCK_GROUP(), SEEK_HEAD(), INFO(), TRACKS(), RESAMPLE()].contains(id)
}

/// Lazily walks sibling elements in `[start, end)`.
///
/// `end` must already be resolved (callers resolve an ancestor's unknown
/// size via [`EbmlElement::data_end`] before constructing a child
/// iterator). Reaching or exceeding `end`, or a malformed element whose
/// declared size would exceed `end`, ends iteration for this level
/// (see spec §4.3: "truncated" elements terminate the *current* level, not
/// the whole parse).
pub struct ElementIterator<'a, R> {
    reader: &'a mut R,
    next_position: u64,
    end: u64,
    done: bool,
}

impl<'a, R: io::Read + Seek> ElementIterator<'a, R> {
    pub fn new(reader: &'a mut R, start: u64, end: u64) -> Self {
        ElementIterator {
            reader,
            next_position: start,
            end,
            done: false,
        }
    }

    fn read_one(&mut self) -> io::Result<Option<EbmlElement>> {
        self.reader.seek(SeekFrom::Start(self.next_position))?;

        let id = varint::read_element_id(self.reader)?;
        let (size, _) = varint::read_size(self.reader)?;
        let data_position = self.reader.stream_position()?;

        let element = EbmlElement {
            id,
            size,
            data_position,
        };

        if let Size::Known(n) = element.size {
            if data_position + n > self.end {
                self.done = true;
                return Ok(None);
            }
        }

        self.next_position = element.data_end(self.end);
        Ok(Some(element))
    }
}

impl<'a, R: io::Read + Seek> Iterator for ElementIterator<'a, R> {
    type Item = io::Result<EbmlElement>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_position >= self.end {
            return None;
        }

        match self.read_one() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => None,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
