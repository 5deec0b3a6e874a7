//! Matroska (MKV) Block/SimpleBlock parsing and per-track frame extraction.

pub mod block;
pub mod extractor;
