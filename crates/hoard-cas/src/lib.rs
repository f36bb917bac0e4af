//! Content addressing and content-defined chunking.
//!
//! This crate provides:
//! - [`Rollsum`] — the rolling checksum whose window decides split candidates.
//! - [`Splitter`] — the boundary state machine applying the min/max policy
//!   to a byte stream fed in arbitrary blocks.
//! - [`CdcChunker`] — convenience wrapper that chunks a buffer or a reader.
//! - [`hash_reader`] — streaming whole-file hash.

mod chunker;
mod error;
mod rollsum;
mod splitter;

pub use chunker::{CdcChunker, Chunk, hash_reader};
pub use error::CasError;
pub use rollsum::Rollsum;
pub use splitter::{Cut, Splitter};
