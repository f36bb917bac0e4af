//! Deduplicating file ingestion.
//!
//! The [`Ingestor`] drives the whole pipeline for one file: whole-file
//! pre-pass hash, already-known short-circuit, content-defined chunking with
//! per-chunk dedup upload ([`ChunkDeduper`]), hash verification, metadata,
//! and a single commit. Front-ends depend on the [`IngestEngine`] trait.

pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod gate;
pub mod ingestor;
pub mod writer;

pub use config::IngestConfig;
pub use dedup::{ChunkDeduper, ChunkOutcome};
pub use engine::IngestEngine;
pub use error::{EngineError, Integrity};
pub use gate::{UploadGate, UploadPermit};
pub use ingestor::{BatchOutcome, Ingestor};
pub use writer::{write_chunked, write_small};

#[cfg(test)]
mod tests;
