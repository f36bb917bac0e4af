//! Shared types and identifiers for hoard.
//!
//! This crate defines the records that flow through the ingestion pipeline:
//! the content address ([`BlobHash`]), the per-file chunk index
//! ([`ChunkIndex`], [`IndexEntry`]), ingestion accounting ([`WriteResult`],
//! [`WriteStats`]), the persisted file record ([`Meta`]), and the chunking
//! parameters ([`ChunkPolicy`]).

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

// ---------------------------------------------------------------------------
// Content address
// ---------------------------------------------------------------------------

/// Content address of a blob or a whole file: `sha1(data)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BlobHash([u8; 20]);

impl BlobHash {
    /// Hash of zero bytes. Files with this hash are never chunked.
    pub const EMPTY: BlobHash = BlobHash([
        0xda, 0x39, 0xa3, 0xee, 0x5e, 0x6b, 0x4b, 0x0d, 0x32, 0x55, 0xbf, 0xef, 0x95, 0x60, 0x18,
        0x90, 0xaf, 0xd8, 0x07, 0x09,
    ]);

    /// Hash arbitrary data with SHA-1.
    pub fn from_data(data: &[u8]) -> Self {
        Self(Sha1::digest(data).into())
    }

    /// Finish an incremental hasher.
    pub fn from_hasher(hasher: Sha1) -> Self {
        Self(hasher.finalize().into())
    }

    /// Return the raw 20-byte representation.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl From<[u8; 20]> for BlobHash {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for BlobHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobHash({self})")
    }
}

/// A string that is not 40 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid blob hash {0:?}: expected 40 hex characters")]
pub struct ParseHashError(String);

impl FromStr for BlobHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseHashError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

// ---------------------------------------------------------------------------
// Chunk index
// ---------------------------------------------------------------------------

/// One entry of a file's chunk index.
///
/// `offset` is the cumulative end offset of the chunk named by `hash`, so
/// entry `i` covers bytes `[entries[i - 1].offset, entries[i].offset)`.
/// The leading sentinel is `(0, None)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub offset: u64,
    pub hash: Option<BlobHash>,
}

impl IndexEntry {
    /// The placeholder that opens every index.
    pub const fn sentinel() -> Self {
        Self {
            offset: 0,
            hash: None,
        }
    }

    pub const fn chunk(end_offset: u64, hash: BlobHash) -> Self {
        Self {
            offset: end_offset,
            hash: Some(hash),
        }
    }
}

/// Ordered `(cumulative offset, chunk hash)` list for one file, keyed in the
/// store by the file's whole-content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkIndex(Vec<IndexEntry>);

impl ChunkIndex {
    pub fn from_entries(entries: Vec<IndexEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Chunk hashes in file order, sentinel excluded.
    pub fn chunk_hashes(&self) -> impl Iterator<Item = BlobHash> + '_ {
        self.0.iter().filter_map(|e| e.hash)
    }

    /// Byte length of every chunk in file order.
    pub fn chunk_sizes(&self) -> Vec<u64> {
        self.0.windows(2).map(|w| w[1].offset - w[0].offset).collect()
    }

    /// Check the index shape against the size of the file it describes:
    /// sentinel first, strictly increasing offsets, last offset == size.
    pub fn is_well_formed(&self, total_size: u64) -> bool {
        let Some(first) = self.0.first() else {
            return false;
        };
        if *first != IndexEntry::sentinel() {
            return false;
        }
        let increasing = self.0.windows(2).all(|w| w[0].offset < w[1].offset);
        let all_named = self.0[1..].iter().all(|e| e.hash.is_some());
        let last = self.0.last().map_or(0, |e| e.offset);
        increasing && all_named && last == total_size
    }
}

// ---------------------------------------------------------------------------
// Ingestion accounting
// ---------------------------------------------------------------------------

/// Byte and blob counters for one or more ingested files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStats {
    pub size: u64,
    pub blobs_count: u64,
    pub blobs_uploaded: u64,
    pub blobs_skipped: u64,
    pub size_uploaded: u64,
    pub size_skipped: u64,
    pub files_count: u64,
    pub files_uploaded: u64,
    pub files_skipped: u64,
}

impl WriteStats {
    /// Account for one finalized chunk.
    pub fn record_blob(&mut self, len: u64, uploaded: bool) {
        if uploaded {
            self.blobs_uploaded += 1;
            self.size_uploaded += len;
        } else {
            self.blobs_skipped += 1;
            self.size_skipped += len;
        }
        self.blobs_count += 1;
        self.size += len;
    }

    /// Add another file's counters to these.
    pub fn merge(&mut self, other: &WriteStats) {
        self.size += other.size;
        self.blobs_count += other.blobs_count;
        self.blobs_uploaded += other.blobs_uploaded;
        self.blobs_skipped += other.blobs_skipped;
        self.size_uploaded += other.size_uploaded;
        self.size_skipped += other.size_skipped;
        self.files_count += other.files_count;
        self.files_uploaded += other.files_uploaded;
        self.files_skipped += other.files_skipped;
    }

    /// `uploaded + skipped == total` for blobs, bytes and files.
    pub fn is_balanced(&self) -> bool {
        self.blobs_uploaded + self.blobs_skipped == self.blobs_count
            && self.size_uploaded + self.size_skipped == self.size
            && self.files_uploaded + self.files_skipped == self.files_count
    }
}

/// Outcome of ingesting a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Whole-file hash, the key of the file's chunk index.
    pub hash: BlobHash,
    /// The file was already fully known to the store; nothing was chunked.
    pub already_exists: bool,
    pub stats: WriteStats,
}

impl WriteResult {
    /// Start accounting for a file that is about to be chunked.
    pub fn new(hash: BlobHash) -> Self {
        Self {
            hash,
            already_exists: false,
            stats: WriteStats::default(),
        }
    }

    /// Result for a file whose index already exists: every byte and every
    /// indexed chunk counts as skipped.
    pub fn already_known(hash: BlobHash, size: u64, chunk_entries: u64) -> Self {
        Self {
            hash,
            already_exists: true,
            stats: WriteStats {
                size,
                blobs_count: chunk_entries,
                blobs_skipped: chunk_entries,
                size_skipped: size,
                files_count: 1,
                files_skipped: 1,
                ..WriteStats::default()
            },
        }
    }

    /// Mark the file itself as uploaded once all of its chunks are in.
    pub fn finish_upload(&mut self) {
        self.stats.files_count += 1;
        self.stats.files_uploaded += 1;
    }
}

// ---------------------------------------------------------------------------
// File metadata
// ---------------------------------------------------------------------------

/// Type tag of a [`Meta`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaKind {
    File,
}

impl MetaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaKind::File => "file",
        }
    }
}

/// Persisted description of one ingested file.
///
/// `reference` is the whole-file hash and locates the file's [`ChunkIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub reference: BlobHash,
    pub name: String,
    pub size: u64,
    pub kind: MetaKind,
    /// Modification time, RFC 3339 in UTC.
    pub mod_time: String,
    pub mode: u32,
}

impl Meta {
    /// Build the record for a regular file from its filesystem metadata.
    pub fn for_file(
        reference: BlobHash,
        name: impl Into<String>,
        size: u64,
        metadata: &std::fs::Metadata,
    ) -> Self {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Self {
            reference,
            name: name.into(),
            size,
            kind: MetaKind::File,
            mod_time: format_mod_time(modified),
            mode: file_mode(metadata),
        }
    }

    /// Identifier of this record version: `sha1(postcard(meta))`.
    ///
    /// A later snapshot of the same file gets a new id, so older records are
    /// kept alongside rather than overwritten.
    pub fn id(&self) -> Result<BlobHash, postcard::Error> {
        let encoded = postcard::to_allocvec(self)?;
        Ok(BlobHash::from_data(&encoded))
    }
}

/// Format a timestamp as RFC 3339 UTC with second precision.
pub fn format_mod_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.mode()
    }

    #[cfg(not(unix))]
    {
        if metadata.permissions().readonly() {
            0o444
        } else {
            0o644
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Rolling checksum window in bytes.
pub const ROLLSUM_WINDOW: usize = 64;

/// Chunks are never cut at or below this size, except at end of file.
pub const MIN_BLOB_SIZE: usize = 64 << 10;

/// Chunks are always cut once they reach this size.
pub const MAX_BLOB_SIZE: usize = 1 << 20;

/// Content-defined chunking parameters.
///
/// **Changing any of these changes chunk boundaries**, which breaks
/// deduplication against everything stored under the old values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkPolicy {
    pub window_size: usize,
    pub min_blob_size: usize,
    pub max_blob_size: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            window_size: ROLLSUM_WINDOW,
            min_blob_size: MIN_BLOB_SIZE,
            max_blob_size: MAX_BLOB_SIZE,
        }
    }
}

/// Client and session arguments a transaction is opened with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    pub client: String,
    pub session: String,
}

impl TxContext {
    pub fn new(client: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            session: session.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
