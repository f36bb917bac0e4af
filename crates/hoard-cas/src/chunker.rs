//! Buffer and reader front-ends over [`Splitter`].

use bytes::Bytes;
use hoard_types::{BlobHash, ChunkPolicy};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::CasError;
use crate::splitter::{Cut, Splitter};

/// Default read block size for streaming front-ends.
const READ_BLOCK: usize = 64 * 1024;

/// A single chunk of data with its content address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// `sha1(data)`.
    pub hash: BlobHash,
    /// Byte offset of the chunk's first byte within the original stream.
    pub offset: u64,
    /// The raw chunk data.
    pub data: Bytes,
}

impl Chunk {
    fn from_cut(cut: Cut) -> Self {
        Self {
            hash: BlobHash::from_data(&cut.data),
            offset: cut.end_offset - cut.data.len() as u64,
            data: cut.data,
        }
    }
}

/// Content-defined chunker using the rolling checksum policy.
pub struct CdcChunker {
    policy: ChunkPolicy,
}

impl CdcChunker {
    pub fn new(policy: ChunkPolicy) -> Self {
        Self { policy }
    }

    /// Split a buffer into content-defined chunks.
    ///
    /// Returns an empty vec for empty input.
    pub fn chunk(&self, data: &[u8]) -> Vec<Chunk> {
        if data.is_empty() {
            return Vec::new();
        }

        let mut splitter = Splitter::new(self.policy);
        let mut chunks = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            let (used, cut) = splitter.scan(&data[pos..]);
            pos += used;
            chunks.extend(cut.map(Chunk::from_cut));
        }
        let (last, _) = splitter.finish();
        chunks.extend(last.map(Chunk::from_cut));
        chunks
    }

    /// Split data from an async reader, reading in fixed-size blocks.
    ///
    /// Produces the same chunks as [`chunk`](Self::chunk) on the full buffer.
    pub async fn chunk_stream(
        &self,
        mut reader: impl AsyncRead + Unpin,
    ) -> Result<Vec<Chunk>, CasError> {
        let mut splitter = Splitter::new(self.policy);
        let mut chunks = Vec::new();
        let mut block = vec![0u8; READ_BLOCK];
        let mut total = 0u64;

        loop {
            let n = reader.read(&mut block).await?;
            if n == 0 {
                break;
            }
            total += n as u64;
            let mut pos = 0;
            while pos < n {
                let (used, cut) = splitter.scan(&block[pos..n]);
                pos += used;
                chunks.extend(cut.map(Chunk::from_cut));
            }
        }

        if total > 0 {
            let (last, _) = splitter.finish();
            chunks.extend(last.map(Chunk::from_cut));
        }
        Ok(chunks)
    }
}

impl Default for CdcChunker {
    fn default() -> Self {
        Self::new(ChunkPolicy::default())
    }
}

/// Hash a whole stream, reading `block_size` bytes at a time.
pub async fn hash_reader(
    mut reader: impl AsyncRead + Unpin,
    block_size: usize,
) -> Result<(BlobHash, u64), CasError> {
    let mut hasher = Sha1::new();
    let mut block = vec![0u8; block_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut block).await?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
        total += n as u64;
    }

    Ok((BlobHash::from_hasher(hasher), total))
}
