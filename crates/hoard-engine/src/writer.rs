//! File writers: the chunked path and the small-file path.
//!
//! Both append the index sentinel first, then one `(end offset, hash)` entry
//! per chunk, keyed by the whole-file hash from the pre-pass.

use std::path::Path;

use bytes::Bytes;
use hoard_cas::Splitter;
use hoard_store::{BlobConn, TxHandle};
use hoard_types::{BlobHash, ChunkPolicy, IndexEntry, WriteResult, WriteStats};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::dedup::ChunkDeduper;
use crate::error::EngineError;

/// Accumulates one file's chunks into its index and stats.
struct IndexWriter<'a> {
    conn: &'a mut dyn BlobConn,
    tx: &'a TxHandle,
    key: &'a BlobHash,
    stats: WriteStats,
}

impl<'a> IndexWriter<'a> {
    async fn open(
        conn: &'a mut dyn BlobConn,
        tx: &'a TxHandle,
        key: &'a BlobHash,
    ) -> Result<Self, EngineError> {
        conn.chunk_index_append(tx, key, IndexEntry::sentinel()).await?;
        Ok(Self {
            conn,
            tx,
            key,
            stats: WriteStats::default(),
        })
    }

    /// Submit a finalized chunk and record where it ends.
    async fn push(&mut self, data: Bytes, end_offset: u64) -> Result<BlobHash, EngineError> {
        let outcome = ChunkDeduper::new(&mut *self.conn, self.tx)
            .submit(data)
            .await?;
        self.stats.record_blob(outcome.size, outcome.uploaded);
        // A zero-byte stream's only chunk ends at 0, which the sentinel covers.
        if end_offset > 0 {
            let entry = IndexEntry::chunk(end_offset, outcome.hash);
            self.conn.chunk_index_append(self.tx, self.key, entry).await?;
        }
        Ok(outcome.hash)
    }

    fn finish(self, hash: BlobHash) -> WriteResult {
        let mut result = WriteResult::new(hash);
        result.stats = self.stats;
        result.finish_upload();
        result
    }
}

/// Chunk a file with the rolling checksum and upload its new chunks.
///
/// The returned hash is accumulated over the chunks as they are finalized;
/// the caller compares it with the pre-pass hash.
pub async fn write_chunked(
    conn: &mut dyn BlobConn,
    tx: &TxHandle,
    key: &BlobHash,
    path: &Path,
    policy: ChunkPolicy,
    read_buffer_size: usize,
) -> Result<WriteResult, EngineError> {
    debug!(path = %path.display(), %key, "chunked write");
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| EngineError::io(path, e))?;

    let mut writer = IndexWriter::open(conn, tx, key).await?;
    let mut splitter = Splitter::new(policy);
    let mut block = vec![0u8; read_buffer_size.max(1)];

    loop {
        let n = file
            .read(&mut block)
            .await
            .map_err(|e| EngineError::io(path, e))?;
        if n == 0 {
            break;
        }
        let mut pos = 0;
        while pos < n {
            let (used, cut) = splitter.scan(&block[pos..n]);
            pos += used;
            if let Some(cut) = cut {
                writer.push(cut.data, cut.end_offset).await?;
            }
        }
    }

    let (last, hash) = splitter.finish();
    if let Some(cut) = last {
        writer.push(cut.data, cut.end_offset).await?;
    }
    Ok(writer.finish(hash))
}

/// Upload a file no larger than the minimum chunk size as a single chunk.
///
/// Produces the same index and stats the chunked path would for such a file.
pub async fn write_small(
    conn: &mut dyn BlobConn,
    tx: &TxHandle,
    key: &BlobHash,
    path: &Path,
) -> Result<WriteResult, EngineError> {
    debug!(path = %path.display(), %key, "small-file write");
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| EngineError::io(path, e))?;
    let size = data.len() as u64;

    let mut writer = IndexWriter::open(conn, tx, key).await?;
    let hash = writer.push(Bytes::from(data), size).await?;
    Ok(writer.finish(hash))
}
