//! Chunk hasher / deduper.

use bytes::Bytes;
use hoard_store::{BlobConn, TxHandle};
use hoard_types::BlobHash;
use tracing::{debug, error};

use crate::error::{EngineError, Integrity};

/// What happened to one submitted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub hash: BlobHash,
    pub size: u64,
    /// `false` when the store already held the blob.
    pub uploaded: bool,
}

/// Hashes chunks and uploads the ones the store does not have yet.
pub struct ChunkDeduper<'a> {
    conn: &'a mut dyn BlobConn,
    tx: &'a TxHandle,
}

impl<'a> ChunkDeduper<'a> {
    pub fn new(conn: &'a mut dyn BlobConn, tx: &'a TxHandle) -> Self {
        Self { conn, tx }
    }

    /// Hash `data`, skip it if already stored, otherwise upload it and check
    /// the hash the store computed.
    ///
    /// A concurrent upload of the same bytes by another ingestion is fine:
    /// puts are idempotent and return the same hash.
    pub async fn submit(&mut self, data: Bytes) -> Result<ChunkOutcome, EngineError> {
        let hash = BlobHash::from_data(&data);
        let size = data.len() as u64;

        if self.conn.blob_exists(self.tx, &hash).await? {
            debug!(%hash, size, "chunk already stored");
            return Ok(ChunkOutcome {
                hash,
                size,
                uploaded: false,
            });
        }

        let remote = self.conn.blob_put(self.tx, data).await?;
        if remote != hash {
            error!(local = %hash, %remote, size, "store returned a different hash for uploaded chunk");
            return Err(Integrity::BlobHashMismatch {
                local: hash,
                remote,
            }
            .into());
        }

        debug!(%hash, size, "chunk uploaded");
        Ok(ChunkOutcome {
            hash,
            size,
            uploaded: true,
        })
    }
}
