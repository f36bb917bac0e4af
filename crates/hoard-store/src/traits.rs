//! Core traits and the transaction handle.

use bytes::Bytes;
use hoard_types::{BlobHash, IndexEntry, Meta, TxContext};

use crate::error::StoreError;

/// An open transaction on one store connection.
///
/// Chunk index appends and metadata saves made under a handle are invisible
/// to other readers until [`BlobConn::tx_commit`]. The handle is consumed by
/// commit or abort, so it cannot be reused afterwards.
#[derive(Debug, PartialEq, Eq)]
pub struct TxHandle {
    id: u64,
    context: TxContext,
}

impl TxHandle {
    /// Create a handle. Only store implementations should call this.
    pub fn new(id: u64, context: TxContext) -> Self {
        Self { id, context }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &TxContext {
        &self.context
    }
}

/// Factory for store connections.
///
/// All implementations must be `Send + Sync` so a pool can dial from any task.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a new connection.
    async fn connect(&self) -> Result<Box<dyn BlobConn>, StoreError>;
}

/// Operations available on one store connection.
///
/// Blob puts are durable immediately and idempotent: putting bytes that
/// already exist is a no-op that returns the same hash. Index appends and
/// metadata are staged under the transaction.
#[async_trait::async_trait]
pub trait BlobConn: Send {
    /// Cheap liveness probe used before a pooled connection is reused.
    async fn ping(&mut self) -> Result<(), StoreError>;

    /// Open a transaction for the given client/session.
    async fn tx_begin(&mut self, context: &TxContext) -> Result<TxHandle, StoreError>;

    /// Publish everything staged under `tx` atomically.
    async fn tx_commit(&mut self, tx: TxHandle) -> Result<(), StoreError>;

    /// Discard everything staged under `tx`.
    async fn tx_abort(&mut self, tx: TxHandle) -> Result<(), StoreError>;

    /// Check whether a blob with this hash is stored.
    async fn blob_exists(&mut self, tx: &TxHandle, hash: &BlobHash) -> Result<bool, StoreError>;

    /// Store a blob and return the hash the store computed over it.
    async fn blob_put(&mut self, tx: &TxHandle, data: Bytes) -> Result<BlobHash, StoreError>;

    /// Append one entry to the chunk index keyed by `file`.
    ///
    /// If another transaction commits an index for the same `file` first,
    /// this transaction's entries for it are dropped at commit.
    async fn chunk_index_append(
        &mut self,
        tx: &TxHandle,
        file: &BlobHash,
        entry: IndexEntry,
    ) -> Result<(), StoreError>;

    /// Number of entries (sentinel included) in the chunk index keyed by `file`.
    async fn chunk_index_len(&mut self, tx: &TxHandle, file: &BlobHash)
    -> Result<usize, StoreError>;

    /// Save a file metadata record.
    async fn metadata_save(&mut self, tx: &TxHandle, meta: &Meta) -> Result<(), StoreError>;
}
