//! In-memory transactional blob store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use hoard_types::{BlobHash, ChunkIndex, IndexEntry, Meta, TxContext};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{BlobConn, BlobStore, TxHandle};

/// In-memory blob store backed by a `RwLock<HashMap>`.
///
/// Useful for tests and for dry runs that only want dedup accounting.
/// Cloning is cheap and every clone sees the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: RwLock<State>,
    next_tx: AtomicU64,
    connections: AtomicU64,
    puts: AtomicU64,
}

#[derive(Default)]
struct State {
    blobs: HashMap<BlobHash, Bytes>,
    /// Whole-file hash → committed index entries.
    indexes: HashMap<BlobHash, Vec<IndexEntry>>,
    /// `Meta::id()` → record. Records are never replaced by newer versions.
    metas: HashMap<BlobHash, Meta>,
    /// Open transactions.
    pending: HashMap<u64, Staged>,
}

#[derive(Default)]
struct Staged {
    context: TxContext,
    index: Vec<(BlobHash, IndexEntry)>,
    metas: Vec<Meta>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a stored blob.
    pub fn blob(&self, hash: &BlobHash) -> Option<Bytes> {
        self.read().blobs.get(hash).cloned()
    }

    /// Number of distinct blobs stored.
    pub fn blob_count(&self) -> usize {
        self.read().blobs.len()
    }

    /// Total bytes across distinct blobs.
    pub fn stored_bytes(&self) -> u64 {
        self.read().blobs.values().map(|b| b.len() as u64).sum()
    }

    /// Number of `blob_put` calls served, duplicates included.
    pub fn put_calls(&self) -> u64 {
        self.shared.puts.load(Ordering::Relaxed)
    }

    /// Committed chunk index for a whole-file hash.
    pub fn chunk_index(&self, file: &BlobHash) -> Option<ChunkIndex> {
        self.read()
            .indexes
            .get(file)
            .map(|entries| ChunkIndex::from_entries(entries.clone()))
    }

    /// All committed metadata records.
    pub fn metas(&self) -> Vec<Meta> {
        self.read().metas.values().cloned().collect()
    }

    /// Committed metadata records that reference a whole-file hash.
    pub fn metas_for(&self, reference: &BlobHash) -> Vec<Meta> {
        self.read()
            .metas
            .values()
            .filter(|m| m.reference == *reference)
            .cloned()
            .collect()
    }

    /// Number of transactions begun but neither committed nor aborted.
    pub fn open_transactions(&self) -> usize {
        self.read().pending.len()
    }

    /// Number of connections dialed so far.
    pub fn connections_opened(&self) -> u64 {
        self.shared.connections.load(Ordering::Relaxed)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.shared.state.read().expect("lock poisoned")
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryStore {
    async fn connect(&self) -> Result<Box<dyn BlobConn>, StoreError> {
        let n = self.shared.connections.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(connection = n, "opened memory store connection");
        Ok(Box::new(MemoryConn {
            shared: Arc::clone(&self.shared),
            open: Vec::new(),
        }))
    }
}

/// One connection to a [`MemoryStore`].
///
/// Transactions still open when the connection is dropped are discarded.
struct MemoryConn {
    shared: Arc<Shared>,
    open: Vec<u64>,
}

impl MemoryConn {
    fn with_staged<T>(
        &self,
        tx: &TxHandle,
        f: impl FnOnce(&mut Staged) -> T,
    ) -> Result<T, StoreError> {
        let mut state = self.shared.state.write().expect("lock poisoned");
        let staged = state
            .pending
            .get_mut(&tx.id())
            .ok_or(StoreError::UnknownTransaction(tx.id()))?;
        Ok(f(staged))
    }

    fn ensure_open(state: &State, tx: &TxHandle) -> Result<(), StoreError> {
        if state.pending.contains_key(&tx.id()) {
            Ok(())
        } else {
            Err(StoreError::UnknownTransaction(tx.id()))
        }
    }
}

impl Drop for MemoryConn {
    fn drop(&mut self) {
        if self.open.is_empty() {
            return;
        }
        // Skip cleanup if the lock is poisoned.
        if let Ok(mut state) = self.shared.state.write() {
            for id in self.open.drain(..) {
                if state.pending.remove(&id).is_some() {
                    debug!(tx = id, "connection closed, transaction discarded");
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl BlobConn for MemoryConn {
    async fn ping(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn tx_begin(&mut self, context: &TxContext) -> Result<TxHandle, StoreError> {
        let id = self.shared.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.shared.state.write().expect("lock poisoned");
        state.pending.insert(
            id,
            Staged {
                context: context.clone(),
                ..Staged::default()
            },
        );
        self.open.push(id);
        debug!(tx = id, client = %context.client, "transaction opened");
        Ok(TxHandle::new(id, context.clone()))
    }

    async fn tx_commit(&mut self, tx: TxHandle) -> Result<(), StoreError> {
        self.open.retain(|&id| id != tx.id());
        let mut state = self.shared.state.write().expect("lock poisoned");
        let staged = state
            .pending
            .remove(&tx.id())
            .ok_or(StoreError::UnknownTransaction(tx.id()))?;

        // Resolve record ids before touching committed state.
        let keyed = staged
            .metas
            .into_iter()
            .map(|meta| meta.id().map(|id| (id, meta)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::unavailable("tx_commit", e.to_string()))?;

        // Group by file; an index that is already committed is never
        // extended, since the same file hash always yields the same index.
        let mut grouped: HashMap<BlobHash, Vec<IndexEntry>> = HashMap::new();
        for (file, entry) in staged.index {
            grouped.entry(file).or_default().push(entry);
        }
        let mut entries = 0;
        for (file, list) in grouped {
            if state.indexes.contains_key(&file) {
                debug!(tx = tx.id(), %file, "index already committed, keeping existing");
                continue;
            }
            entries += list.len();
            state.indexes.insert(file, list);
        }
        let metas = keyed.len();
        for (id, meta) in keyed {
            state.metas.entry(id).or_insert(meta);
        }

        debug!(
            tx = tx.id(),
            session = %staged.context.session,
            entries,
            metas,
            "transaction committed"
        );
        Ok(())
    }

    async fn tx_abort(&mut self, tx: TxHandle) -> Result<(), StoreError> {
        self.open.retain(|&id| id != tx.id());
        let mut state = self.shared.state.write().expect("lock poisoned");
        state
            .pending
            .remove(&tx.id())
            .ok_or(StoreError::UnknownTransaction(tx.id()))?;
        debug!(tx = tx.id(), "transaction aborted");
        Ok(())
    }

    async fn blob_exists(&mut self, tx: &TxHandle, hash: &BlobHash) -> Result<bool, StoreError> {
        let state = self.shared.state.read().expect("lock poisoned");
        Self::ensure_open(&state, tx)?;
        Ok(state.blobs.contains_key(hash))
    }

    async fn blob_put(&mut self, tx: &TxHandle, data: Bytes) -> Result<BlobHash, StoreError> {
        let hash = BlobHash::from_data(&data);
        let mut state = self.shared.state.write().expect("lock poisoned");
        Self::ensure_open(&state, tx)?;
        self.shared.puts.fetch_add(1, Ordering::Relaxed);
        if !state.blobs.contains_key(&hash) {
            debug!(%hash, size = data.len(), "storing blob in memory");
            state.blobs.insert(hash, data);
        }
        Ok(hash)
    }

    async fn chunk_index_append(
        &mut self,
        tx: &TxHandle,
        file: &BlobHash,
        entry: IndexEntry,
    ) -> Result<(), StoreError> {
        self.with_staged(tx, |staged| staged.index.push((*file, entry)))
    }

    async fn chunk_index_len(
        &mut self,
        tx: &TxHandle,
        file: &BlobHash,
    ) -> Result<usize, StoreError> {
        let state = self.shared.state.read().expect("lock poisoned");
        let staged = state
            .pending
            .get(&tx.id())
            .ok_or(StoreError::UnknownTransaction(tx.id()))?;
        let committed = state.indexes.get(file).map_or(0, Vec::len);
        let own = staged.index.iter().filter(|(f, _)| f == file).count();
        Ok(committed + own)
    }

    async fn metadata_save(&mut self, tx: &TxHandle, meta: &Meta) -> Result<(), StoreError> {
        self.with_staged(tx, |staged| staged.metas.push(meta.clone()))
    }
}
