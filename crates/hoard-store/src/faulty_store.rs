//! A [`BlobStore`] wrapper that injects failures, corruption and latency.
//!
//! `FaultyStore` wraps any `Arc<dyn BlobStore>` and consults a shared rule
//! set before forwarding each call. Rules can be changed at runtime and are
//! seen by every connection dialed through the wrapper.
//!
//! # Example
//!
//! ```ignore
//! let faulty = FaultyStore::new(inner).latency(Duration::from_millis(2));
//! faulty.fail_after(StoreOp::Put, 3); // 4th put onwards fails
//! faulty.corrupt_puts(true);          // returned hashes no longer match
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use hoard_types::{BlobHash, IndexEntry, Meta, TxContext};

use crate::error::StoreError;
use crate::traits::{BlobConn, BlobStore, TxHandle};

/// Store calls that can be targeted by a fault rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Connect,
    Ping,
    Begin,
    Commit,
    Abort,
    Exists,
    Put,
    IndexAppend,
    IndexLen,
    MetaSave,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::Connect => "connect",
            StoreOp::Ping => "ping",
            StoreOp::Begin => "tx_begin",
            StoreOp::Commit => "tx_commit",
            StoreOp::Abort => "tx_abort",
            StoreOp::Exists => "blob_exists",
            StoreOp::Put => "blob_put",
            StoreOp::IndexAppend => "chunk_index_append",
            StoreOp::IndexLen => "chunk_index_len",
            StoreOp::MetaSave => "metadata_save",
        }
    }
}

#[derive(Default)]
struct Faults {
    /// Op → number of successful calls allowed before it starts failing.
    fail_after: HashMap<StoreOp, u64>,
    calls: HashMap<StoreOp, u64>,
    corrupt_puts: bool,
}

/// A [`BlobStore`] wrapper for exercising error paths.
pub struct FaultyStore {
    inner: Arc<dyn BlobStore>,
    faults: Arc<Mutex<Faults>>,
    latency: Duration,
}

impl FaultyStore {
    /// Wrap an existing store as a pass-through with no faults.
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self {
            inner,
            faults: Arc::new(Mutex::new(Faults::default())),
            latency: Duration::ZERO,
        }
    }

    /// Sleep this long before every forwarded call.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every call of `op` fail from now on.
    pub fn fail(&self, op: StoreOp) {
        self.fail_after(op, 0);
    }

    /// Let `op` succeed `successes` more times, then fail.
    pub fn fail_after(&self, op: StoreOp, successes: u64) {
        let mut faults = self.faults.lock().expect("lock poisoned");
        let seen = faults.calls.get(&op).copied().unwrap_or(0);
        faults.fail_after.insert(op, seen + successes);
    }

    /// Remove the failure rule for `op`.
    pub fn heal(&self, op: StoreOp) {
        self.faults
            .lock()
            .expect("lock poisoned")
            .fail_after
            .remove(&op);
    }

    /// When set, `blob_put` stores the data but reports a wrong hash.
    pub fn corrupt_puts(&self, corrupt: bool) {
        self.faults.lock().expect("lock poisoned").corrupt_puts = corrupt;
    }

    /// Number of times `op` has been attempted through this wrapper.
    pub fn calls(&self, op: StoreOp) -> u64 {
        self.faults
            .lock()
            .expect("lock poisoned")
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }
}

fn check(faults: &Mutex<Faults>, op: StoreOp) -> Result<(), StoreError> {
    let mut faults = faults.lock().expect("lock poisoned");
    let seen = faults.calls.entry(op).or_insert(0);
    let attempt = *seen;
    *seen += 1;
    match faults.fail_after.get(&op) {
        Some(&allowed) if attempt >= allowed => {
            Err(StoreError::unavailable(op.name(), "injected failure"))
        }
        _ => Ok(()),
    }
}

#[async_trait::async_trait]
impl BlobStore for FaultyStore {
    async fn connect(&self) -> Result<Box<dyn BlobConn>, StoreError> {
        check(&self.faults, StoreOp::Connect)?;
        let inner = self.inner.connect().await?;
        Ok(Box::new(FaultyConn {
            inner,
            faults: Arc::clone(&self.faults),
            latency: self.latency,
        }))
    }
}

struct FaultyConn {
    inner: Box<dyn BlobConn>,
    faults: Arc<Mutex<Faults>>,
    latency: Duration,
}

impl FaultyConn {
    async fn enter(&mut self, op: StoreOp) -> Result<(), StoreError> {
        check(&self.faults, op)?;
        let latency = self.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobConn for FaultyConn {
    async fn ping(&mut self) -> Result<(), StoreError> {
        self.enter(StoreOp::Ping).await?;
        self.inner.ping().await
    }

    async fn tx_begin(&mut self, context: &TxContext) -> Result<TxHandle, StoreError> {
        self.enter(StoreOp::Begin).await?;
        self.inner.tx_begin(context).await
    }

    async fn tx_commit(&mut self, tx: TxHandle) -> Result<(), StoreError> {
        self.enter(StoreOp::Commit).await?;
        self.inner.tx_commit(tx).await
    }

    async fn tx_abort(&mut self, tx: TxHandle) -> Result<(), StoreError> {
        self.enter(StoreOp::Abort).await?;
        self.inner.tx_abort(tx).await
    }

    async fn blob_exists(&mut self, tx: &TxHandle, hash: &BlobHash) -> Result<bool, StoreError> {
        self.enter(StoreOp::Exists).await?;
        self.inner.blob_exists(tx, hash).await
    }

    async fn blob_put(&mut self, tx: &TxHandle, data: Bytes) -> Result<BlobHash, StoreError> {
        self.enter(StoreOp::Put).await?;
        let hash = self.inner.blob_put(tx, data).await?;
        let corrupt = self.faults.lock().expect("lock poisoned").corrupt_puts;
        if corrupt {
            let mut flipped = *hash.as_bytes();
            flipped[0] ^= 0xff;
            return Ok(BlobHash::from(flipped));
        }
        Ok(hash)
    }

    async fn chunk_index_append(
        &mut self,
        tx: &TxHandle,
        file: &BlobHash,
        entry: IndexEntry,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::IndexAppend).await?;
        self.inner.chunk_index_append(tx, file, entry).await
    }

    async fn chunk_index_len(
        &mut self,
        tx: &TxHandle,
        file: &BlobHash,
    ) -> Result<usize, StoreError> {
        self.enter(StoreOp::IndexLen).await?;
        self.inner.chunk_index_len(tx, file).await
    }

    async fn metadata_save(&mut self, tx: &TxHandle, meta: &Meta) -> Result<(), StoreError> {
        self.enter(StoreOp::MetaSave).await?;
        self.inner.metadata_save(tx, meta).await
    }
}
