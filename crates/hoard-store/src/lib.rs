//! Blob store interface and backend implementations.
//!
//! This crate defines the collaborator the ingestion core talks to:
//!
//! - [`BlobStore`] / [`BlobConn`] — connection factory and per-connection
//!   operations, every data call scoped by an explicit [`TxHandle`].
//! - [`ConnPool`] — bounded pool of health-checked connections.
//! - [`MemoryStore`] — transactional in-memory store.
//! - [`FaultyStore`] — wrapper injecting failures and corrupted responses.

mod error;
mod faulty_store;
mod memory_store;
mod pool;
mod traits;

pub use error::StoreError;
pub use faulty_store::{FaultyStore, StoreOp};
pub use memory_store::MemoryStore;
pub use pool::{ConnPool, PoolConfig, PooledConn};
pub use traits::{BlobConn, BlobStore, TxHandle};
