//! Error types for blob store operations.

/// Errors that can occur while talking to a blob store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A store call failed; the transaction it belonged to must not be committed.
    #[error("store unavailable during {op}: {reason}")]
    Unavailable {
        /// The operation that failed.
        op: &'static str,
        /// Backend-specific description.
        reason: String,
    },

    /// The transaction id is not open on this store.
    #[error("unknown transaction {0}")]
    UnknownTransaction(u64),

    /// The connection pool has been closed.
    #[error("connection pool closed")]
    PoolClosed,

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn unavailable(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            op,
            reason: reason.into(),
        }
    }
}
