//! Error types for the engine.

use std::path::PathBuf;

use hoard_types::BlobHash;

/// A hash disagreement that indicates corruption or a logic defect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Integrity {
    /// The store computed a different hash for an uploaded blob.
    #[error("blob hash mismatch: computed {local}, store returned {remote}")]
    BlobHashMismatch {
        /// Hash computed locally over the chunk bytes.
        local: BlobHash,
        /// Hash the store reported after the upload.
        remote: BlobHash,
    },

    /// The chunking pass hashed the file differently than the pre-pass.
    #[error("file hash mismatch: expected {expected}, chunked {actual}")]
    FileHashMismatch {
        /// Whole-file hash from the pre-pass.
        expected: BlobHash,
        /// Whole-file hash accumulated while chunking.
        actual: BlobHash,
    },
}

/// Errors that can occur during ingestion.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The source path does not exist.
    #[error("file not found: {}", path.display())]
    NotFound {
        /// Path that was requested.
        path: PathBuf,
    },

    /// The source path exists but is not a regular file.
    #[error("not a regular file: {}", path.display())]
    NotAFile {
        /// Path that was requested.
        path: PathBuf,
    },

    /// Local read failure.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A blob store call failed. The transaction was not committed.
    #[error("store error: {0}")]
    Store(#[from] hoard_store::StoreError),

    /// Hashes disagree. Callers should stop the whole run.
    #[error("integrity violation: {0}")]
    IntegrityViolation(#[from] Integrity),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The upload gate was closed.
    #[error("upload gate closed")]
    GateClosed,
}

impl EngineError {
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, EngineError::IntegrityViolation(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn cas(path: impl Into<PathBuf>, err: hoard_cas::CasError) -> Self {
        match err {
            hoard_cas::CasError::Io(source) => EngineError::io(path, source),
        }
    }
}
