//! [`IngestEngine`]: the interface front-ends (CLI, snapshot scheduler)
//! program against instead of the concrete [`Ingestor`].

use std::path::{Path, PathBuf};

use hoard_types::{Meta, WriteResult};

use crate::error::EngineError;
use crate::ingestor::{BatchOutcome, Ingestor};

/// File ingestion operations.
#[async_trait::async_trait]
pub trait IngestEngine: Send + Sync {
    /// Ingest one file and commit its index and metadata.
    async fn put_file(&self, path: &Path) -> Result<(Meta, WriteResult), EngineError>;

    /// Ingest independent files concurrently.
    async fn put_files(&self, paths: Vec<PathBuf>) -> Result<BatchOutcome, EngineError>;
}

#[async_trait::async_trait]
impl IngestEngine for Ingestor {
    async fn put_file(&self, path: &Path) -> Result<(Meta, WriteResult), EngineError> {
        Ingestor::put_file(self, path).await
    }

    async fn put_files(&self, paths: Vec<PathBuf>) -> Result<BatchOutcome, EngineError> {
        Ingestor::put_files(self, paths).await
    }
}
