//! Ingestion configuration, parsed from TOML.

use std::path::Path;

use hoard_store::PoolConfig;
use hoard_types::ChunkPolicy;
use serde::Deserialize;

use crate::error::EngineError;

/// Default number of files ingested concurrently.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 25;

/// Default physical read size for the chunking pass.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Settings for an [`Ingestor`](crate::Ingestor).
///
/// ```toml
/// upload_concurrency = 25
/// read_buffer_size = 65536
///
/// [chunking]
/// window_size = 64
/// min_blob_size = 65536
/// max_blob_size = 1048576
///
/// [pool]
/// max_active = 50
/// max_idle = 50
/// idle_timeout_secs = 240
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Content-defined chunking parameters.
    pub chunking: ChunkPolicy,
    /// Files ingested concurrently by `put_files`.
    pub upload_concurrency: usize,
    /// Bytes read from disk per call during chunking and hashing.
    pub read_buffer_size: usize,
    /// Store connection pool limits.
    pub pool: PoolConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkPolicy::default(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            pool: PoolConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, EngineError> {
        let config: IngestConfig =
            toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let c = &self.chunking;
        if c.window_size == 0 {
            return Err(EngineError::Config("chunking.window_size must be > 0".into()));
        }
        if c.window_size > c.min_blob_size {
            return Err(EngineError::Config(format!(
                "chunking.window_size ({}) must not exceed min_blob_size ({})",
                c.window_size, c.min_blob_size
            )));
        }
        if c.min_blob_size >= c.max_blob_size {
            return Err(EngineError::Config(format!(
                "chunking.min_blob_size ({}) must be below max_blob_size ({})",
                c.min_blob_size, c.max_blob_size
            )));
        }
        if self.upload_concurrency == 0 {
            return Err(EngineError::Config("upload_concurrency must be > 0".into()));
        }
        if self.read_buffer_size == 0 {
            return Err(EngineError::Config("read_buffer_size must be > 0".into()));
        }
        if self.pool.max_active == 0 {
            return Err(EngineError::Config("pool.max_active must be > 0".into()));
        }
        if self.pool.max_idle > self.pool.max_active {
            return Err(EngineError::Config(format!(
                "pool.max_idle ({}) must not exceed max_active ({})",
                self.pool.max_idle, self.pool.max_active
            )));
        }
        Ok(())
    }
}
