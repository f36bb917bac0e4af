//! Ingestion orchestrator.
//!
//! [`Ingestor::put_file`] turns one path into a committed chunk index and
//! metadata record:
//!
//! 1. take an upload gate slot
//! 2. stat the file
//! 3. hash the whole file (pre-pass)
//! 4. check out a pooled connection and open a transaction
//! 5. short-circuit if an index already exists for that hash (or it is empty)
//! 6. otherwise run the chunked or small-file writer
//! 7. verify the writer's hash against the pre-pass, save metadata
//! 8. commit, or abort on any error
//!
//! Nothing staged under the transaction is visible before step 8. A task
//! cancelled mid-transaction drops its connection instead of pooling it, and
//! the store discards the transaction with it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hoard_cas::hash_reader;
use hoard_store::{BlobConn, BlobStore, ConnPool, PooledConn, TxHandle};
use hoard_types::{BlobHash, Meta, TxContext, WriteResult, WriteStats};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::error::{EngineError, Integrity};
use crate::gate::UploadGate;
use crate::writer::{write_chunked, write_small};

/// Result of a batch run over many files.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Files ingested successfully, in completion order.
    pub files: Vec<(PathBuf, Meta, WriteResult)>,
    /// Files that failed with a non-fatal error.
    pub failures: Vec<(PathBuf, EngineError)>,
    /// Merged stats of every successful file.
    pub totals: WriteStats,
}

struct Inner {
    pool: Arc<ConnPool>,
    gate: UploadGate,
    config: IngestConfig,
    context: TxContext,
}

/// The ingestion orchestrator. Cloning is cheap and clones share the pool
/// and upload gate.
#[derive(Clone)]
pub struct Ingestor {
    inner: Arc<Inner>,
}

impl Ingestor {
    /// Build an ingestor over an existing pool and gate.
    pub fn new(
        pool: Arc<ConnPool>,
        gate: UploadGate,
        config: IngestConfig,
        context: TxContext,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                gate,
                config,
                context,
            }),
        })
    }

    /// Build an ingestor with its own pool and gate sized from `config`.
    pub fn from_store(
        store: Arc<dyn BlobStore>,
        config: IngestConfig,
        context: TxContext,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let pool = Arc::new(ConnPool::new(store, config.pool));
        let gate = UploadGate::new(config.upload_concurrency);
        Self::new(pool, gate, config, context)
    }

    pub fn pool(&self) -> &ConnPool {
        &self.inner.pool
    }

    pub fn gate(&self) -> &UploadGate {
        &self.inner.gate
    }

    pub fn config(&self) -> &IngestConfig {
        &self.inner.config
    }

    /// Ingest one file.
    ///
    /// Either everything (index + metadata) is committed and returned, or an
    /// error is returned and the transaction is aborted. Blobs uploaded
    /// before a failure stay stored; they are content-addressed and will be
    /// deduplicated on the next attempt.
    pub async fn put_file(&self, path: &Path) -> Result<(Meta, WriteResult), EngineError> {
        let _permit = self.inner.gate.acquire().await?;

        let metadata = stat_file(path).await?;
        let size = metadata.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| not_found_or_io(path, e))?;
        let (hash, _) = hash_reader(file, self.inner.config.read_buffer_size)
            .await
            .map_err(|e| EngineError::cas(path, e))?;
        info!(path = %path.display(), %hash, size, "ingesting file");

        let mut conn = self.inner.pool.get().await?;
        let tx = match conn.tx_begin(&self.inner.context).await {
            Ok(tx) => tx,
            Err(e) => {
                conn.discard();
                return Err(e.into());
            }
        };
        conn.set_reusable(false);

        let staged = self
            .stage(&mut *conn, &tx, path, hash, size, name, &metadata)
            .await;
        match staged {
            Ok((meta, result)) => match conn.tx_commit(tx).await {
                Ok(()) => {
                    conn.set_reusable(true);
                    info!(
                        path = %path.display(),
                        %hash,
                        already_exists = result.already_exists,
                        blobs_uploaded = result.stats.blobs_uploaded,
                        blobs_skipped = result.stats.blobs_skipped,
                        "file committed"
                    );
                    Ok((meta, result))
                }
                Err(e) => {
                    conn.discard();
                    Err(e.into())
                }
            },
            Err(e) => {
                abort(conn, tx, path, &e).await;
                Err(e)
            }
        }
    }

    /// Steps 5 to 7, all under `tx`.
    #[allow(clippy::too_many_arguments)]
    async fn stage(
        &self,
        conn: &mut dyn BlobConn,
        tx: &TxHandle,
        path: &Path,
        hash: BlobHash,
        size: u64,
        name: String,
        metadata: &std::fs::Metadata,
    ) -> Result<(Meta, WriteResult), EngineError> {
        let config = &self.inner.config;
        let existing = conn.chunk_index_len(tx, &hash).await?;

        let result = if existing > 0 || hash == BlobHash::EMPTY {
            debug!(%hash, entries = existing, "file already known");
            WriteResult::already_known(hash, size, existing.saturating_sub(1) as u64)
        } else if size > config.chunking.min_blob_size as u64 {
            write_chunked(conn, tx, &hash, path, config.chunking, config.read_buffer_size).await?
        } else {
            write_small(conn, tx, &hash, path).await?
        };

        if result.hash != hash {
            error!(
                path = %path.display(),
                expected = %hash,
                actual = %result.hash,
                "file changed or was misread during ingestion"
            );
            return Err(Integrity::FileHashMismatch {
                expected: hash,
                actual: result.hash,
            }
            .into());
        }

        let meta = Meta::for_file(hash, name, result.stats.size, metadata);
        conn.metadata_save(tx, &meta).await?;
        Ok((meta, result))
    }

    /// Ingest many independent files concurrently.
    ///
    /// Concurrency is bounded by the upload gate. Ordinary per-file errors
    /// are collected in [`BatchOutcome::failures`]; an integrity violation
    /// cancels the remaining files and is returned.
    pub async fn put_files(
        &self,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Result<BatchOutcome, EngineError> {
        let mut tasks = JoinSet::new();
        for path in paths {
            let this = self.clone();
            tasks.spawn(async move {
                let result = this.put_file(&path).await;
                (path, result)
            });
        }

        let mut outcome = BatchOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            let (path, result) = match joined {
                Ok(done) => done,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => continue,
            };
            match result {
                Ok((meta, result)) => {
                    outcome.totals.merge(&result.stats);
                    outcome.files.push((path, meta, result));
                }
                Err(e) if e.is_integrity_violation() => {
                    error!(path = %path.display(), error = %e, "aborting batch");
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "file failed");
                    outcome.failures.push((path, e));
                }
            }
        }

        info!(
            files = outcome.files.len(),
            failures = outcome.failures.len(),
            size = outcome.totals.size,
            size_uploaded = outcome.totals.size_uploaded,
            "batch done"
        );
        Ok(outcome)
    }
}

async fn stat_file(path: &Path) -> Result<std::fs::Metadata, EngineError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| not_found_or_io(path, e))?;
    if !metadata.is_file() {
        return Err(EngineError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    Ok(metadata)
}

fn not_found_or_io(path: &Path, e: std::io::Error) -> EngineError {
    if e.kind() == std::io::ErrorKind::NotFound {
        EngineError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        EngineError::io(path, e)
    }
}

/// Abort `tx`. The connection goes back to the pool only if the abort
/// succeeded and the failure did not come from the store.
async fn abort(mut conn: PooledConn, tx: TxHandle, path: &Path, cause: &EngineError) {
    if let Err(e) = conn.tx_abort(tx).await {
        warn!(path = %path.display(), error = %e, "failed to abort transaction");
        conn.discard();
        return;
    }
    conn.set_reusable(!matches!(cause, EngineError::Store(_)));
}
