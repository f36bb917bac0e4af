//! `hoard` — deduplicating file ingestion.
//!
//! Runs the ingestion pipeline against an in-process memory store, so the
//! output is a dry-run estimate of how much data a backup would upload.
//!
//! # Usage
//!
//! ```text
//! hoard put a.iso b.iso            # ingest files, report dedup accounting
//! hoard put -c hoard.toml *.log    # with a config file
//! hoard chunks big.bin             # show content-defined chunk boundaries
//! ```

mod config;
mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hoard_cas::CdcChunker;
use hoard_engine::{IngestEngine, Ingestor};
use hoard_store::MemoryStore;
use hoard_types::{TxContext, format_mod_time};
use tracing::info;

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "hoard", version, about = "Deduplicating file ingestion")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files and report how much would be uploaded.
    Put {
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the chunk boundaries of a file.
    Chunks {
        /// File to split.
        file: PathBuf,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Put { files } => cmd_put(config, files).await,
        Commands::Chunks { file } => cmd_chunks(&config, &file).await,
    }
}

// -----------------------------------------------------------------------
// hoard put
// -----------------------------------------------------------------------

async fn cmd_put(config: CliConfig, files: Vec<PathBuf>) -> Result<()> {
    let store = MemoryStore::new();
    let context = TxContext::new("hoard", format_mod_time(SystemTime::now()));
    let ingestor = Ingestor::from_store(Arc::new(store.clone()), config.ingest, context)?;
    let engine: Arc<dyn IngestEngine> = Arc::new(ingestor);

    info!(files = files.len(), "starting ingestion");
    let start = Instant::now();
    let outcome = engine.put_files(files).await?;
    let elapsed = start.elapsed();

    for (path, meta, result) in &outcome.files {
        let state = if result.already_exists {
            "known"
        } else {
            "new"
        };
        println!(
            "{}  {state:5}  {:>12}  {}",
            meta.reference,
            result.stats.size,
            path.display()
        );
    }
    for (path, err) in &outcome.failures {
        eprintln!("error: {}: {err}", path.display());
    }

    let t = &outcome.totals;
    let ratio = if t.size > 0 {
        t.size_skipped as f64 / t.size as f64 * 100.0
    } else {
        0.0
    };
    println!();
    println!(
        "files:  {} ({} new, {} known)",
        t.files_count, t.files_uploaded, t.files_skipped
    );
    println!(
        "blobs:  {} ({} uploaded, {} deduplicated)",
        t.blobs_count, t.blobs_uploaded, t.blobs_skipped
    );
    println!(
        "bytes:  {} ({} uploaded, {ratio:.1}% deduplicated)",
        t.size, t.size_uploaded
    );
    println!(
        "stored: {} distinct blobs, {} bytes in {:.2}s",
        store.blob_count(),
        store.stored_bytes(),
        elapsed.as_secs_f64()
    );

    if !outcome.failures.is_empty() {
        bail!("{} file(s) failed", outcome.failures.len());
    }
    Ok(())
}

// -----------------------------------------------------------------------
// hoard chunks
// -----------------------------------------------------------------------

async fn cmd_chunks(config: &CliConfig, path: &Path) -> Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let chunker = CdcChunker::new(config.ingest.chunking);
    let chunks = chunker.chunk_stream(file).await?;

    for chunk in &chunks {
        println!("{:>12}  {:>8}  {}", chunk.offset, chunk.data.len(), chunk.hash);
    }
    println!("{} chunks", chunks.len());
    Ok(())
}
