//! Shared test utilities for hoard-engine tests.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hoard_store::{BlobStore, MemoryStore};
use hoard_types::{ChunkPolicy, TxContext};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::config::IngestConfig;
use crate::ingestor::Ingestor;

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// Seeded random bytes, for files that must differ from each other.
pub fn random_data(size: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; size];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

/// Config with tiny chunk bounds so small fixtures produce many chunks.
pub fn small_config() -> IngestConfig {
    IngestConfig {
        chunking: ChunkPolicy {
            window_size: 16,
            min_blob_size: 256,
            max_blob_size: 2048,
        },
        upload_concurrency: 4,
        read_buffer_size: 1000,
        ..IngestConfig::default()
    }
}

pub fn context() -> TxContext {
    TxContext::new("test-client", "session-1")
}

pub fn ingestor(store: Arc<dyn BlobStore>, config: IngestConfig) -> Ingestor {
    Ingestor::from_store(store, config, context()).unwrap()
}

/// Ingestor over a fresh `MemoryStore`, returning both.
pub fn memory_ingestor(config: IngestConfig) -> (MemoryStore, Ingestor) {
    let store = MemoryStore::new();
    let ingestor = ingestor(Arc::new(store.clone()), config);
    (store, ingestor)
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::File::create(&path)
        .unwrap()
        .write_all(data)
        .unwrap();
    path
}
