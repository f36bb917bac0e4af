//! Shared test harness for hoard integration tests.
//!
//! Provides [`RandomTree`], a throwaway directory of random files (nested
//! directories, sizes up to 1 MiB, one empty file), and helpers that check
//! what an ingestion run left in a [`MemoryStore`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hoard_engine::{IngestConfig, Ingestor};
use hoard_store::{BlobStore, MemoryStore};
use hoard_types::{BlobHash, Meta, TxContext};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Largest random file generated.
pub const MAX_RANDOM_FILE_SIZE: usize = 2 << 19;

/// Stop growing a tree after this many files.
const MAX_TREE_FILES: usize = 30;

// =========================================================================
// Random file trees
// =========================================================================

/// A temporary directory tree of random files.
pub struct RandomTree {
    dir: tempfile::TempDir,
    files: Vec<PathBuf>,
    rng: StdRng,
}

impl RandomTree {
    /// Build a tree up to `max_depth` levels deep. Same seed, same tree.
    pub fn generate(seed: u64, max_depth: usize) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut tree = Self {
            dir,
            files: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        };
        let root = tree.dir.path().to_path_buf();
        tree.fill_dir(&root, 0, max_depth);
        let empty = root.join("empty");
        std::fs::write(&empty, b"").expect("write empty file");
        tree.files.push(empty);
        tree
    }

    fn fill_dir(&mut self, dir: &Path, depth: usize, max_depth: usize) {
        let nfiles = self.rng.random_range(3..10);
        for _ in 0..nfiles {
            let size = self.rng.random_range(0..MAX_RANDOM_FILE_SIZE);
            let path = dir.join(self.random_name());
            std::fs::write(&path, self.random_bytes(size)).expect("write random file");
            self.files.push(path);

            if depth < max_depth && self.rng.random_bool(0.5) {
                let sub = dir.join(self.random_name());
                std::fs::create_dir(&sub).expect("create sub dir");
                self.fill_dir(&sub, depth + 1, max_depth);
            }
            if self.files.len() > MAX_TREE_FILES {
                return;
            }
        }
    }

    fn random_name(&mut self) -> String {
        format!("{:016x}", self.rng.next_u64())
    }

    pub fn random_bytes(&mut self, size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; size];
        self.rng.fill_bytes(&mut buf);
        buf
    }

    /// Every regular file in the tree.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Write a new file at the tree root and track it.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, data).expect("write file");
        self.files.push(path.clone());
        path
    }

    /// Append random bytes to a file.
    pub fn append(&mut self, path: &Path, len: usize) {
        let mut data = std::fs::read(path).expect("read file");
        data.extend(self.random_bytes(len));
        std::fs::write(path, data).expect("rewrite file");
    }

    /// Insert random bytes in the middle of a file.
    pub fn insert_middle(&mut self, path: &Path, len: usize) {
        let mut data = std::fs::read(path).expect("read file");
        let at = data.len() / 2;
        let extra = self.random_bytes(len);
        data.splice(at..at, extra);
        std::fs::write(path, data).expect("rewrite file");
    }
}

// =========================================================================
// Store checks
// =========================================================================

/// An ingestor over a fresh memory store.
pub fn memory_ingestor(config: IngestConfig) -> (MemoryStore, Ingestor) {
    let store = MemoryStore::new();
    let ingestor = ingestor_for(Arc::new(store.clone()), config);
    (store, ingestor)
}

pub fn ingestor_for(store: Arc<dyn BlobStore>, config: IngestConfig) -> Ingestor {
    let context = TxContext::new("integration", "snapshot");
    Ingestor::from_store(store, config, context).expect("valid config")
}

/// Rebuild a file's bytes from its committed index and stored blobs.
pub fn reconstruct(store: &MemoryStore, reference: &BlobHash) -> Option<Vec<u8>> {
    if *reference == BlobHash::EMPTY {
        return Some(Vec::new());
    }
    let index = store.chunk_index(reference)?;
    let mut data = Vec::new();
    for hash in index.chunk_hashes() {
        data.extend_from_slice(&store.blob(&hash)?);
    }
    Some(data)
}

/// Assert every committed metadata record points at a complete, well-formed
/// index whose blobs are all stored.
pub fn assert_store_consistent(store: &MemoryStore) {
    for meta in store.metas() {
        assert_meta_complete(store, &meta);
    }
    assert_eq!(store.open_transactions(), 0, "transactions left open");
}

fn assert_meta_complete(store: &MemoryStore, meta: &Meta) {
    if meta.reference == BlobHash::EMPTY {
        assert_eq!(meta.size, 0);
        return;
    }
    let index = store
        .chunk_index(&meta.reference)
        .unwrap_or_else(|| panic!("meta {} has no index", meta.name));
    assert!(
        index.is_well_formed(meta.size),
        "index for {} is malformed",
        meta.name
    );
    let data = reconstruct(store, &meta.reference)
        .unwrap_or_else(|| panic!("missing blob for {}", meta.name));
    assert_eq!(BlobHash::from_data(&data), meta.reference);
}
