//! Ingestion against a store that fails or lies: failed files leave no
//! trace, integrity violations stop the run, and a retry completes it.

use std::sync::Arc;
use std::time::Duration;

use hoard_engine::IngestConfig;
use hoard_integration_tests::{RandomTree, assert_store_consistent, ingestor_for};
use hoard_store::{FaultyStore, MemoryStore, StoreOp};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(120000)]
async fn test_failed_puts_leave_no_partial_files() {
    let tree = RandomTree::generate(555, 1);
    let memory = MemoryStore::new();
    let faulty = Arc::new(
        FaultyStore::new(Arc::new(memory.clone())).latency(Duration::from_micros(200)),
    );
    let ingestor = ingestor_for(faulty.clone(), IngestConfig::default());

    faulty.fail_after(StoreOp::Put, 5);
    let outcome = ingestor.put_files(tree.files().to_vec()).await.unwrap();

    assert!(!outcome.failures.is_empty());
    assert_eq!(
        outcome.files.len() + outcome.failures.len(),
        tree.files().len()
    );
    assert_store_consistent(&memory);

    faulty.heal(StoreOp::Put);
    let retry: Vec<_> = outcome.failures.iter().map(|(p, _)| p.clone()).collect();
    let second = ingestor.put_files(retry).await.unwrap();
    assert!(second.failures.is_empty());
    assert_eq!(
        memory.metas().len(),
        outcome.files.len() + second.files.len()
    );
    assert_store_consistent(&memory);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(120000)]
async fn test_lying_store_stops_the_run() {
    let tree = RandomTree::generate(777, 1);
    let memory = MemoryStore::new();
    let faulty = Arc::new(FaultyStore::new(Arc::new(memory.clone())));
    let ingestor = ingestor_for(faulty.clone(), IngestConfig::default());

    faulty.corrupt_puts(true);
    let err = ingestor
        .put_files(tree.files().to_vec())
        .await
        .unwrap_err();

    assert!(err.is_integrity_violation());
    // Only the empty file can have committed: it never uploads.
    assert!(memory.metas().iter().all(|m| m.size == 0));
}
