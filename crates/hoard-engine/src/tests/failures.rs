//! Store failures and integrity violations: nothing partial becomes visible.

use std::sync::Arc;
use std::time::Duration;

use hoard_store::{FaultyStore, MemoryStore, StoreError, StoreOp};
use hoard_types::BlobHash;

use super::helpers::{ingestor, random_data, small_config, test_data, write_file};
use crate::error::{EngineError, Integrity};

fn faulty_ingestor() -> (MemoryStore, Arc<FaultyStore>, crate::Ingestor) {
    let memory = MemoryStore::new();
    let faulty = Arc::new(FaultyStore::new(Arc::new(memory.clone())));
    let ingestor = ingestor(faulty.clone(), small_config());
    (memory, faulty, ingestor)
}

#[tokio::test]
async fn test_corrupt_store_response_aborts_before_commit() {
    let dir = tempfile::tempdir().unwrap();
    let data = test_data(10_000);
    let path = write_file(dir.path(), "f", &data);
    let (memory, faulty, ingestor) = faulty_ingestor();
    faulty.corrupt_puts(true);

    let err = ingestor.put_file(&path).await.unwrap_err();

    assert!(err.is_integrity_violation());
    assert!(matches!(
        err,
        EngineError::IntegrityViolation(Integrity::BlobHashMismatch { .. })
    ));
    let hash = BlobHash::from_data(&data);
    assert!(memory.chunk_index(&hash).is_none());
    assert!(memory.metas().is_empty());
    assert_eq!(memory.open_transactions(), 0);
    assert_eq!(faulty.calls(StoreOp::Commit), 0);
    assert_eq!(faulty.calls(StoreOp::Abort), 1);
}

#[tokio::test]
async fn test_store_failure_mid_file_leaves_nothing_visible() {
    let dir = tempfile::tempdir().unwrap();
    let data = random_data(20_000, 21);
    let path = write_file(dir.path(), "f", &data);
    let (memory, faulty, ingestor) = faulty_ingestor();
    faulty.fail_after(StoreOp::Put, 2);

    let err = ingestor.put_file(&path).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Store(StoreError::Unavailable { op: "blob_put", .. })
    ));
    let hash = BlobHash::from_data(&data);
    assert!(memory.chunk_index(&hash).is_none());
    assert!(memory.metas().is_empty());
    assert_eq!(memory.open_transactions(), 0);
    // Blobs are durable on put; the two that made it are kept.
    assert_eq!(memory.blob_count(), 2);

    // Retry after the store recovers: the two stored blobs are deduplicated.
    faulty.heal(StoreOp::Put);
    let (_, result) = ingestor.put_file(&path).await.unwrap();
    assert!(!result.already_exists);
    assert!(result.stats.blobs_skipped >= 2);
    assert!(memory.chunk_index(&hash).unwrap().is_well_formed(20_000));
}

#[tokio::test]
async fn test_metadata_save_failure_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "small", b"hello");
    let (memory, faulty, ingestor) = faulty_ingestor();
    faulty.fail(StoreOp::MetaSave);

    let err = ingestor.put_file(&path).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));
    assert!(memory.chunk_index(&BlobHash::from_data(b"hello")).is_none());
    assert_eq!(memory.open_transactions(), 0);
}

#[tokio::test]
async fn test_commit_failure_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "small", b"hello");
    let (memory, faulty, ingestor) = faulty_ingestor();
    faulty.fail(StoreOp::Commit);

    let err = ingestor.put_file(&path).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Store(StoreError::Unavailable { op: "tx_commit", .. })
    ));
    assert!(memory.chunk_index(&BlobHash::from_data(b"hello")).is_none());
    assert!(memory.metas().is_empty());
    // The failed connection is not handed out again.
    assert_eq!(ingestor.pool().idle_count(), 0);
}

#[tokio::test]
async fn test_begin_failure_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "small", b"hello");
    let (memory, faulty, ingestor) = faulty_ingestor();
    faulty.fail(StoreOp::Begin);

    assert!(matches!(
        ingestor.put_file(&path).await,
        Err(EngineError::Store(_))
    ));
    assert_eq!(memory.put_calls(), 0);
}

#[tokio::test]
async fn test_batch_collects_ordinary_failures() {
    let dir = tempfile::tempdir().unwrap();
    let good_a = write_file(dir.path(), "a", &random_data(3_000, 1));
    let good_b = write_file(dir.path(), "b", &random_data(9_000, 2));
    let missing = dir.path().join("missing");
    let (memory, _faulty, ingestor) = faulty_ingestor();

    let outcome = ingestor
        .put_files(vec![good_a, missing.clone(), good_b])
        .await
        .unwrap();

    assert_eq!(outcome.files.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, missing);
    assert!(matches!(outcome.failures[0].1, EngineError::NotFound { .. }));
    assert_eq!(outcome.totals.files_count, 2);
    assert_eq!(outcome.totals.size, 12_000);
    assert!(outcome.totals.is_balanced());
    assert_eq!(memory.metas().len(), 2);
}

#[tokio::test]
async fn test_batch_stops_on_integrity_violation() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..6)
        .map(|i| write_file(dir.path(), &format!("f{i}"), &random_data(4_000, i)))
        .collect();
    let (memory, faulty, ingestor) = faulty_ingestor();
    faulty.corrupt_puts(true);

    let err = ingestor.put_files(paths).await.unwrap_err();
    assert!(err.is_integrity_violation());
    assert!(memory.metas().is_empty());
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_cancelled_ingestion_leaves_nothing_open() {
    let dir = tempfile::tempdir().unwrap();
    let data = random_data(20_000, 33);
    let path = write_file(dir.path(), "f", &data);
    let memory = MemoryStore::new();
    let slow = Arc::new(
        FaultyStore::new(Arc::new(memory.clone())).latency(Duration::from_millis(50)),
    );
    let ingestor = ingestor(slow, small_config());

    let task = {
        let ingestor = ingestor.clone();
        tokio::spawn(async move { ingestor.put_file(&path).await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(memory.open_transactions(), 0);
    assert!(memory.chunk_index(&BlobHash::from_data(&data)).is_none());
    assert!(memory.metas().is_empty());
    assert_eq!(ingestor.pool().idle_count(), 0);
    assert_eq!(ingestor.gate().in_flight(), 0);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_file_changed_between_passes_is_integrity_violation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "f", b"original!!");
    let memory = MemoryStore::new();
    let slow = Arc::new(
        FaultyStore::new(Arc::new(memory.clone())).latency(Duration::from_millis(300)),
    );
    let ingestor = ingestor(slow, small_config());

    // The pre-pass runs before the first store call; rewrite during tx_begin.
    let rewrite = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, b"modified!!").unwrap();
    };
    let (result, ()) = tokio::join!(ingestor.put_file(&path), rewrite);

    let err = result.unwrap_err();
    assert!(err.is_integrity_violation());
    match err {
        EngineError::IntegrityViolation(Integrity::FileHashMismatch { expected, actual }) => {
            assert_eq!(expected, BlobHash::from_data(b"original!!"));
            assert_eq!(actual, BlobHash::from_data(b"modified!!"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(memory.metas().is_empty());
    assert_eq!(memory.open_transactions(), 0);
}
