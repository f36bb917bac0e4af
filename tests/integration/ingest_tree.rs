//! Ingest a random file tree end to end, then again unchanged.

use hoard_engine::IngestConfig;
use hoard_integration_tests::{RandomTree, assert_store_consistent, memory_ingestor, reconstruct};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(120000)]
async fn test_tree_round_trip() {
    let tree = RandomTree::generate(42, 2);
    let (store, ingestor) = memory_ingestor(IngestConfig::default());

    let outcome = ingestor.put_files(tree.files().to_vec()).await.unwrap();

    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert_eq!(outcome.files.len(), tree.files().len());
    assert!(outcome.totals.is_balanced());

    for (path, meta, result) in &outcome.files {
        let original = std::fs::read(path).unwrap();
        assert_eq!(meta.size, original.len() as u64);
        assert_eq!(meta.reference, result.hash);
        let rebuilt = reconstruct(&store, &meta.reference).unwrap();
        assert!(rebuilt == original, "{} did not round-trip", path.display());
    }
    assert_store_consistent(&store);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(120000)]
async fn test_second_run_uploads_nothing() {
    let tree = RandomTree::generate(7, 1);
    let (store, ingestor) = memory_ingestor(IngestConfig::default());

    let first = ingestor.put_files(tree.files().to_vec()).await.unwrap();
    let blobs = store.blob_count();
    let puts = store.put_calls();

    let second = ingestor.put_files(tree.files().to_vec()).await.unwrap();

    assert_eq!(second.files.len(), first.files.len());
    assert!(second.files.iter().all(|(_, _, r)| r.already_exists));
    assert_eq!(second.totals.blobs_uploaded, 0);
    assert_eq!(second.totals.size_uploaded, 0);
    assert_eq!(second.totals.size, first.totals.size);
    assert_eq!(second.totals.files_skipped, second.totals.files_count);
    assert_eq!(store.blob_count(), blobs);
    assert_eq!(store.put_calls(), puts);
    assert_store_consistent(&store);
}

#[tokio::test]
async fn test_copies_in_tree_stored_once() {
    let mut tree = RandomTree::generate(3, 0);
    let payload = tree.random_bytes(700_000);
    let a = tree.add_file("copy-a", &payload);
    let b = tree.add_file("copy-b", &payload);
    let (store, ingestor) = memory_ingestor(IngestConfig::default());

    let (_, ra) = ingestor.put_file(&a).await.unwrap();
    let before = store.stored_bytes();
    let (_, rb) = ingestor.put_file(&b).await.unwrap();

    assert!(!ra.already_exists);
    assert!(rb.already_exists);
    assert_eq!(store.stored_bytes(), before);
    assert_eq!(store.metas_for(&ra.hash).len(), 2);
}
