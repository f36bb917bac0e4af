//! Snapshot, modify some files, snapshot again: only changed data uploads.

use hoard_engine::IngestConfig;
use hoard_integration_tests::{RandomTree, assert_store_consistent, memory_ingestor, reconstruct};
use hoard_types::BlobHash;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(120000)]
async fn test_incremental_snapshot_uploads_only_changes() {
    let mut tree = RandomTree::generate(1234, 1);
    let big = tree.random_bytes(3 << 20);
    let big_path = tree.add_file("big.bin", &big);
    let (store, ingestor) = memory_ingestor(IngestConfig::default());

    let first = ingestor.put_files(tree.files().to_vec()).await.unwrap();
    assert!(first.failures.is_empty());
    let metas_after_first = store.metas().len();
    let old_hash = BlobHash::from_data(&big);

    tree.insert_middle(&big_path, 100);
    let new_path = tree.add_file("new.txt", b"freshly added");

    let second = ingestor.put_files(tree.files().to_vec()).await.unwrap();
    assert!(second.failures.is_empty());

    let (_, _, big_result) = second
        .files
        .iter()
        .find(|(p, _, _)| *p == big_path)
        .unwrap();
    assert!(!big_result.already_exists);
    // Only the chunks around the edit are new.
    assert!(big_result.stats.blobs_uploaded <= 3);
    assert!(big_result.stats.size_uploaded < big_result.stats.size / 2);

    let (_, _, new_result) = second
        .files
        .iter()
        .find(|(p, _, _)| *p == new_path)
        .unwrap();
    assert_eq!(new_result.stats.blobs_uploaded, 1);

    let unchanged = second
        .files
        .iter()
        .filter(|(p, _, _)| *p != big_path && *p != new_path)
        .count();
    let known = second
        .files
        .iter()
        .filter(|(_, _, r)| r.already_exists)
        .count();
    assert_eq!(known, unchanged);

    // The previous version stays reachable.
    assert_eq!(reconstruct(&store, &old_hash).unwrap(), big);
    assert_eq!(store.metas().len(), metas_after_first + 2);
    assert_store_consistent(&store);
}

#[tokio::test]
async fn test_append_reuses_prefix_chunks() {
    let mut tree = RandomTree::generate(99, 0);
    let data = tree.random_bytes(2 << 20);
    let path = tree.add_file("log.bin", &data);
    let (store, ingestor) = memory_ingestor(IngestConfig::default());

    let (_, first) = ingestor.put_file(&path).await.unwrap();
    tree.append(&path, 5_000);
    let (_, second) = ingestor.put_file(&path).await.unwrap();

    assert!(second.stats.blobs_skipped >= first.stats.blobs_count - 1);
    assert!(second.stats.blobs_uploaded <= 2);
    let current = std::fs::read(&path).unwrap();
    assert_eq!(current[..data.len()], data[..]);
    assert_eq!(reconstruct(&store, &second.hash).unwrap(), current);
}
