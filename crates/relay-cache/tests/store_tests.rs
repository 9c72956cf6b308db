//! Cache store behaviour shared by the memory and filesystem backends.

use chrono::{Duration, Utc};
use relay_cache::{
    CacheEntry, CacheMetadata, CacheStore, CompressionType, FilesystemCacheStore,
    MemoryCacheStore, checksum, create_archive, derive_key, extract_archive,
};

fn entry(key: &str, payload: &[u8], age_minutes: i64) -> CacheEntry {
    CacheEntry {
        metadata: CacheMetadata {
            key: key.to_string(),
            checksum: checksum(payload),
            size_bytes: payload.len() as u64,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        },
        payload: payload.to_vec(),
    }
}

async fn assert_restore_semantics(store: &dyn CacheStore) {
    store.put(entry("v0-rust-test-old", b"old", 30)).await.unwrap();
    store.put(entry("v0-rust-test-new", b"new", 5)).await.unwrap();
    store.put(entry("v0-rust-lint-aaa", b"lint", 1)).await.unwrap();

    let restore_keys = vec!["v0-rust-test-".to_string(), "v0-rust-".to_string()];

    // Exact match wins over newer prefix matches.
    let exact = store
        .restore("v0-rust-test-old", &restore_keys)
        .await
        .unwrap()
        .expect("exact hit");
    assert!(exact.exact_match);
    assert_eq!(exact.entry.payload, b"old");

    // First restore key, most recent entry.
    let fallback = store
        .restore("v0-rust-test-missing", &restore_keys)
        .await
        .unwrap()
        .expect("fallback hit");
    assert!(!fallback.exact_match);
    assert_eq!(fallback.entry.key(), "v0-rust-test-new");

    // Second restore key reaches other partitions.
    let wide = store
        .restore("v0-rust-docs-zzz", &["v0-rust-docs-".into(), "v0-rust-".into()])
        .await
        .unwrap()
        .expect("wide hit");
    assert_eq!(wide.entry.key(), "v0-rust-lint-aaa");

    let miss = store
        .restore("v1-node-x", &["v1-node-".into()])
        .await
        .unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn test_memory_restore_fallback() {
    let store = MemoryCacheStore::new();
    assert_restore_semantics(&store).await;
}

#[tokio::test]
async fn test_filesystem_restore_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemCacheStore::new(dir.path());
    assert_restore_semantics(&store).await;
}

#[tokio::test]
async fn test_filesystem_save_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemCacheStore::new(dir.path().join("cache"));

    let ack = store.save("v0/rust:key", b"payload".to_vec()).await.unwrap();
    assert!(ack.written);
    assert_eq!(ack.checksum, checksum(b"payload"));

    let again = store.save("v0/rust:key", b"payload".to_vec()).await.unwrap();
    assert!(!again.written);

    let listed = store.list("v0/").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "v0/rust:key");

    store.delete("v0/rust:key").await.unwrap();
    assert!(store.get("v0/rust:key").await.unwrap().is_none());
    store.delete("v0/rust:key").await.unwrap();
}

#[tokio::test]
async fn test_archived_workspace_survives_store() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(workspace.path().join("target/release")).unwrap();
    std::fs::write(workspace.path().join("target/release/relay"), b"elf").unwrap();

    let key = derive_key("v0-rust", "build", "stable", &[b"lock"]);
    let payload =
        create_archive(&["target".into()], workspace.path(), CompressionType::Zstd).unwrap();

    let store = MemoryCacheStore::new();
    store.save(&key.key, payload).await.unwrap();

    let restored = store
        .restore(&key.key, &key.restore_keys)
        .await
        .unwrap()
        .expect("hit");
    let fresh = tempfile::tempdir().unwrap();
    extract_archive(&restored.entry.payload, fresh.path(), CompressionType::Zstd).unwrap();
    assert_eq!(
        std::fs::read(fresh.path().join("target/release/relay")).unwrap(),
        b"elf"
    );
}
