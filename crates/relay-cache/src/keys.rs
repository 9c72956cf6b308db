//! Cache key derivation.
//!
//! Keys have the form `{prefix}-{partition}-{hash}` where `hash` is the first
//! 16 hex characters of a sha256 over the toolchain name and the lock file
//! contents. Restore keys widen the match to `{prefix}-{partition}-` and then
//! `{prefix}-`.

use sha2::{Digest, Sha256};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub key: String,
    pub restore_keys: Vec<String>,
}

/// Derive a key from already-read lock file contents.
pub fn derive_key(
    prefix: &str,
    partition: &str,
    toolchain: &str,
    lock_contents: &[&[u8]],
) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(toolchain.as_bytes());
    for contents in lock_contents {
        // Length prefix keeps ["ab", "c"] distinct from ["a", "bc"].
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(contents);
    }
    let hash = hasher.finalize();
    let hash_str = hex::encode(&hash[..8]);

    CacheKey {
        key: format!("{prefix}-{partition}-{hash_str}"),
        restore_keys: vec![format!("{prefix}-{partition}-"), format!("{prefix}-")],
    }
}

/// Derive a key by reading lock files relative to `base_dir`. Missing files
/// hash as empty.
pub fn key_for_files(
    prefix: &str,
    partition: &str,
    toolchain: &str,
    lock_files: &[String],
    base_dir: &Path,
) -> CacheKey {
    let contents: Vec<Vec<u8>> = lock_files
        .iter()
        .map(|f| std::fs::read(base_dir.join(f)).unwrap_or_default())
        .collect();
    let refs: Vec<&[u8]> = contents.iter().map(Vec::as_slice).collect();
    derive_key(prefix, partition, toolchain, &refs)
}

/// Hex sha256 of a payload.
pub fn checksum(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Check if a key matches a prefix pattern.
pub fn matches_prefix(key: &str, prefix: &str) -> bool {
    key.starts_with(prefix)
}

/// Sanitize a key for use in filenames.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_shape() {
        let key = derive_key("v0-rust", "test", "stable", &[b"lock"]);
        assert!(key.key.starts_with("v0-rust-test-"));
        assert_eq!(key.key.len(), "v0-rust-test-".len() + 16);
        assert_eq!(key.restore_keys, vec!["v0-rust-test-", "v0-rust-"]);
    }

    #[test]
    fn test_key_changes_with_lockfile() {
        let a = derive_key("v0-rust", "test", "stable", &[b"serde = 1.0.1"]);
        let b = derive_key("v0-rust", "test", "stable", &[b"serde = 1.0.2"]);
        let c = derive_key("v0-rust", "test", "nightly", &[b"serde = 1.0.1"]);
        assert_ne!(a.key, b.key);
        assert_ne!(a.key, c.key);
        assert_eq!(a, derive_key("v0-rust", "test", "stable", &[b"serde = 1.0.1"]));
    }

    #[test]
    fn test_key_for_missing_files() {
        let dir = std::env::temp_dir().join("relay-no-such-dir");
        let key = key_for_files("v0-rust", "lint", "stable", &["Cargo.lock".into()], &dir);
        assert_eq!(key, derive_key("v0-rust", "lint", "stable", &[b""]));
    }

    #[test]
    fn test_matches_prefix() {
        assert!(matches_prefix("cargo-abc123", "cargo-"));
        assert!(!matches_prefix("npm-abc123", "cargo-"));
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("my/cache/key"), "my_cache_key");
        assert_eq!(sanitize_key("cache:key"), "cache_key");
    }
}
