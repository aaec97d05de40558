use anyhow::{Context, Result};
use atomic_write_file::AtomicWriteFile;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::Payload;

/// File extension for persisted cache entries. Only files bearing it are
/// ever deleted by invalidation.
pub const CACHE_SUFFIX: &str = "tallycache";

/// Bumped whenever eligibility or scoring semantics change, so stale cache
/// entries computed by older engine revisions self-invalidate.
const ENGINE_REVISION: u32 = 3;

/// Current corpus state a cache entry must match to be reusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentHashes {
    pub athletes: String,
    pub leagues: String,
    pub code: String,
}

/// One results document's persisted contribution to the tally board,
/// valid only while all three hashes match current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub athletes_hash: String,
    pub leagues_hash: String,
    pub code_hash: String,
    pub payload: Payload,
}

impl CacheEntry {
    pub fn new(hashes: &CurrentHashes, payload: Payload) -> Self {
        Self {
            athletes_hash: hashes.athletes.clone(),
            leagues_hash: hashes.leagues.clone(),
            code_hash: hashes.code.clone(),
            payload,
        }
    }

    pub fn is_valid(&self, hashes: &CurrentHashes) -> bool {
        self.athletes_hash == hashes.athletes
            && self.leagues_hash == hashes.leagues
            && self.code_hash == hashes.code
    }
}

/// All YAML files under `folder`, sorted by path. Sorting makes every
/// digest traversal-order independent. A missing folder is an empty corpus.
pub fn corpus_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let pattern = folder.join("**").join("*.yaml");
    let pattern = pattern.to_string_lossy();
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid corpus pattern {}", pattern))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to enumerate {}", folder.display()))?;
    files.sort();
    Ok(files)
}

/// Digest of a directory tree's content: SHA-256 over the path-sorted
/// sequence of (path, length, bytes) triples. Identical file sets with
/// identical content always hash identically.
pub fn hash_corpus(folder: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for path in corpus_files(folder)? {
        let content = fs::read(&path)
            .with_context(|| format!("Failed to read {} while hashing corpus", path.display()))?;
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(&content);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Version fingerprint of the engine itself. A crate upgrade or an
/// `ENGINE_REVISION` bump invalidates every cache entry.
pub fn code_fingerprint() -> String {
    let mut hasher = Sha256::new();
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
    hasher.update(ENGINE_REVISION.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Cache entry identifier for one results document: a digest over its path
/// and full content. Filesystem-safe hex token.
pub fn cache_key_for(path: &Path, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update((content.len() as u64).to_le_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

pub fn entry_path(cache_folder: &Path, key: &str) -> PathBuf {
    cache_folder.join(format!("{}.{}", key, CACHE_SUFFIX))
}

/// Load a cache entry if present. An unreadable or corrupt entry is
/// treated as absent; the caller recomputes and overwrites it.
pub fn load_entry(path: &Path) -> Option<CacheEntry> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Persist a cache entry atomically so a crash never leaves a torn file.
pub fn store_entry(path: &Path, entry: &CacheEntry) -> Result<()> {
    let mut file = AtomicWriteFile::open(path)
        .with_context(|| format!("Failed to open cache entry at {}", path.display()))?;
    serde_json::to_writer_pretty(&mut file, entry).context("Failed to serialize cache entry")?;
    file.commit()
        .with_context(|| format!("Failed to write cache entry at {}", path.display()))?;
    Ok(())
}

/// Delete a stale cache entry. Refuses to touch files without the cache
/// suffix; a missing file is fine.
pub fn invalidate(path: &Path) -> Result<()> {
    if path.extension().and_then(|e| e.to_str()) != Some(CACHE_SUFFIX) {
        return Ok(());
    }
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to delete cache entry at {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn sample_payload() -> Payload {
        let mut contributors = BTreeMap::new();
        contributors.insert("alice".to_string(), 90.0);
        let mut payload = Payload::new();
        payload.insert("junior-girls".to_string(), contributors);
        payload
    }

    #[test]
    fn test_corpus_hash_is_creation_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "x: 1\n");
        write(dir.path(), "nested/b.yaml", "y: 2\n");
        let first = hash_corpus(dir.path()).unwrap();

        // Recreate the same tree with the files written in the opposite
        // order; the digest must not notice.
        fs::remove_file(dir.path().join("a.yaml")).unwrap();
        fs::remove_dir_all(dir.path().join("nested")).unwrap();
        write(dir.path(), "nested/b.yaml", "y: 2\n");
        write(dir.path(), "a.yaml", "x: 1\n");
        let second = hash_corpus(dir.path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_corpus_hash_changes_on_content_edit() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "x: 1\n");
        let before = hash_corpus(dir.path()).unwrap();

        write(dir.path(), "a.yaml", "x: 2\n");
        let after = hash_corpus(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_corpus_hash_changes_on_file_set_change() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "x: 1\n");
        let before = hash_corpus(dir.path()).unwrap();

        write(dir.path(), "b.yaml", "");
        let after = hash_corpus(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_missing_folder_is_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let hash = hash_corpus(&dir.path().join("does-not-exist")).unwrap();
        assert_eq!(hash, hex::encode(Sha256::digest(b"")));
    }

    #[test]
    fn test_cache_key_depends_on_path_and_content() {
        let key = cache_key_for(Path::new("results/sprint.yaml"), b"a: 1");
        assert_ne!(key, cache_key_for(Path::new("results/relay.yaml"), b"a: 1"));
        assert_ne!(key, cache_key_for(Path::new("results/sprint.yaml"), b"a: 2"));
        assert_eq!(key, cache_key_for(Path::new("results/sprint.yaml"), b"a: 1"));
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_entry_roundtrip_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let hashes = CurrentHashes {
            athletes: "a".to_string(),
            leagues: "l".to_string(),
            code: code_fingerprint(),
        };
        let entry = CacheEntry::new(&hashes, sample_payload());
        let path = entry_path(dir.path(), "deadbeef");

        store_entry(&path, &entry).unwrap();
        let loaded = load_entry(&path).unwrap();
        assert!(loaded.is_valid(&hashes));
        assert_eq!(loaded.payload, entry.payload);

        let stale = CurrentHashes {
            athletes: "changed".to_string(),
            ..hashes
        };
        assert!(!loaded.is_valid(&stale));
    }

    #[test]
    fn test_corrupt_entry_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = entry_path(dir.path(), "deadbeef");
        fs::write(&path, "not json").unwrap();
        assert!(load_entry(&path).is_none());
    }

    #[test]
    fn test_invalidate_deletes_only_cache_files() {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry_path(dir.path(), "deadbeef");
        fs::write(&entry, "{}").unwrap();
        let other = dir.path().join("keep.yaml");
        fs::write(&other, "x: 1").unwrap();

        invalidate(&entry).unwrap();
        assert!(!entry.exists());

        invalidate(&other).unwrap();
        assert!(other.exists());

        // Deleting an already-absent entry is not an error.
        invalidate(&entry).unwrap();
    }
}
