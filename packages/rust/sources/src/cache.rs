//! On-disk cache of downloaded sources: `<root>/<dataset>/source.<ext>`
//! plus a `source.sha256` sidecar.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use annodemo_shared::{AnnoDemoError, Result};

const SOURCE_STEM: &str = "source";
const HASH_FILE: &str = "source.sha256";

/// Cache directory layout for downloaded sources.
#[derive(Debug, Clone)]
pub struct SourceCache {
    root: PathBuf,
}

impl SourceCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding everything cached for `dataset`.
    pub fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.root.join(dataset)
    }

    /// Path of the cached source file for `dataset` with extension `ext`.
    pub fn source_path(&self, dataset: &str, ext: &str) -> PathBuf {
        self.dataset_dir(dataset).join(format!("{SOURCE_STEM}.{ext}"))
    }

    pub fn hash_path(&self, dataset: &str) -> PathBuf {
        self.dataset_dir(dataset).join(HASH_FILE)
    }

    /// Read the cached source, or `NotDownloaded` if it is missing.
    pub fn read(&self, dataset: &str, ext: &str) -> Result<Vec<u8>> {
        let path = self.source_path(dataset, ext);
        if !path.exists() {
            return Err(AnnoDemoError::NotDownloaded {
                dataset: dataset.to_string(),
            });
        }
        std::fs::read(&path).map_err(|e| AnnoDemoError::io(&path, e))
    }

    /// Write the source atomically and record its hash. Returns the hex
    /// SHA-256 of `bytes`.
    pub fn write(&self, dataset: &str, ext: &str, bytes: &[u8]) -> Result<String> {
        let dir = self.dataset_dir(dataset);
        std::fs::create_dir_all(&dir).map_err(|e| AnnoDemoError::io(&dir, e))?;

        let target = self.source_path(dataset, ext);
        let temp = dir.join(format!(".{SOURCE_STEM}.{ext}.tmp"));
        std::fs::write(&temp, bytes).map_err(|e| AnnoDemoError::io(&temp, e))?;
        std::fs::rename(&temp, &target).map_err(|e| AnnoDemoError::io(&target, e))?;

        let hash = compute_hash(bytes);
        let hash_path = self.hash_path(dataset);
        std::fs::write(&hash_path, format!("{hash}\n"))
            .map_err(|e| AnnoDemoError::io(&hash_path, e))?;

        debug!(path = %target.display(), size = bytes.len(), %hash, "cached source");
        Ok(hash)
    }

    /// Stored hash of the cached source; recomputed when the sidecar is
    /// missing.
    pub fn stored_hash(&self, dataset: &str, ext: &str) -> Result<String> {
        let hash_path = self.hash_path(dataset);
        match std::fs::read_to_string(&hash_path) {
            Ok(hash) => Ok(hash.trim().to_string()),
            Err(_) => Ok(compute_hash(&self.read(dataset, ext)?)),
        }
    }
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache() -> SourceCache {
        let dir = std::env::temp_dir().join(format!("annodemo-cache-test-{}", uuid::Uuid::now_v7()));
        SourceCache::new(dir)
    }

    #[test]
    fn missing_source_is_not_downloaded() {
        let cache = temp_cache();
        let err = cache.read("nothing", "txt").unwrap_err();
        assert!(matches!(err, AnnoDemoError::NotDownloaded { dataset } if dataset == "nothing"));
    }

    #[test]
    fn write_then_read_records_hash() {
        let cache = temp_cache();
        let hash = cache.write("book", "txt", b"hello").unwrap();

        assert_eq!(cache.read("book", "txt").unwrap(), b"hello");
        assert_eq!(cache.stored_hash("book", "txt").unwrap(), hash);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(!cache.dataset_dir("book").join(".source.txt.tmp").exists());

        let _ = std::fs::remove_dir_all(cache.root());
    }
}
