//! On-disk cache
//!
//! ```text
//! <cache dir>/indices/<archive key>.index   raw CDN archive indices
//! <cache dir>/builds/<build config>/<ekey>  encoding and root blobs of a build
//! <cache dir>/data/<ekey>                   other fetched blobs
//! ```
//!
//! Files are written once through a temporary file and a rename, so a reader
//! never sees a partial entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{CascError, Result};

/// Cache rooted at one directory
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Cache under `root`; directories are created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a cached archive index
    pub fn index_path(&self, archive_key: &str) -> PathBuf {
        self.root.join("indices").join(format!("{archive_key}.index"))
    }

    /// Path of a blob cached for one build
    pub fn build_path(&self, build_key: &str, ekey: &str) -> PathBuf {
        self.root.join("builds").join(build_key).join(ekey)
    }

    /// Path of a cached data blob
    pub fn data_path(&self, ekey: &str) -> PathBuf {
        self.root.join("data").join(ekey)
    }

    /// Read a cached file; a missing or unreadable file is a miss
    pub async fn read(&self, path: &Path) -> Option<Bytes> {
        match tokio::fs::read(path).await {
            Ok(data) => {
                debug!(path = %path.display(), size = data.len(), "cache hit");
                Some(Bytes::from(data))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "cache miss");
                None
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "cache unreadable, refetching");
                None
            }
        }
    }

    /// Write a file unless it already exists
    pub async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        let io = |source| CascError::CacheIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        let tmp = path.with_extension(format!("tmp{}", std::process::id()));
        tokio::fs::write(&tmp, data).await.map_err(io)?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io(err));
        }
        debug!(path = %path.display(), size = data.len(), "cached");
        Ok(())
    }

    /// Drop a cached file so it can be written again
    pub async fn remove(&self, path: &Path) {
        if let Err(err) = tokio::fs::remove_file(path).await {
            debug!(path = %path.display(), error = %err, "cache remove failed");
        }
    }

    /// Write a file, logging instead of failing
    pub async fn store(&self, path: &Path, data: &[u8]) {
        if let Err(err) = self.write(path, data).await {
            warn!(error = %err, "cache write failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let cache = DiskCache::new("/cache");
        assert_eq!(cache.index_path("abcd"), PathBuf::from("/cache/indices/abcd.index"));
        assert_eq!(cache.build_path("b1", "e1"), PathBuf::from("/cache/builds/b1/e1"));
        assert_eq!(cache.data_path("e2"), PathBuf::from("/cache/data/e2"));
    }

    #[tokio::test]
    async fn test_write_once() {
        let dir = tempfile::tempdir().expect("Test operation should succeed");
        let cache = DiskCache::new(dir.path());
        let path = cache.index_path("abcd");

        assert!(cache.read(&path).await.is_none());
        cache.write(&path, b"first").await.expect("Test operation should succeed");
        cache.write(&path, b"second").await.expect("Test operation should succeed");
        assert_eq!(cache.read(&path).await.as_deref(), Some(&b"first"[..]));
    }

    #[tokio::test]
    async fn test_unwritable_cache_is_reported() {
        let dir = tempfile::tempdir().expect("Test operation should succeed");
        let blocker = dir.path().join("indices");
        std::fs::write(&blocker, b"not a directory").expect("Test operation should succeed");

        let cache = DiskCache::new(dir.path());
        let err = cache.write(&cache.index_path("abcd"), b"x").await.unwrap_err();
        assert!(matches!(err, CascError::CacheIo { .. }));
        cache.store(&cache.index_path("abcd"), b"x").await;
    }
}
