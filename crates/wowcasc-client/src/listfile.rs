//! Name to FileDataID resolution
//!
//! The client only needs one thing from a listfile: a [`NameIndex`] for the
//! root of a freshly loaded build. Anything richer (downloads, search, tree
//! views) lives behind [`Listfile`].

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};
use wowcasc_crypto::FileDataId;

use crate::cache::DiskCache;
use crate::error::{CascError, Result};

/// Source of file names for a build
#[async_trait]
pub trait Listfile: Send + Sync {
    /// Names for the root entries of a build
    ///
    /// The index is published together with the build tables, so a failed
    /// load never disturbs the names of the build already served. An empty
    /// index aborts the load.
    async fn load(
        &self,
        build_key: &str,
        cache: &DiskCache,
        root_entries: &[FileDataId],
    ) -> Result<NameIndex>;
}

/// Lowercase, forward-slash form used as lookup key
pub fn normalize_name(name: &str) -> String {
    name.trim().replace('\\', "/").to_ascii_lowercase()
}

/// Path to FileDataID map of one build
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    names: HashMap<String, FileDataId>,
}

impl NameIndex {
    /// Add a name; the first id registered for a path wins
    pub fn insert(&mut self, name: &str, id: FileDataId) {
        self.names.entry(normalize_name(name)).or_insert(id);
    }

    /// FileDataID of a path
    pub fn file_data_id(&self, name: &str) -> Option<FileDataId> {
        self.names.get(&normalize_name(name)).copied()
    }

    /// Number of names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no names are present
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// In-memory listfile read from `id;name` lines
///
/// Without explicit text, [`Listfile::load`] reads `listfile.csv` from the
/// cache root. Nothing downloads that file: place it there, or build the
/// client with [`MemoryListfile::from_text`].
#[derive(Debug, Clone, Default)]
pub struct MemoryListfile {
    source: Option<String>,
}

impl MemoryListfile {
    /// Listfile backed by `listfile.csv` in the cache directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Listfile backed by the given text
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            source: Some(text.into()),
        }
    }

    /// Parse `id;name` lines; malformed lines are skipped
    pub fn parse(text: &str) -> impl Iterator<Item = (FileDataId, &str)> {
        text.lines().filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (id, name) = line.split_once(';')?;
            let id = id.trim().parse::<u32>().ok()?;
            let name = name.split(';').next()?.trim();
            (!name.is_empty()).then_some((FileDataId::new(id), name))
        })
    }

    /// Location of the listfile read by [`MemoryListfile::new`]
    pub fn cache_path(cache: &DiskCache) -> PathBuf {
        cache.root().join("listfile.csv")
    }
}

#[async_trait]
impl Listfile for MemoryListfile {
    async fn load(
        &self,
        build_key: &str,
        cache: &DiskCache,
        root_entries: &[FileDataId],
    ) -> Result<NameIndex> {
        let text = match &self.source {
            Some(text) => text.clone(),
            None => {
                let path = Self::cache_path(cache);
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| CascError::CacheIo { path, source })?
            }
        };

        let known: BTreeSet<FileDataId> = root_entries.iter().copied().collect();
        let mut names = NameIndex::default();
        let mut skipped = 0usize;
        for (id, name) in Self::parse(&text) {
            if known.contains(&id) {
                names.insert(name, id);
            } else {
                skipped += 1;
            }
        }

        debug!(build_key, named = names.len(), skipped, "listfile loaded");
        if names.is_empty() {
            warn!(build_key, "listfile names no file of this build");
        }
        Ok(names)
    }
}
