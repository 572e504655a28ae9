//! Client reading a local game installation
//!
//! ```text
//! <install>/.build.info                 BPSV list of installed builds
//! <install>/Data/config/ab/cd/<key>     build configs
//! <install>/Data/data/BBVVVVVVVV.idx    bucket indices, several versions each
//! <install>/Data/data/data.NNN          blobs behind a 30-byte local header
//! ```

use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};
use wowcasc_crypto::{EncodingKey, TactKeyStore};
use wowcasc_formats::archive::latest_index_files;
use wowcasc_formats::{BuildConfig, EncodingTable, LocalIndex, RootTable, VersionTable};

use crate::cache::DiskCache;
use crate::casc::{
    BuildInfo, CascSource, CascTables, LoadState, Session, parse_encoding_file, parse_locale,
    parse_root_file,
};
use crate::cdn::format_cdn_key;
use crate::config::ClientConfig;
use crate::error::{CascError, LookupReason, Result};
use crate::listfile::{Listfile, MemoryListfile};

/// Client over an installed game directory
pub struct LocalCasc {
    install_dir: PathBuf,
    cache: DiskCache,
    builds: Vec<BuildInfo>,
    session: Session<LocalIndex>,
}

impl fmt::Debug for LocalCasc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCasc")
            .field("install_dir", &self.install_dir)
            .field("builds", &self.builds.len())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl LocalCasc {
    /// Open an installation and list the builds of its `.build.info`
    ///
    /// File names come from `listfile.csv` in the cache directory unless
    /// [`with_listfile`](Self::with_listfile) supplies another source.
    pub async fn new(install_dir: impl Into<PathBuf>, config: &ClientConfig) -> Result<Self> {
        let install_dir = install_dir.into();
        let locale = parse_locale(&config.locale)?;

        let info_path = install_dir.join(".build.info");
        let text = tokio::fs::read_to_string(&info_path).await?;
        let table = VersionTable::parse(&text)?;
        let builds: Vec<BuildInfo> = table
            .rows()
            .filter_map(|row| {
                Some(BuildInfo {
                    product: row.get("Product").unwrap_or("wow").to_string(),
                    region: row.get("Branch").unwrap_or_default().to_string(),
                    build_config: row.get_non_empty("Build Key")?.to_string(),
                    cdn_config: row.get("CDN Key").unwrap_or_default().to_string(),
                    version_name: row.get("Version").unwrap_or_default().to_string(),
                    product_config: None,
                })
            })
            .collect();
        info!(install = %install_dir.display(), builds = builds.len(), "installation opened");

        Ok(Self {
            install_dir,
            cache: DiskCache::new(config.cache_dir.clone()),
            builds,
            session: Session::new(
                locale,
                Arc::new(RwLock::new(TactKeyStore::new())),
                Box::new(MemoryListfile::new()),
            ),
        })
    }

    /// Replace the listfile collaborator
    #[must_use]
    pub fn with_listfile(mut self, listfile: Box<dyn Listfile>) -> Self {
        self.session.set_listfile(listfile);
        self
    }

    /// Share a key registry with other clients
    #[must_use]
    pub fn with_keys(mut self, keys: Arc<RwLock<TactKeyStore>>) -> Self {
        self.session.set_keys(keys);
        self
    }

    /// Shared key registry
    pub fn keys(&self) -> &Arc<RwLock<TactKeyStore>> {
        self.session.keys()
    }

    /// Installed builds
    pub fn builds(&self) -> &[BuildInfo] {
        &self.builds
    }

    fn data_dir(&self) -> PathBuf {
        self.install_dir.join("Data").join("data")
    }

    /// Load an installed build
    ///
    /// On failure the previously loaded build, if any, stays usable.
    pub async fn load(&mut self, build_index: usize) -> Result<()> {
        let build = self
            .builds
            .get(build_index)
            .cloned()
            .ok_or(CascError::BuildIndex {
                index: build_index,
                available: self.builds.len(),
            })?;
        info!(version = %build.version_name, "loading local build");

        match self.run_stages(&build).await {
            Ok(tables) => {
                self.session.publish(tables);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "local build load failed");
                self.session.abort();
                Err(err)
            }
        }
    }

    async fn run_stages(&mut self, build: &BuildInfo) -> Result<CascTables<LocalIndex>> {
        let config_path = self
            .install_dir
            .join("Data")
            .join("config")
            .join(format_cdn_key(&build.build_config));
        let build_config = BuildConfig::parse(&tokio::fs::read_to_string(&config_path).await?);
        self.session.advance(LoadState::ConfigsLoaded);

        let index = self.load_indices().await?;

        let ekey = build_config.encoding_key()?;
        let data = self.read_blob(&index, &ekey).await?;
        let encoding: EncodingTable = parse_encoding_file(&data, &ekey)?;
        self.session.advance(LoadState::EncodingLoaded);

        let ckey = build_config.root()?;
        let root_ekey = encoding
            .get(&ckey)
            .ok_or_else(|| CascError::lookup(LookupReason::NoEncodingEntry, ckey))?
            .ekey;
        let data = self.read_blob(&index, &root_ekey).await?;
        let root: RootTable = {
            let keys = self.session.keys().read();
            parse_root_file(&data, &root_ekey, &keys)?.0
        };
        self.session.advance(LoadState::RootLoaded);

        let ids: Vec<_> = root.file_data_ids().collect();
        let names = self
            .session
            .listfile()
            .load(&build.build_config, &self.cache, &ids)
            .await?;
        if names.is_empty() {
            return Err(CascError::EmptyListfile);
        }

        Ok(CascTables {
            build_key: build.build_config.clone(),
            build_config,
            encoding,
            root,
            storage: index,
            names,
        })
    }

    /// Merge the newest `.idx` file of every bucket
    async fn load_indices(&self) -> Result<LocalIndex> {
        let data_dir = self.data_dir();
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&data_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }

        let mut index = LocalIndex::new();
        for name in latest_index_files(names.iter().map(String::as_str)) {
            let path = data_dir.join(name);
            let result = match tokio::fs::read(&path).await {
                Ok(data) => index.merge(&data).map_err(CascError::from),
                Err(err) => Err(err.into()),
            };
            match result {
                Ok(added) => debug!(file = name, added, "index merged"),
                Err(err) => warn!(file = name, error = %err, "index file skipped"),
            }
        }
        info!(entries = index.len(), "local indices loaded");
        Ok(index)
    }

    async fn read_blob(&self, index: &LocalIndex, ekey: &EncodingKey) -> Result<Bytes> {
        let entry = index
            .get(ekey)
            .ok_or_else(|| CascError::lookup(LookupReason::NoArchiveEntry, ekey))?;
        let path = self.data_dir().join(format!("data.{:03}", entry.archive));
        read_span(&path, entry.payload_offset(), entry.payload_size() as usize).await
    }
}

async fn read_span(path: &Path, offset: u64, len: usize) -> Result<Bytes> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

#[async_trait]
impl CascSource for LocalCasc {
    type Storage = LocalIndex;

    fn session(&self) -> &Session<LocalIndex> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session<LocalIndex> {
        &mut self.session
    }

    async fn read_encoded(&self, tables: &CascTables<LocalIndex>, ekey: &EncodingKey) -> Result<Bytes> {
        self.read_blob(&tables.storage, ekey).await
    }
}
