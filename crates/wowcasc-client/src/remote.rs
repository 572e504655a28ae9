//! CDN-backed client
//!
//! Discovery reads the `versions` table of every known product. Loading a
//! build runs a fixed list of stages:
//!
//! 1. `ServerConfig`: the `cdns` row of the region
//! 2. `ResolveHost`: fastest host of that row
//! 3. `Configs`: CDN and build configs
//! 4. `Archives`: every archive index, cache first
//! 5. `Encoding`: encoding table
//! 6. `Root`: root manifest
//! 7. `Listfile`: names for the new root
//!
//! Each stage only consumes what the previous ones produced, and nothing is
//! visible to lookups until the last one succeeds.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use wowcasc_crypto::{EncodingKey, TactKeyStore};
use wowcasc_formats::{ArchiveIndex, BlteReader, BuildConfig, CdnConfig, EncodingTable, RootTable, VersionTable};

use crate::cache::DiskCache;
use crate::casc::{
    BuildInfo, CascSource, CascTables, LoadState, Session, parse_encoding_file, parse_locale,
    parse_root_file,
};
use crate::cdn::{CdnEndpoint, ContentType, HostProbe, HttpProbe, resolve_fastest_host};
use crate::config::ClientConfig;
use crate::error::{CascError, LookupReason, Result};
use crate::listfile::{Listfile, MemoryListfile};
use crate::transport::HttpClient;

/// Products queried during discovery
pub const PRODUCTS: &[&str] = &[
    "wow",
    "wowt",
    "wow_beta",
    "wow_classic",
    "wow_classic_beta",
    "wow_classic_era",
    "wowxptr",
];

/// Named step of a remote load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetch the `cdns` table
    ServerConfig,
    /// Ping the CDN hosts
    ResolveHost,
    /// Fetch build and CDN configs
    Configs,
    /// Fetch archive indices
    Archives,
    /// Fetch and parse the encoding table
    Encoding,
    /// Fetch and parse the root manifest
    Root,
    /// Load the listfile
    Listfile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// CDN server row for one region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnServer {
    /// Product path, such as `tpr/wow`
    pub path: String,
    /// Candidate hosts
    pub hosts: Vec<String>,
}

/// Position of a blob inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLocation {
    /// Index into [`ArchiveTable::archive_keys`]
    pub archive: u32,
    /// Byte offset
    pub offset: u64,
    /// Encoded size
    pub size: u64,
}

/// Union of all archive indices of a build
#[derive(Debug, Clone, Default)]
pub struct ArchiveTable {
    archive_keys: Vec<String>,
    entries: HashMap<EncodingKey, ArchiveLocation>,
}

impl ArchiveTable {
    /// Add an archive's entries; keys already present are kept
    pub fn insert(&mut self, archive_key: &str, index: ArchiveIndex) {
        let archive = self.archive_keys.len() as u32;
        self.archive_keys.push(archive_key.to_string());
        for entry in index.into_entries() {
            self.entries.entry(entry.ekey).or_insert(ArchiveLocation {
                archive,
                offset: entry.offset,
                size: entry.size,
            });
        }
    }

    /// Archive key and location of a blob
    pub fn get(&self, ekey: &EncodingKey) -> Option<(&str, ArchiveLocation)> {
        let location = *self.entries.get(ekey)?;
        let key = self.archive_keys.get(location.archive as usize)?;
        Some((key.as_str(), location))
    }

    /// Archives merged so far
    pub fn archive_keys(&self) -> &[String] {
        &self.archive_keys
    }

    /// Number of indexed blobs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no blob is indexed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Remote tables: archive index plus the endpoint they were fetched from
#[derive(Debug)]
pub struct RemoteStorage {
    /// CDN endpoint of the build
    pub endpoint: CdnEndpoint,
    /// Merged archive indices
    pub archives: ArchiveTable,
}

/// Client reading builds from the Blizzard CDN
pub struct RemoteCasc {
    config: ClientConfig,
    http: HttpClient,
    cache: DiskCache,
    probe: Box<dyn HostProbe>,
    products: Vec<String>,
    builds: Vec<BuildInfo>,
    session: Session<RemoteStorage>,
}

impl fmt::Debug for RemoteCasc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCasc")
            .field("region", &self.config.region)
            .field("products", &self.products)
            .field("builds", &self.builds.len())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl RemoteCasc {
    /// Client for all known products, probing hosts over HTTP
    ///
    /// File names come from `listfile.csv` in the cache directory unless
    /// [`with_listfile`](Self::with_listfile) supplies another source.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = HttpClient::new(&config)?;
        let locale = parse_locale(&config.locale)?;
        Ok(Self {
            cache: DiskCache::new(config.cache_dir.clone()),
            probe: Box::new(HttpProbe::new(http.clone())),
            products: PRODUCTS.iter().map(ToString::to_string).collect(),
            builds: Vec::new(),
            session: Session::new(
                locale,
                Arc::new(RwLock::new(TactKeyStore::new())),
                Box::new(MemoryListfile::new()),
            ),
            http,
            config,
        })
    }

    /// Replace the host prober
    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn HostProbe>) -> Self {
        self.probe = probe;
        self
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

    /// Restrict discovery to the given products
    #[must_use]
    pub fn with_products<I, P>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.products = products.into_iter().map(Into::into).collect();
        self
    }

    /// Shared key registry
    pub fn keys(&self) -> &Arc<RwLock<TactKeyStore>> {
        self.session.keys()
    }

    /// Disk cache
    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Builds found by the last [`init`](Self::init)
    pub fn builds(&self) -> &[BuildInfo] {
        &self.builds
    }

    /// Discover builds of every product for the configured region
    ///
    /// A product whose version table cannot be fetched or parsed is logged
    /// and left out.
    pub async fn init(&mut self) -> Result<&[BuildInfo]> {
        let base = self.config.patch_base();
        let results = join_all(
            self.products
                .iter()
                .map(|product| self.fetch_versions(&base, product)),
        )
        .await;

        let mut builds = Vec::new();
        for (product, result) in self.products.iter().zip(results) {
            match result {
                Ok(found) => {
                    debug!(product, builds = found.len(), "product discovered");
                    builds.extend(found);
                }
                Err(err) => warn!(product, error = %err, "product discovery failed"),
            }
        }

        info!(builds = builds.len(), region = %self.config.region, "discovery finished");
        self.builds = builds;
        Ok(&self.builds)
    }

    async fn fetch_versions(&self, base: &str, product: &str) -> Result<Vec<BuildInfo>> {
        let text = self.http.get_text(&format!("{base}{product}/versions")).await?;
        let table = VersionTable::parse(&text)?;
        Ok(table
            .rows()
            .filter(|row| row.get("Region") == Some(self.config.region.as_str()))
            .filter_map(|row| {
                Some(BuildInfo {
                    product: product.to_string(),
                    region: self.config.region.clone(),
                    build_config: row.get_non_empty("BuildConfig")?.to_string(),
                    cdn_config: row.get_non_empty("CDNConfig")?.to_string(),
                    version_name: row.get("VersionsName").unwrap_or_default().to_string(),
                    product_config: row.get_non_empty("ProductConfig").map(str::to_string),
                })
            })
            .collect())
    }

    /// Load a discovered build
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
        info!(product = %build.product, version = %build.version_name, "loading build");

        match self.run_stages(&build).await {
            Ok(tables) => {
                self.session.publish(tables);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "build load failed");
                self.session.abort();
                Err(err)
            }
        }
    }

    async fn run_stages(&mut self, build: &BuildInfo) -> Result<CascTables<RemoteStorage>> {
        let server = self.server_config(&build.product).await?;
        stage_done(Stage::ServerConfig);

        let endpoint = self.resolve_host(&server).await?;
        stage_done(Stage::ResolveHost);

        let (build_config, cdn_config) = self.fetch_configs(&endpoint, build).await?;
        self.session.advance(LoadState::ConfigsLoaded);
        stage_done(Stage::Configs);

        let archives = self.load_archives(&endpoint, &cdn_config).await;
        self.session.advance(LoadState::ArchivesLoaded);
        stage_done(Stage::Archives);

        let storage = RemoteStorage { endpoint, archives };
        let encoding = self.load_encoding(&storage, &build.build_config, &build_config).await?;
        self.session.advance(LoadState::EncodingLoaded);
        stage_done(Stage::Encoding);

        let root = self
            .load_root(&storage, &build.build_config, &build_config, &encoding)
            .await?;
        self.session.advance(LoadState::RootLoaded);
        stage_done(Stage::Root);

        let ids: Vec<_> = root.file_data_ids().collect();
        let names = self
            .session
            .listfile()
            .load(&build.build_config, &self.cache, &ids)
            .await?;
        if names.is_empty() {
            return Err(CascError::EmptyListfile);
        }
        stage_done(Stage::Listfile);

        Ok(CascTables {
            build_key: build.build_config.clone(),
            build_config,
            encoding,
            root,
            storage,
            names,
        })
    }

    /// Fetch the `cdns` table of a product and pick the configured region
    pub async fn server_config(&self, product: &str) -> Result<CdnServer> {
        let url = format!("{}{product}/cdns", self.config.patch_base());
        let table = VersionTable::parse(&self.http.get_text(&url).await?)?;
        let row = table
            .find("Name", &self.config.region)
            .ok_or_else(|| CascError::missing(format!("cdns row for region {}", self.config.region)))?;

        let path = row
            .get_non_empty("Path")
            .ok_or_else(|| CascError::missing("cdns Path column"))?;
        let hosts: Vec<String> = row
            .get("Hosts")
            .unwrap_or_default()
            .split_whitespace()
            .map(ToString::to_string)
            .collect();
        if hosts.is_empty() {
            return Err(CascError::HostResolution { hosts });
        }

        Ok(CdnServer {
            path: path.to_string(),
            hosts,
        })
    }

    async fn resolve_host(&self, server: &CdnServer) -> Result<CdnEndpoint> {
        let host = resolve_fastest_host(self.probe.as_ref(), &server.hosts).await?;
        CdnEndpoint::from_host(&host, &server.path)
    }

    async fn fetch_configs(&self, endpoint: &CdnEndpoint, build: &BuildInfo) -> Result<(BuildConfig, CdnConfig)> {
        let cdn_url = endpoint.key_url(ContentType::Config, &build.cdn_config, "")?;
        let build_url = endpoint.key_url(ContentType::Config, &build.build_config, "")?;
        let (cdn_text, build_text) =
            futures::try_join!(self.http.get_text(&cdn_url), self.http.get_text(&build_url))?;
        let build_config = BuildConfig::parse(&build_text);
        if let Some(name) = build_config.build_name() {
            info!(build = name, "configs fetched");
        }
        Ok((build_config, CdnConfig::parse(&cdn_text)))
    }

    async fn load_archives(&self, endpoint: &CdnEndpoint, cdn_config: &CdnConfig) -> ArchiveTable {
        let keys = cdn_config.archives();
        let mut results: Vec<(usize, Result<ArchiveIndex>)> = stream::iter(keys.iter().enumerate())
            .map(|(position, key)| async move { (position, self.archive_index_at(endpoint, key).await) })
            .buffer_unordered(self.config.archive_fanout.max(1))
            .collect()
            .await;
        results.sort_by_key(|(position, _)| *position);

        let mut table = ArchiveTable::default();
        for (position, result) in results {
            match result {
                Ok(index) => table.insert(&keys[position], index),
                Err(err) => warn!(archive = %keys[position], error = %err, "archive index skipped"),
            }
        }
        info!(archives = table.archive_keys().len(), blobs = table.len(), "archive indices merged");
        table
    }

    /// Fetch an archive index of the loaded build, cache first
    pub async fn get_archive_index(&self, archive_key: &str) -> Result<ArchiveIndex> {
        let tables = self.session.tables()?;
        self.archive_index_at(&tables.storage.endpoint, archive_key).await
    }

    async fn archive_index_at(&self, endpoint: &CdnEndpoint, archive_key: &str) -> Result<ArchiveIndex> {
        let path = self.cache.index_path(archive_key);
        if let Some(data) = self.cache.read(&path).await {
            match ArchiveIndex::parse(&data) {
                Ok(index) => return Ok(index),
                Err(err) => {
                    warn!(archive = archive_key, error = %err, "cached index unreadable, refetching");
                    self.cache.remove(&path).await;
                }
            }
        }

        let data = self
            .http
            .get_bytes(&endpoint.key_url(ContentType::Data, archive_key, ".index")?)
            .await?;
        self.cache.store(&path, &data).await;
        Ok(ArchiveIndex::parse(&data)?)
    }

    async fn load_encoding(
        &self,
        storage: &RemoteStorage,
        build_key: &str,
        build_config: &BuildConfig,
    ) -> Result<EncodingTable> {
        let ekey = build_config.encoding_key()?;
        let path = self.cache.build_path(build_key, &ekey.to_hex());
        let data = self.fetch_blob(storage, &ekey, path).await?;
        let encoding = parse_encoding_file(&data, &ekey)?;
        debug!(entries = encoding.len(), "encoding parsed");
        Ok(encoding)
    }

    async fn load_root(
        &self,
        storage: &RemoteStorage,
        build_key: &str,
        build_config: &BuildConfig,
        encoding: &EncodingTable,
    ) -> Result<RootTable> {
        let ckey = build_config.root()?;
        let entry = encoding
            .get(&ckey)
            .ok_or_else(|| CascError::lookup(LookupReason::NoEncodingEntry, ckey))?;
        let path = self.cache.build_path(build_key, &entry.ekey.to_hex());
        let data = self.fetch_blob(storage, &entry.ekey, path).await?;
        let keys = self.session.keys().read();
        let (root, _) = parse_root_file(&data, &entry.ekey, &keys)?;
        Ok(root)
    }

    /// Encoded bytes of a blob: the cache, then an archive range, then a loose file
    ///
    /// A cached copy that does not match its encoding key is dropped and
    /// downloaded again.
    async fn fetch_blob(&self, storage: &RemoteStorage, ekey: &EncodingKey, cache_path: PathBuf) -> Result<Bytes> {
        if let Some(data) = self.cache.read(&cache_path).await {
            let verified = BlteReader::new(&data).and_then(|reader| reader.verify(ekey));
            match verified {
                Ok(()) => return Ok(data),
                Err(err) => {
                    warn!(%ekey, error = %err, "cached blob failed verification, refetching");
                    self.cache.remove(&cache_path).await;
                }
            }
        }

        let data = match storage.archives.get(ekey) {
            Some((archive_key, location)) => {
                debug!(%ekey, archive = archive_key, offset = location.offset, "archive member");
                let url = storage.endpoint.key_url(ContentType::Data, archive_key, "")?;
                self.http.get_range(&url, location.offset, location.size).await?
            }
            None => {
                let url = storage.endpoint.key_url(ContentType::Data, &ekey.to_hex(), "")?;
                match self.http.get_bytes(&url).await {
                    Err(CascError::ConfigFetch { status: 404, .. }) => {
                        return Err(CascError::lookup(LookupReason::NoArchiveEntry, ekey));
                    }
                    other => other?,
                }
            }
        };

        self.cache.store(&cache_path, &data).await;
        Ok(data)
    }

    /// Fetch `<host>data/<path>` of the loaded build
    pub async fn get_data_file(&self, path: &str) -> Result<Bytes> {
        let tables = self.session.tables()?;
        let url = tables.storage.endpoint.url(&format!("data/{path}"))?;
        self.http.get_bytes(&url).await
    }

    /// Fetch `len` bytes at `offset` of `<host>data/<path>`
    pub async fn get_data_file_range(&self, path: &str, offset: u64, len: u64) -> Result<Bytes> {
        let tables = self.session.tables()?;
        let url = tables.storage.endpoint.url(&format!("data/{path}"))?;
        self.http.get_range(&url, offset, len).await
    }
}

fn stage_done(stage: Stage) {
    info!(%stage, "stage complete");
}

#[async_trait]
impl CascSource for RemoteCasc {
    type Storage = RemoteStorage;

    fn session(&self) -> &Session<RemoteStorage> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session<RemoteStorage> {
        &mut self.session
    }

    async fn read_encoded(&self, tables: &CascTables<RemoteStorage>, ekey: &EncodingKey) -> Result<Bytes> {
        let path = self.cache.data_path(&ekey.to_hex());
        self.fetch_blob(&tables.storage, ekey, path).await
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use wowcasc_formats::archive::{IndexEntry, build_index};

    fn index(entries: &[(u8, u64, u64)]) -> ArchiveIndex {
        let entries: Vec<IndexEntry> = entries
            .iter()
            .map(|&(byte, size, offset)| IndexEntry {
                ekey: EncodingKey::from_bytes([byte; 16]),
                size,
                offset,
            })
            .collect();
        ArchiveIndex::parse(&build_index(&entries)).expect("Test operation should succeed")
    }

    #[test]
    fn test_archive_table_first_seen_wins() {
        let mut table = ArchiveTable::default();
        table.insert("aaaa", index(&[(1, 10, 0), (2, 20, 10)]));
        table.insert("bbbb", index(&[(2, 99, 99), (3, 30, 0)]));

        assert_eq!(table.len(), 3);
        let (key, location) = table.get(&EncodingKey::from_bytes([2; 16])).expect("Test operation should succeed");
        assert_eq!(key, "aaaa");
        assert_eq!(location.offset, 10);
        let (key, _) = table.get(&EncodingKey::from_bytes([3; 16])).expect("Test operation should succeed");
        assert_eq!(key, "bbbb");
        assert!(table.get(&EncodingKey::from_bytes([4; 16])).is_none());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ServerConfig.to_string(), "ServerConfig");
        assert_eq!(Stage::Listfile.to_string(), "Listfile");
    }

    #[tokio::test]
    async fn test_load_requires_known_build() {
        let dir = tempfile::tempdir().expect("Test operation should succeed");
        let config = ClientConfig {
            cache_dir: dir.path().to_path_buf(),
            ..ClientConfig::default()
        };
        let mut client = RemoteCasc::new(config).expect("Test operation should succeed");
        let err = client.load(3).await.unwrap_err();
        assert!(matches!(err, CascError::BuildIndex { index: 3, available: 0 }));
        assert_eq!(client.state(), LoadState::Unloaded);
    }
}
