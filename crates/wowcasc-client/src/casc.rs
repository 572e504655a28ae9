//! Build session and the lookups shared by local and remote clients
//!
//! A load builds a fresh [`CascTables`] value stage by stage. Lookups only
//! see it once the load reaches [`LoadState::Ready`], and a failed load
//! leaves the previously published tables in place.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use wowcasc_crypto::{EncodingKey, FileDataId, TactKeyStore};
use wowcasc_formats::blte::{self, DecodeOptions};
use wowcasc_formats::{BuildConfig, EncodingEntry, EncodingTable, LocaleFlags, RootMiss, RootTable};

use crate::error::{CascError, LookupReason, Result};
use crate::listfile::{Listfile, NameIndex};

/// Progress of a build load
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadState {
    /// No build loaded
    Unloaded,
    /// Build and CDN configs parsed
    ConfigsLoaded,
    /// Encoding table parsed
    EncodingLoaded,
    /// Root manifest parsed
    RootLoaded,
    /// Archive indices merged (remote only)
    ArchivesLoaded,
    /// Tables published, lookups allowed
    Ready,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "Unloaded",
            Self::ConfigsLoaded => "ConfigsLoaded",
            Self::EncodingLoaded => "EncodingLoaded",
            Self::RootLoaded => "RootLoaded",
            Self::ArchivesLoaded => "ArchivesLoaded",
            Self::Ready => "Ready",
        };
        f.write_str(name)
    }
}

/// Options for [`CascSource::get_file`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileOptions {
    /// Zero-fill encrypted blocks whose key is unknown instead of failing
    pub partial_decode: bool,
}

/// A build discovered from a version table or `.build.info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    /// Product code, such as `wow` or `wow_classic`
    pub product: String,
    /// Region or branch the row belongs to
    pub region: String,
    /// Build config key
    pub build_config: String,
    /// CDN config key
    pub cdn_config: String,
    /// Version name, such as `11.0.7.58238`
    pub version_name: String,
    /// Product config key, when the row carries one
    pub product_config: Option<String>,
}

/// Tables of one loaded build
#[derive(Debug)]
pub struct CascTables<S> {
    /// Build config key
    pub build_key: String,
    /// Parsed build config
    pub build_config: BuildConfig,
    /// Content key to encoding key table
    pub encoding: EncodingTable,
    /// FileDataID manifest
    pub root: RootTable,
    /// Physical locations of encoded blobs
    pub storage: S,
    /// Listfile names matched against `root`
    pub names: NameIndex,
}

impl<S> CascTables<S> {
    /// Resolve a FileDataID to its encoding entry under `locale`
    pub fn resolve(&self, id: FileDataId, locale: LocaleFlags) -> Result<EncodingEntry> {
        let ckey = self.root.select(id, locale).map_err(|miss| {
            let reason = match miss {
                RootMiss::UnknownId => LookupReason::NoRootEntry,
                RootMiss::NoLocaleMatch => LookupReason::NoEntryForLocale,
            };
            CascError::lookup(reason, id)
        })?;

        self.encoding.get(&ckey).copied().ok_or_else(|| {
            debug!(%id, %ckey, "content key missing from encoding table");
            CascError::lookup(LookupReason::NoEncodingEntry, id)
        })
    }
}

/// State of one client's build session
pub struct Session<S> {
    state: LoadState,
    tables: Option<CascTables<S>>,
    locale: LocaleFlags,
    keys: Arc<RwLock<TactKeyStore>>,
    listfile: Box<dyn Listfile>,
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("locale", &self.locale)
            .field("loaded", &self.tables.is_some())
            .finish_non_exhaustive()
    }
}

impl<S> Session<S> {
    /// Empty session
    pub fn new(locale: LocaleFlags, keys: Arc<RwLock<TactKeyStore>>, listfile: Box<dyn Listfile>) -> Self {
        Self {
            state: LoadState::Unloaded,
            tables: None,
            locale,
            keys,
            listfile,
        }
    }

    /// Current state
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Active locale
    pub fn locale(&self) -> LocaleFlags {
        self.locale
    }

    /// Shared key registry
    pub fn keys(&self) -> &Arc<RwLock<TactKeyStore>> {
        &self.keys
    }

    /// Listfile collaborator
    pub fn listfile(&self) -> &dyn Listfile {
        self.listfile.as_ref()
    }

    pub(crate) fn set_listfile(&mut self, listfile: Box<dyn Listfile>) {
        self.listfile = listfile;
    }

    pub(crate) fn set_keys(&mut self, keys: Arc<RwLock<TactKeyStore>>) {
        self.keys = keys;
    }

    /// Published tables
    pub fn tables(&self) -> Result<&CascTables<S>> {
        match (&self.tables, self.state) {
            (Some(tables), LoadState::Ready) => Ok(tables),
            (_, state) => Err(CascError::NotReady { state }),
        }
    }

    pub(crate) fn advance(&mut self, state: LoadState) {
        debug!(from = %self.state, to = %state, "load state");
        self.state = state;
    }

    pub(crate) fn publish(&mut self, tables: CascTables<S>) {
        info!(
            build = %tables.build_key,
            files = tables.root.len(),
            encodings = tables.encoding.len(),
            names = tables.names.len(),
            "build ready"
        );
        self.tables = Some(tables);
        self.state = LoadState::Ready;
    }

    /// Return to the last published state after a failed load
    pub(crate) fn abort(&mut self) {
        self.state = if self.tables.is_some() {
            LoadState::Ready
        } else {
            LoadState::Unloaded
        };
    }

    fn set_locale(&mut self, locale: LocaleFlags) {
        info!(from = %self.locale, to = %locale, "locale changed");
        self.locale = locale;
    }

    fn cleanup(&mut self) {
        if self.tables.is_none() && self.state == LoadState::Unloaded {
            warn!("cleanup called on an unloaded client");
            return;
        }
        self.tables = None;
        self.state = LoadState::Unloaded;
        info!("build tables released");
    }

    fn decode(&self, data: &[u8], ekey: &EncodingKey, partial: bool) -> Result<Vec<u8>> {
        let keys = self.keys.read();
        let options = DecodeOptions {
            expected: Some(ekey),
            keys: Some(&keys),
            partial,
        };
        Ok(blte::decode(data, &options)?)
    }
}

/// BLTE-decode an encoding file and parse it
pub fn parse_encoding_file(data: &[u8], ekey: &EncodingKey) -> Result<EncodingTable> {
    let decoded = blte::decode(
        data,
        &DecodeOptions {
            expected: Some(ekey),
            ..DecodeOptions::default()
        },
    )?;
    Ok(EncodingTable::parse(&decoded)?)
}

/// BLTE-decode a root file and parse it, returning the table and its file count
///
/// A root without files cannot serve any lookup and is rejected.
pub fn parse_root_file(data: &[u8], ekey: &EncodingKey, keys: &TactKeyStore) -> Result<(RootTable, usize)> {
    let decoded = blte::decode(
        data,
        &DecodeOptions {
            expected: Some(ekey),
            keys: Some(keys),
            partial: false,
        },
    )?;
    let root = RootTable::parse(&decoded)?;
    let count = root.len();
    if count == 0 {
        return Err(CascError::EmptyRoot);
    }
    debug!(files = count, blocks = root.types().len(), "root parsed");
    Ok((root, count))
}

/// A CASC build source: a local installation or the CDN
///
/// Implementors provide the session and physical reads; the resolution
/// chain is shared.
#[async_trait]
pub trait CascSource: Send + Sync {
    /// Physical location table of this source
    type Storage: Send + Sync;

    /// Session state
    fn session(&self) -> &Session<Self::Storage>;

    /// Mutable session state
    fn session_mut(&mut self) -> &mut Session<Self::Storage>;

    /// Read the encoded bytes of a blob
    async fn read_encoded(&self, tables: &CascTables<Self::Storage>, ekey: &EncodingKey) -> Result<Bytes>;

    /// Current load state
    fn state(&self) -> LoadState {
        self.session().state()
    }

    /// Active locale
    fn locale(&self) -> LocaleFlags {
        self.session().locale()
    }

    /// Change the locale used by later lookups
    fn set_locale(&mut self, locale: LocaleFlags) {
        self.session_mut().set_locale(locale);
    }

    /// Release the loaded tables; a second call only logs a warning
    fn cleanup(&mut self) {
        self.session_mut().cleanup();
    }

    /// Encoding key and decoded size of a file, without fetching it
    fn file_encoding_info(&self, id: FileDataId) -> Result<EncodingEntry> {
        let session = self.session();
        session.tables()?.resolve(id, session.locale())
    }

    /// FileDataIDs that resolve under the active locale, ascending
    fn get_valid_root_entries(&self) -> Result<Vec<FileDataId>> {
        let session = self.session();
        Ok(session.tables()?.root.valid_ids(session.locale()))
    }

    /// Fetch and decode a file
    async fn get_file(&self, id: FileDataId, options: FileOptions) -> Result<Vec<u8>> {
        let session = self.session();
        let tables = session.tables()?;
        let entry = tables.resolve(id, session.locale())?;
        debug!(%id, ekey = %entry.ekey, size = entry.size, "resolved file");

        let data = self.read_encoded(tables, &entry.ekey).await?;
        session.decode(&data, &entry.ekey, options.partial_decode)
    }

    /// Fetch and decode a file by listfile name
    async fn get_file_by_name(&self, name: &str, options: FileOptions) -> Result<Vec<u8>> {
        let id = self
            .session()
            .tables()?
            .names
            .file_data_id(name)
            .ok_or_else(|| CascError::lookup(LookupReason::NoListfileEntry, name))?;
        self.get_file(id, options).await
    }
}

/// Parse a locale name from configuration
pub fn parse_locale(name: &str) -> Result<LocaleFlags> {
    name.parse()
        .map_err(|_| CascError::InvalidLocale(name.to_string()))
}
