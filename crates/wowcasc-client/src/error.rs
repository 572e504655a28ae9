//! Error types for client operations

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use wowcasc_formats::FormatError;

use crate::casc::LoadState;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, CascError>;

/// Which link of the id to bytes chain was missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupReason {
    /// The FileDataID is not in the root manifest
    NoRootEntry,
    /// The file exists but no variant serves the active locale
    NoEntryForLocale,
    /// The content key is not in the encoding table
    NoEncodingEntry,
    /// The encoding key has no physical storage location
    NoArchiveEntry,
    /// The name is not in the listfile
    NoListfileEntry,
}

impl fmt::Display for LookupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoRootEntry => "no root entry",
            Self::NoEntryForLocale => "no entry for locale",
            Self::NoEncodingEntry => "no encoding entry",
            Self::NoArchiveEntry => "no archive entry",
            Self::NoListfileEntry => "no listfile entry",
        })
    }
}

/// Errors raised by the CASC client
#[derive(Debug, Error)]
pub enum CascError {
    /// A required text document answered with a non-success status
    #[error("failed to fetch {url}: HTTP {status}")]
    ConfigFetch {
        /// Requested URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// Malformed BLTE, encoding, root, index or config data
    #[error("decode error: {0}")]
    Decode(#[from] FormatError),

    /// A lookup failed at one link of the resolution chain
    #[error("lookup failed for {id}: {reason}")]
    Lookup {
        /// Which link was missing
        reason: LookupReason,
        /// FileDataID, name or key that was looked up
        id: String,
    },

    /// No CDN host answered a ping
    #[error("no CDN host responded: {}", hosts.join(", "))]
    HostResolution {
        /// Hosts that were tried
        hosts: Vec<String>,
    },

    /// Local cache read or write failed
    #[error("cache I/O on {}: {source}", path.display())]
    CacheIo {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A lookup was issued before a build finished loading
    #[error("client not ready (state: {state})")]
    NotReady {
        /// Current state
        state: LoadState,
    },

    /// `load` was called with a build index outside the build list
    #[error("build index {index} out of range ({available} builds known)")]
    BuildIndex {
        /// Requested index
        index: usize,
        /// Number of known builds
        available: usize,
    },

    /// The root manifest holds no file
    #[error("root manifest is empty")]
    EmptyRoot,

    /// Locale name is not one of the known client locales
    #[error("unknown locale: {0}")]
    InvalidLocale(String),

    /// The listfile resolved no FileDataID of the loaded root
    #[error("listfile matched no root entry")]
    EmptyListfile,

    /// A required document is missing a field or row
    #[error("missing {what}")]
    Missing {
        /// What was expected
        what: String,
    },

    /// Client configuration file is not valid JSON
    #[error("invalid client config: {0}")]
    Config(#[from] serde_json::Error),

    /// Transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem error outside the cache
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CascError {
    pub(crate) fn lookup(reason: LookupReason, id: impl ToString) -> Self {
        Self::Lookup {
            reason,
            id: id.to_string(),
        }
    }

    pub(crate) fn missing(what: impl Into<String>) -> Self {
        Self::Missing { what: what.into() }
    }

    /// Lookup reason, when this is a lookup failure
    pub fn lookup_reason(&self) -> Option<LookupReason> {
        match self {
            Self::Lookup { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

macro_rules! impl_from_format {
    ($($ty:ty),*) => {
        $(impl From<$ty> for CascError {
            fn from(err: $ty) -> Self {
                Self::Decode(err.into())
            }
        })*
    };
}

impl_from_format!(
    wowcasc_formats::BlteError,
    wowcasc_formats::EncodingError,
    wowcasc_formats::RootError,
    wowcasc_formats::ArchiveError,
    wowcasc_formats::ConfigError
);
