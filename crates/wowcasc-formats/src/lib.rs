//! Parsers for the formats a CASC client reads
//!
//! Every parser here works on bytes already in memory and performs no I/O.
//! Fetching and caching belong to the client crate.
//!
//! # Supported Formats
//!
//! - **BLTE**: chunked container with raw, zlib, LZ4 and Salsa20-encrypted blocks
//! - **Encoding**: content key to encoding key table
//! - **Root**: FileDataID to content key manifest, legacy and `TSFM` layouts
//! - **Archive**: CDN `.index` files and local `.idx` bucket files
//! - **Config**: build and CDN configs plus BPSV version tables

#![warn(missing_docs)]
#![allow(clippy::cast_possible_wrap)] // Delta-encoded ids are signed on disk
#![allow(clippy::cast_lossless)] // Sometimes clearer than From

pub mod archive;
pub mod blte;
pub mod config;
pub mod encoding;
pub mod root;

pub use archive::{ArchiveError, ArchiveIndex, IndexEntry, LocalEntry, LocalIndex};
pub use blte::{BlteError, BlteReader, DecodeOptions};
pub use config::{BuildConfig, CdnConfig, ConfigError, VersionTable};
pub use encoding::{EncodingEntry, EncodingError, EncodingTable};
pub use root::{ContentFlags, LocaleFlags, RootError, RootLayout, RootMiss, RootTable, RootType};

use thiserror::Error;

/// Any decode failure raised by this crate
#[derive(Debug, Error)]
pub enum FormatError {
    /// BLTE container failure
    #[error(transparent)]
    Blte(#[from] BlteError),

    /// Encoding table failure
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// Root manifest failure
    #[error(transparent)]
    Root(#[from] RootError),

    /// Archive or local index failure
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Config or BPSV failure
    #[error(transparent)]
    Config(#[from] ConfigError),
}
