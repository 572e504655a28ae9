//! Text configuration formats
//!
//! Build and CDN configs are `key = value` files addressed by content hash.
//! Version, CDN and `.build.info` tables use the pipe-separated BPSV layout.

pub mod bpsv;
pub mod error;
pub mod kv;

pub use bpsv::{Column, Row, VersionTable};
pub use error::ConfigError;
pub use kv::{BuildConfig, CdnConfig};
