//! # wowcasc-client
//!
//! Resolve World of Warcraft files by FileDataID or listfile name, from a
//! local installation or straight from the Blizzard CDN.
//!
//! ## Resolution chain
//!
//! ```text
//! FileDataID --root--> content key --encoding--> encoding key
//!     --archive index / .idx--> bytes --BLTE--> file
//! ```
//!
//! Both [`RemoteCasc`] and [`LocalCasc`] implement [`CascSource`], which owns
//! the shared part of that chain. They differ in how a build is discovered
//! and loaded, and in where encoded bytes come from.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wowcasc_client::{CascSource, ClientConfig, FileOptions, MemoryListfile, RemoteCasc};
//! use wowcasc_crypto::FileDataId;
//!
//! # async fn run() -> wowcasc_client::Result<()> {
//! let listfile = std::fs::read_to_string("listfile.csv")?;
//! let mut client = RemoteCasc::new(ClientConfig::from_env())?
//!     .with_products(["wow"])
//!     .with_listfile(Box::new(MemoryListfile::from_text(listfile)));
//! client.init().await?;
//! client.load(0).await?;
//!
//! let data = client.get_file(FileDataId::new(1_375_801), FileOptions::default()).await?;
//! println!("{} bytes", data.len());
//! # Ok(())
//! # }
//! ```
//!
//! A load ends by matching a listfile against the new root and fails when
//! no name matches. Without [`with_listfile`](RemoteCasc::with_listfile) the
//! clients read `listfile.csv` from the cache directory, which the caller
//! has to place there.
//!
//! ## Configuration
//!
//! [`ClientConfig`] carries region, locale, cache directory and network
//! timeouts. It can be built in code, read from `WOWCASC_*` environment
//! variables, or loaded from a JSON file.

#![warn(missing_docs)]

pub mod cache;
pub mod casc;
pub mod cdn;
pub mod config;
pub mod error;
pub mod listfile;
pub mod local;
pub mod remote;
pub mod transport;

pub use cache::DiskCache;
pub use casc::{BuildInfo, CascSource, CascTables, FileOptions, LoadState, Session};
pub use cdn::{CdnEndpoint, ContentType, HostProbe, HttpProbe, format_cdn_key, resolve_fastest_host};
pub use config::ClientConfig;
pub use error::{CascError, LookupReason, Result};
pub use listfile::{Listfile, MemoryListfile, NameIndex};
pub use local::LocalCasc;
pub use remote::{ArchiveTable, CdnServer, RemoteCasc, RemoteStorage, Stage};
pub use transport::HttpClient;
