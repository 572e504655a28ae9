//! Archive indices
//!
//! - [`ArchiveIndex`]: CDN `.index` files describing the members of one archive
//! - [`LocalIndex`]: `.idx` bucket files of a local installation

pub mod error;
pub mod index;
pub mod local;

pub use error::{ArchiveError, ArchiveResult};
pub use index::{ArchiveIndex, IndexEntry, IndexFooter, build_index};
pub use local::{
    LOCAL_HEADER_SIZE, LocalEntry, LocalIndex, LocalRecord, build_local_index,
    latest_index_files, parse_index_file_name,
};
