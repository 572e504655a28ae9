//! Root manifest errors

use thiserror::Error;

/// Errors raised while parsing a root manifest
#[derive(Debug, Error)]
pub enum RootError {
    /// Extended header announces a version this parser does not know
    #[error("unsupported root header version: {0}")]
    UnsupportedVersion(u32),

    /// Block announces more records than the file holds
    #[error("block at offset {offset} needs {needed} bytes, {available} remain")]
    Truncated {
        /// Offset of the block header
        offset: u64,
        /// Bytes required by the block body
        needed: usize,
        /// Bytes left in the file
        available: usize,
    },

    /// Delta decoding produced an id outside the `u32` range
    #[error("file data id out of range: {0}")]
    InvalidFileDataId(i64),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for root operations
pub type Result<T> = std::result::Result<T, RootError>;
