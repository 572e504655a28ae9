//! Error types for encoding file parsing

use thiserror::Error;

/// Errors raised while parsing an encoding file
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum EncodingError {
    #[error("invalid magic: expected 'EN', got {0:02X?}")]
    InvalidMagic([u8; 2]),

    #[error("unsupported {field} hash size: expected 16, got {value}")]
    InvalidHashSize {
        /// Which hash size field is invalid
        field: &'static str,
        /// The invalid value
        value: u8,
    },

    #[error("invalid page size: {0}")]
    InvalidPageSize(usize),

    #[error("truncated encoding file: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("page {page} entry at offset {offset} overruns the page")]
    EntryOverrun { page: usize, offset: usize },

    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}
