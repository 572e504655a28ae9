//! Error types for archive and local index parsing

use thiserror::Error;

/// Archive operation result type
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors raised while parsing CDN `.index` or local `.idx` files
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// File is shorter than the structure it must contain
    #[error("truncated index: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes present
        available: usize,
    },

    /// Footer describes a layout this parser does not handle
    #[error("unsupported index footer: {reason}")]
    UnsupportedFooter {
        /// Which footer field is out of range
        reason: String,
    },

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}
