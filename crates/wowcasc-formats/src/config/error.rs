//! Config and BPSV errors

use thiserror::Error;

/// Errors raised while parsing text configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// BPSV document has no header line
    #[error("empty BPSV document")]
    EmptyDocument,

    /// BPSV header field is not `Name!TYPE:len`
    #[error("invalid BPSV header field: {0}")]
    InvalidHeader(String),

    /// BPSV row has a different number of columns than the header
    #[error("row {row} has {actual} columns, header declares {expected}")]
    ColumnCount {
        /// Zero-based row number
        row: usize,
        /// Columns in the header
        expected: usize,
        /// Columns in the row
        actual: usize,
    },

    /// Required config key is absent
    #[error("missing config key: {0}")]
    MissingKey(&'static str),

    /// Config value is not a 32-character hex key
    #[error("invalid key `{value}` for {field}")]
    InvalidKey {
        /// Config key holding the value
        field: &'static str,
        /// Offending text
        value: String,
    },
}
