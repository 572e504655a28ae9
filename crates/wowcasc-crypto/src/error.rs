//! Error types for key handling and decryption

use thiserror::Error;

/// Errors raised while parsing keys or running a cipher
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material has the wrong length
    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected key size in bytes
        expected: usize,
        /// Actual key size in bytes
        actual: usize,
    },

    /// IV has the wrong length
    #[error("invalid IV size: expected {expected}, got {actual}")]
    InvalidIvSize {
        /// Expected IV size in bytes
        expected: usize,
        /// Actual IV size in bytes
        actual: usize,
    },

    /// Key name or key value is not valid hex
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
}
