//! BLTE error types

use thiserror::Error;
use wowcasc_crypto::CryptoError;

/// BLTE decode failure
#[derive(Debug, Error)]
pub enum BlteError {
    /// Container does not start with `BLTE`
    #[error("invalid BLTE magic: expected [42 4C 54 45], got {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// Data ends before a structure it announces
    #[error("truncated BLTE data: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes present
        available: usize,
    },

    /// Header fields are inconsistent
    #[error("invalid BLTE header: {0}")]
    InvalidHeader(String),

    /// Container hash does not match the expected encoding key
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected hash (hex)
        expected: String,
        /// Computed hash (hex)
        actual: String,
    },

    /// Block hash does not match its chunk table entry
    #[error("block {index} checksum mismatch: expected {expected}, got {actual}")]
    BlockChecksumMismatch {
        /// Block index
        index: usize,
        /// Expected hash (hex)
        expected: String,
        /// Computed hash (hex)
        actual: String,
    },

    /// Block decoded to a size other than the one in the chunk table
    #[error("block {index} size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Block index
        index: usize,
        /// Size from the chunk table
        expected: usize,
        /// Decoded size
        actual: usize,
    },

    /// Block mode byte is not recognised
    #[error("unknown block mode: 0x{0:02X}")]
    UnknownMode(u8),

    /// Block mode is recognised but not supported
    #[error("unsupported block mode: 0x{0:02X}")]
    UnsupportedMode(u8),

    /// Encrypted block uses a cipher other than Salsa20
    #[error("unsupported encryption type: 0x{0:02X}")]
    UnsupportedEncryption(u8),

    /// Encrypted block wraps another encrypted block
    #[error("nested encrypted block")]
    NestedEncryption,

    /// Key needed for an encrypted block is not registered
    #[error("missing decryption key: {0:016X}")]
    MissingKey(u64),

    /// Decompression failed
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Cipher setup failed
    #[error("decryption failed: {0}")]
    Crypto(#[from] CryptoError),

    /// I/O error while encoding
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for BLTE operations
pub type BlteResult<T> = Result<T, BlteError>;
