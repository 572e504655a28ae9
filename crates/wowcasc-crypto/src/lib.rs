//! Key material for CASC content
//!
//! This crate holds the small primitives every other `wowcasc` crate leans on:
//!
//! - **Keys**: [`ContentKey`], [`EncodingKey`] and [`FileDataId`] newtypes
//! - **Hashing**: MD5 derivation of content and encoding keys
//! - **Encryption**: the 16-byte-key Salsa20 variant used by BLTE `E` blocks
//! - **Key registry**: [`TactKeyStore`], the named symmetric keys for encrypted blocks
//!
//! # Examples
//!
//! ```
//! use wowcasc_crypto::TactKeyStore;
//!
//! let mut store = TactKeyStore::new();
//! assert!(store.add_key("FA505078126ACB3E", "BDC51862ABED79B2DE48C8E7E66C6200"));
//! assert!(!store.add_key("not-a-key", "00"));
//! assert_eq!(store.len(), 1);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod keys;
pub mod md5;
pub mod salsa20;

pub use error::CryptoError;
pub use keys::{TactKey, TactKeyStore};
pub use md5::{ContentKey, EncodingKey, FileDataId};
pub use salsa20::Salsa20Cipher;
