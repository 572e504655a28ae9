//! TACT key registry
//!
//! Encrypted BLTE blocks name their key with a 64-bit lookup. The textual
//! form of that name is 16 hex digits and the key itself is 32 hex digits.

use std::collections::HashMap;
use std::fmt;

use crate::error::CryptoError;

/// Length of a key name in hex digits
pub const KEY_NAME_HEX_LEN: usize = 16;

/// Length of a key in hex digits
pub const KEY_HEX_LEN: usize = 32;

/// A named symmetric key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TactKey {
    /// Key lookup name
    pub name: u64,
    /// 16-byte key
    pub key: [u8; 16],
}

impl TactKey {
    /// Create a key from its parts
    pub fn new(name: u64, key: [u8; 16]) -> Self {
        Self { name, key }
    }

    /// Parse a key from its textual name and hex value
    pub fn parse(name: &str, hex_key: &str) -> Result<Self, CryptoError> {
        let name = name.trim();
        let hex_key = hex_key.trim();

        if name.len() != KEY_NAME_HEX_LEN {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "key name must be {KEY_NAME_HEX_LEN} hex digits, got {}",
                name.len()
            )));
        }

        if hex_key.len() != KEY_HEX_LEN {
            return Err(CryptoError::InvalidKeySize {
                expected: KEY_HEX_LEN / 2,
                actual: hex_key.len() / 2,
            });
        }

        let id = u64::from_str_radix(name, 16)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid key name: {e}")))?;

        let mut key = [0u8; 16];
        hex::decode_to_slice(hex_key, &mut key)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid key hex: {e}")))?;

        Ok(Self::new(id, key))
    }
}

impl fmt::Display for TactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X} {}", self.name, hex::encode_upper(self.key))
    }
}

/// In-memory registry of TACT keys
#[derive(Debug, Clone, Default)]
pub struct TactKeyStore {
    keys: HashMap<u64, [u8; 16]>,
}

impl TactKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a key.
    ///
    /// Returns `false` without touching the store when either value is
    /// malformed. Registering an existing name replaces its key.
    pub fn add_key(&mut self, name: &str, hex_key: &str) -> bool {
        match TactKey::parse(name, hex_key) {
            Ok(key) => {
                self.insert(key);
                true
            }
            Err(_) => false,
        }
    }

    /// Register an already parsed key
    pub fn insert(&mut self, key: TactKey) {
        self.keys.insert(key.name, key.key);
    }

    /// Look up a key by name
    pub fn get(&self, name: u64) -> Option<&[u8; 16]> {
        self.keys.get(&name)
    }

    /// Whether a key with this name is registered
    pub fn contains(&self, name: u64) -> bool {
        self.keys.contains_key(&name)
    }

    /// Number of registered keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Load keys from text content (`NAME KEY` per line).
    ///
    /// Lines starting with `#` or `//` are comments. Malformed lines are
    /// skipped. Returns the number of keys accepted.
    ///
    /// ```
    /// use wowcasc_crypto::TactKeyStore;
    ///
    /// let mut store = TactKeyStore::new();
    /// let count = store.load_from_txt(
    ///     "# known keys\nFA505078126ACB3E BDC51862ABED79B2DE48C8E7E66C6200\nbogus line\n",
    /// );
    /// assert_eq!(count, 1);
    /// ```
    pub fn load_from_txt(&mut self, content: &str) -> usize {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("//"))
            .filter(|line| {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(name), Some(key)) => self.add_key(name, key),
                    _ => false,
                }
            })
            .count()
    }

    /// Iterate over all keys
    pub fn iter(&self) -> impl Iterator<Item = TactKey> + '_ {
        self.keys.iter().map(|(&name, &key)| TactKey::new(name, key))
    }
}
