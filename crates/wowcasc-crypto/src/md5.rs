//! MD5-derived keys and file identifiers

use binrw::{BinRead, BinWrite};
use md5::{Digest, Md5};
use std::fmt;

/// Length in bytes of content and encoding keys
pub const KEY_SIZE: usize = 16;

/// Length of the truncated encoding key used by local `.idx` files
pub const LOCAL_KEY_SIZE: usize = 9;

macro_rules! md5_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; KEY_SIZE]);

        impl $name {
            /// Wrap raw key bytes
            pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self(bytes)
            }

            /// Copy a key out of a slice of exactly [`KEY_SIZE`] bytes
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; KEY_SIZE]>::try_from(bytes).ok().map(Self)
            }

            /// Hash `data` into a key
            pub fn from_data(data: &[u8]) -> Self {
                let digest = Md5::digest(data);
                let mut bytes = [0u8; KEY_SIZE];
                bytes.copy_from_slice(&digest);
                Self(bytes)
            }

            /// Parse from a 32-digit hex string
            pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
                let mut bytes = [0u8; KEY_SIZE];
                hex::decode_to_slice(hex, &mut bytes)?;
                Ok(Self(bytes))
            }

            /// Raw key bytes
            pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }

            /// Lowercase hex form, as used in CDN paths
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

md5_key! {
    /// Content key: MD5 of the decoded file contents
    ContentKey
}

md5_key! {
    /// Encoding key: MD5 of the BLTE header, identifying the stored blob
    EncodingKey
}

impl EncodingKey {
    /// First nine bytes, the form local `.idx` buckets store
    pub fn local_prefix(&self) -> [u8; LOCAL_KEY_SIZE] {
        let mut prefix = [0u8; LOCAL_KEY_SIZE];
        prefix.copy_from_slice(&self.0[..LOCAL_KEY_SIZE]);
        prefix
    }
}

/// Numeric asset identifier used by root manifests
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[brw(little)]
pub struct FileDataId(pub u32);

impl FileDataId {
    /// Create a new `FileDataId`
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw identifier
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileDataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FileDataId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<FileDataId> for u32 {
    fn from(id: FileDataId) -> Self {
        id.0
    }
}
