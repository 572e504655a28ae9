use binrw::{BinRead, BinWrite};

/// Encoding magic bytes
pub const ENCODING_MAGIC: [u8; 2] = *b"EN";

/// Encoding file header (22 bytes, big-endian)
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(big)]
pub struct EncodingHeader {
    /// Magic bytes: 'EN'
    pub magic: [u8; 2],

    /// Format version
    pub version: u8,

    /// Size of content key hashes
    pub ckey_hash_size: u8,

    /// Size of encoding key hashes
    pub ekey_hash_size: u8,

    /// Content key page size in KiB
    pub ckey_page_size_kb: u16,

    /// Encoding key page size in KiB
    pub ekey_page_size_kb: u16,

    /// Number of content key pages
    pub ckey_page_count: u32,

    /// Number of encoding key pages
    pub ekey_page_count: u32,

    /// Reserved byte
    pub flags: u8,

    /// Size of the encoding spec string block
    pub espec_block_size: u32,
}

impl EncodingHeader {
    /// Serialized size
    pub const SIZE: usize = 22;

    /// Content key page size in bytes
    pub fn ckey_page_size(&self) -> usize {
        usize::from(self.ckey_page_size_kb) * 1024
    }

    /// Size of one entry in the content key page index
    pub fn ckey_index_entry_size(&self) -> usize {
        usize::from(self.ckey_hash_size) + 16
    }
}
