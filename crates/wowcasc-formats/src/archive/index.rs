//! CDN archive index (`<archive key>.index`)
//!
//! Entries live in fixed-size blocks at the start of the file, sorted by
//! encoding key and padded with zeroes. A table of contents (last key and a
//! truncated hash per block) and a 28-byte footer follow.

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};
use wowcasc_crypto::EncodingKey;

use super::error::{ArchiveError, ArchiveResult};

/// Footer of a CDN archive index, read from the last 28 bytes
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct IndexFooter {
    /// Truncated MD5 of the table of contents
    pub toc_hash: [u8; 8],
    /// Format version
    pub version: u8,
    /// Reserved
    pub reserved: [u8; 2],
    /// Block size in KiB
    pub block_size_kb: u8,
    /// Width of the offset field
    pub offset_bytes: u8,
    /// Width of the size field
    pub size_bytes: u8,
    /// Width of the encoding key
    pub key_size: u8,
    /// Width of truncated hashes
    pub checksum_size: u8,
    /// Number of entries across all blocks
    pub num_elements: u32,
    /// Truncated MD5 of the footer
    pub footer_hash: [u8; 8],
}

impl IndexFooter {
    /// Serialized footer size with 8-byte hashes
    pub const SIZE: usize = 28;

    fn validate(&self) -> ArchiveResult<()> {
        let reason = if self.checksum_size != 8 {
            format!("checksum size {}", self.checksum_size)
        } else if usize::from(self.key_size) != wowcasc_crypto::md5::KEY_SIZE {
            format!("key size {}", self.key_size)
        } else if self.block_size_kb == 0 {
            "block size 0".to_string()
        } else if !(1..=8).contains(&self.offset_bytes) {
            format!("offset width {}", self.offset_bytes)
        } else if !(1..=8).contains(&self.size_bytes) {
            format!("size width {}", self.size_bytes)
        } else {
            return Ok(());
        };
        Err(ArchiveError::UnsupportedFooter { reason })
    }

    fn entry_size(&self) -> usize {
        usize::from(self.key_size) + usize::from(self.size_bytes) + usize::from(self.offset_bytes)
    }

    fn block_bytes(&self) -> usize {
        usize::from(self.block_size_kb) * 1024
    }
}

/// One blob inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Encoding key of the blob
    pub ekey: EncodingKey,
    /// Encoded size in bytes
    pub size: u64,
    /// Offset inside the archive
    pub offset: u64,
}

/// Parsed CDN archive index
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    footer: IndexFooter,
    entries: Vec<IndexEntry>,
}

impl ArchiveIndex {
    /// Parse a raw `.index` file
    pub fn parse(data: &[u8]) -> ArchiveResult<Self> {
        if data.len() < IndexFooter::SIZE {
            return Err(ArchiveError::Truncated {
                needed: IndexFooter::SIZE,
                available: data.len(),
            });
        }

        let body_len = data.len() - IndexFooter::SIZE;
        let footer = IndexFooter::read(&mut Cursor::new(&data[body_len..]))?;
        footer.validate()?;

        let entry_size = footer.entry_size();
        let block_bytes = footer.block_bytes();
        let toc_entry = usize::from(footer.key_size) + usize::from(footer.checksum_size);
        let block_count = body_len / (block_bytes + toc_entry);

        let limit = footer.num_elements as usize;
        let mut entries = Vec::new();
        'blocks: for block in data[..block_count * block_bytes].chunks_exact(block_bytes) {
            for raw in block.chunks_exact(entry_size) {
                if entries.len() >= limit {
                    break 'blocks;
                }
                let (key, rest) = raw.split_at(usize::from(footer.key_size));
                if key.iter().all(|&b| b == 0) {
                    break;
                }
                let (size, offset) = rest.split_at(usize::from(footer.size_bytes));
                if let Some(ekey) = EncodingKey::from_slice(key) {
                    entries.push(IndexEntry {
                        ekey,
                        size: read_be_uint(size),
                        offset: read_be_uint(offset),
                    });
                }
            }
        }

        Ok(Self { footer, entries })
    }

    /// Footer fields
    pub fn footer(&self) -> &IndexFooter {
        &self.footer
    }

    /// Entries in file order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Consume the index, yielding its entries
    pub fn into_entries(self) -> Vec<IndexEntry> {
        self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Assemble an index file from entries, for fixtures and re-packing
pub fn build_index(entries: &[IndexEntry]) -> Vec<u8> {
    const BLOCK: usize = 4096;
    const ENTRY: usize = 24;
    let per_block = BLOCK / ENTRY;

    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| a.ekey.cmp(&b.ekey));

    let mut body = Vec::new();
    let mut last_keys = Vec::new();
    for chunk in sorted.chunks(per_block.max(1)) {
        let start = body.len();
        for entry in chunk {
            body.extend_from_slice(entry.ekey.as_bytes());
            body.extend_from_slice(&(entry.size as u32).to_be_bytes());
            body.extend_from_slice(&(entry.offset as u32).to_be_bytes());
        }
        body.resize(start + BLOCK, 0);
        if let Some(last) = chunk.last() {
            last_keys.push(last.ekey);
        }
    }

    let mut toc = Vec::new();
    for key in &last_keys {
        toc.extend_from_slice(key.as_bytes());
    }
    for block in body.chunks(BLOCK) {
        toc.extend_from_slice(&md5::compute(block)[..8]);
    }

    let mut toc_hash = [0u8; 8];
    toc_hash.copy_from_slice(&md5::compute(&toc)[..8]);
    let footer = IndexFooter {
        toc_hash,
        version: 1,
        reserved: [0, 0],
        block_size_kb: 4,
        offset_bytes: 4,
        size_bytes: 4,
        key_size: 16,
        checksum_size: 8,
        num_elements: sorted.len() as u32,
        footer_hash: [0; 8],
    };

    let mut out = body;
    out.extend_from_slice(&toc);
    let mut cursor = Cursor::new(Vec::with_capacity(IndexFooter::SIZE));
    if footer.write(&mut cursor).is_ok() {
        out.extend_from_slice(cursor.get_ref());
    }
    out
}
