//! Encoding table: content key to encoding key and size
//!
//! The file is a 22-byte header, an encoding spec string block, a page index
//! and then fixed-size pages of content key entries. Each entry lists one or
//! more encoding keys for a content key; the first one is the key the blob is
//! stored under. Encoding key pages follow but are not needed for lookups.

mod error;
mod header;

pub use error::EncodingError;
pub use header::{ENCODING_MAGIC, EncodingHeader};

use binrw::{BinRead, BinWrite};
use binrw::io::Cursor;
use std::collections::HashMap;
use wowcasc_crypto::{ContentKey, EncodingKey};

const HASH_SIZE: u8 = 16;

/// Encoding key and decoded size for one content key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingEntry {
    /// Key of the stored BLTE blob
    pub ekey: EncodingKey,
    /// Decoded size (40-bit on disk)
    pub size: u64,
}

/// Parsed content key table
#[derive(Debug, Clone, Default)]
pub struct EncodingTable {
    entries: HashMap<ContentKey, EncodingEntry>,
}

impl EncodingTable {
    /// Parse an already BLTE-decoded encoding file
    pub fn parse(data: &[u8]) -> Result<Self, EncodingError> {
        if data.len() < EncodingHeader::SIZE {
            return Err(EncodingError::Truncated {
                needed: EncodingHeader::SIZE,
                available: data.len(),
            });
        }
        if data[..2] != ENCODING_MAGIC {
            return Err(EncodingError::InvalidMagic([data[0], data[1]]));
        }

        let header = EncodingHeader::read(&mut Cursor::new(data))?;
        for (field, value) in [
            ("ckey", header.ckey_hash_size),
            ("ekey", header.ekey_hash_size),
        ] {
            if value != HASH_SIZE {
                return Err(EncodingError::InvalidHashSize { field, value });
            }
        }

        let page_size = header.ckey_page_size();
        if page_size == 0 {
            return Err(EncodingError::InvalidPageSize(page_size));
        }

        let page_count = header.ckey_page_count as usize;
        let pages_start = EncodingHeader::SIZE
            + header.espec_block_size as usize
            + page_count * header.ckey_index_entry_size();
        let pages_end = pages_start + page_count * page_size;
        if data.len() < pages_end {
            return Err(EncodingError::Truncated {
                needed: pages_end,
                available: data.len(),
            });
        }

        let mut entries = HashMap::new();
        for (page_index, page) in data[pages_start..pages_end]
            .chunks_exact(page_size)
            .enumerate()
        {
            parse_page(page, page_index, &mut entries)?;
        }

        Ok(Self { entries })
    }

    /// Look up a content key
    pub fn get(&self, ckey: &ContentKey) -> Option<&EncodingEntry> {
        self.entries.get(ckey)
    }

    /// Number of content keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&ContentKey, &EncodingEntry)> {
        self.entries.iter()
    }
}

fn parse_page(
    page: &[u8],
    page_index: usize,
    entries: &mut HashMap<ContentKey, EncodingEntry>,
) -> Result<(), EncodingError> {
    let key_size = usize::from(HASH_SIZE);
    let mut offset = 0;

    while offset < page.len() {
        let key_count = usize::from(page[offset]);
        if key_count == 0 {
            break;
        }

        let entry_len = 1 + 5 + key_size + key_size * key_count;
        let Some(entry) = page.get(offset..offset + entry_len) else {
            return Err(EncodingError::EntryOverrun {
                page: page_index,
                offset,
            });
        };

        let size = entry[1..6]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        let ckey_at = 6;
        let ekey_at = ckey_at + key_size;

        let ckey = ContentKey::from_slice(&entry[ckey_at..ekey_at]);
        let ekey = EncodingKey::from_slice(&entry[ekey_at..ekey_at + key_size]);
        if let (Some(ckey), Some(ekey)) = (ckey, ekey) {
            entries.entry(ckey).or_insert(EncodingEntry { ekey, size });
        }

        offset += entry_len;
    }

    Ok(())
}

/// Serialize content key entries into an encoding file with 4 KiB pages
///
/// Entries are sorted by content key; each gets exactly one encoding key.
/// No encoding key pages are written.
pub fn build_encoding(entries: &[(ContentKey, EncodingEntry)]) -> Result<Vec<u8>, EncodingError> {
    const PAGE_KB: u16 = 4;
    let page_size = usize::from(PAGE_KB) * 1024;
    let entry_len = 1 + 5 + 2 * usize::from(HASH_SIZE);

    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut index = Vec::new();
    let mut pages = Vec::new();
    for chunk in sorted.chunks(page_size / entry_len) {
        let mut page = Vec::with_capacity(page_size);
        for (ckey, entry) in chunk {
            page.push(1);
            page.extend_from_slice(&entry.size.to_be_bytes()[3..]);
            page.extend_from_slice(ckey.as_bytes());
            page.extend_from_slice(entry.ekey.as_bytes());
        }
        page.resize(page_size, 0);
        index.extend_from_slice(chunk[0].0.as_bytes());
        index.extend_from_slice(&*md5::compute(&page));
        pages.extend_from_slice(&page);
    }

    let header = EncodingHeader {
        magic: ENCODING_MAGIC,
        version: 1,
        ckey_hash_size: HASH_SIZE,
        ekey_hash_size: HASH_SIZE,
        ckey_page_size_kb: PAGE_KB,
        ekey_page_size_kb: PAGE_KB,
        ckey_page_count: (pages.len() / page_size) as u32,
        ekey_page_count: 0,
        flags: 0,
        espec_block_size: 0,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(EncodingHeader::SIZE + index.len() + pages.len()));
    header.write(&mut cursor)?;
    let mut data = cursor.into_inner();
    data.extend_from_slice(&index);
    data.extend_from_slice(&pages);
    Ok(data)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(page_count: u32, espec_size: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"EN");
        data.push(1);
        data.push(16);
        data.push(16);
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&page_count.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.push(0);
        data.extend_from_slice(&espec_size.to_be_bytes());
        data
    }

    fn entry(ckey: [u8; 16], size: u64, ekeys: &[[u8; 16]]) -> Vec<u8> {
        let mut data = vec![ekeys.len() as u8];
        data.extend_from_slice(&size.to_be_bytes()[3..]);
        data.extend_from_slice(&ckey);
        for ekey in ekeys {
            data.extend_from_slice(ekey);
        }
        data
    }

    fn file(pages: &[Vec<u8>], espec: &[u8]) -> Vec<u8> {
        let mut data = header(pages.len() as u32, espec.len() as u32);
        data.extend_from_slice(espec);
        for _ in pages {
            data.extend_from_slice(&[0xEE; 32]);
        }
        for page in pages {
            let mut page = page.clone();
            page.resize(1024, 0);
            data.extend_from_slice(&page);
        }
        data
    }

    #[test]
    fn test_single_entry_records_first_ekey() {
        let size = 0x01_2345_6789u64;
        let page = entry([0xC1; 16], size, &[[0xE1; 16], [0xE2; 16]]);
        let table = EncodingTable::parse(&file(&[page], b"z,b:{*=z}\0"))
            .expect("Test operation should succeed");

        assert_eq!(table.len(), 1);
        let found = table
            .get(&ContentKey::from_bytes([0xC1; 16]))
            .expect("entry should exist");
        assert_eq!(
            *found,
            EncodingEntry {
                ekey: EncodingKey::from_bytes([0xE1; 16]),
                size,
            }
        );
    }

    #[test]
    fn test_multiple_pages() {
        let mut first = entry([1; 16], 10, &[[0xA1; 16]]);
        first.extend(entry([2; 16], 20, &[[0xA2; 16]]));
        let second = entry([3; 16], 30, &[[0xA3; 16], [0xB3; 16], [0xC3; 16]]);

        let table = EncodingTable::parse(&file(&[first, second], b""))
            .expect("Test operation should succeed");
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(&ContentKey::from_bytes([3; 16])).map(|e| e.size), Some(30));
        assert_eq!(
            table.get(&ContentKey::from_bytes([2; 16])).map(|e| e.ekey),
            Some(EncodingKey::from_bytes([0xA2; 16]))
        );
    }

    #[test]
    fn test_build_encoding_spans_pages() {
        let entries: Vec<(ContentKey, EncodingEntry)> = (0..300u16)
            .map(|i| {
                let mut ckey = [0u8; 16];
                ckey[..2].copy_from_slice(&i.to_be_bytes());
                (
                    ContentKey::from_bytes(ckey),
                    EncodingEntry {
                        ekey: EncodingKey::from_data(&ckey),
                        size: u64::from(i) << 24,
                    },
                )
            })
            .collect();

        let table = EncodingTable::parse(&build_encoding(&entries).expect("Test operation should succeed")).expect("Test operation should succeed");
        assert_eq!(table.len(), 300);
        for (ckey, entry) in &entries {
            assert_eq!(table.get(ckey), Some(entry));
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut data = file(&[], b"");
        data[0] = b'X';
        assert!(matches!(
            EncodingTable::parse(&data),
            Err(EncodingError::InvalidMagic([b'X', b'N']))
        ));
    }

    #[test]
    fn test_truncated_pages() {
        let mut data = file(&[entry([1; 16], 1, &[[2; 16]])], b"");
        data.truncate(data.len() - 100);
        assert!(matches!(
            EncodingTable::parse(&data),
            Err(EncodingError::Truncated { .. })
        ));
    }

    #[test]
    fn test_rejects_short_hashes() {
        let mut data = file(&[], b"");
        data[3] = 9;
        assert!(matches!(
            EncodingTable::parse(&data),
            Err(EncodingError::InvalidHashSize { field: "ckey", value: 9 })
        ));
    }
}
