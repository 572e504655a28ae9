//! Local installation bucket indices (`Data/data/BBVVVVVVVV.idx`)
//!
//! Each bucket maps the first 9 bytes of an encoding key to a span inside a
//! `data.NNN` file. Several versions of a bucket may sit side by side; only
//! the highest one is live.

use std::collections::BTreeMap;
use std::collections::HashMap;

use binrw::io::Cursor;
use binrw::{BinRead, BinReaderExt, BinWrite};
use wowcasc_crypto::EncodingKey;
use wowcasc_crypto::md5::LOCAL_KEY_SIZE;

use super::error::{ArchiveError, ArchiveResult};

/// Bytes of per-file header stored in front of every blob in `data.NNN`
pub const LOCAL_HEADER_SIZE: u32 = 30;

const OFFSET_MASK: u32 = 0x3FFF_FFFF;

/// Raw 18-byte record of a bucket file
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct LocalRecord {
    /// Truncated encoding key
    pub key: [u8; LOCAL_KEY_SIZE],
    /// High bits of the archive number
    pub archive_hi: u8,
    /// Two low archive bits followed by a 30-bit offset
    #[brw(big)]
    pub offset_and_archive_lo: u32,
    /// Blob size including the local header
    pub size: u32,
}

impl LocalRecord {
    /// Serialized record size
    pub const SIZE: usize = 18;

    /// Pack a location into a record
    pub fn new(key: [u8; LOCAL_KEY_SIZE], archive: u16, offset: u32, size: u32) -> Self {
        Self {
            key,
            archive_hi: (archive >> 2) as u8,
            offset_and_archive_lo: (u32::from(archive & 0b11) << 30) | (offset & OFFSET_MASK),
            size,
        }
    }

    /// Number of the `data.NNN` file
    pub fn archive(&self) -> u16 {
        (u16::from(self.archive_hi) << 2) | (self.offset_and_archive_lo >> 30) as u16
    }

    /// Offset of the blob's local header inside the data file
    pub fn offset(&self) -> u32 {
        self.offset_and_archive_lo & OFFSET_MASK
    }
}

/// Where a blob lives in a local installation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEntry {
    /// Number of the `data.NNN` file
    pub archive: u16,
    /// Offset of the local header
    pub offset: u32,
    /// Size including the local header
    pub size: u32,
}

impl LocalEntry {
    /// Offset of the blob payload, past the local header
    pub fn payload_offset(&self) -> u64 {
        u64::from(self.offset) + u64::from(LOCAL_HEADER_SIZE)
    }

    /// Payload length, without the local header
    pub fn payload_size(&self) -> u32 {
        self.size.saturating_sub(LOCAL_HEADER_SIZE)
    }
}

impl From<LocalRecord> for LocalEntry {
    fn from(record: LocalRecord) -> Self {
        Self {
            archive: record.archive(),
            offset: record.offset(),
            size: record.size,
        }
    }
}

/// Parsed bucket index, keyed by truncated encoding key
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    entries: HashMap<[u8; LOCAL_KEY_SIZE], LocalEntry>,
}

impl LocalIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one `.idx` file
    pub fn parse(data: &[u8]) -> ArchiveResult<Self> {
        let mut index = Self::new();
        index.merge(data)?;
        Ok(index)
    }

    /// Parse one `.idx` file into this index; keys already present are kept
    pub fn merge(&mut self, data: &[u8]) -> ArchiveResult<usize> {
        let mut cursor = Cursor::new(data);
        let header_hash_size: u32 = cursor.read_le()?;
        let _header_hash: u32 = cursor.read_le()?;

        let header_end = 8 + u64::from(header_hash_size);
        let data_start = header_end.next_multiple_of(16);
        let available = data.len();
        let needed = usize::try_from(data_start + 8).unwrap_or(usize::MAX);
        if needed > available {
            return Err(ArchiveError::Truncated { needed, available });
        }
        cursor.set_position(data_start);

        let data_length: u32 = cursor.read_le()?;
        let _data_hash: u32 = cursor.read_le()?;

        let count = data_length as usize / LocalRecord::SIZE;
        let needed = needed.saturating_add(count * LocalRecord::SIZE);
        if needed > available {
            return Err(ArchiveError::Truncated { needed, available });
        }

        let mut added = 0;
        for _ in 0..count {
            let record = LocalRecord::read(&mut cursor)?;
            if let std::collections::hash_map::Entry::Vacant(slot) = self.entries.entry(record.key) {
                slot.insert(record.into());
                added += 1;
            }
        }
        Ok(added)
    }

    /// Look up a full encoding key by its 9-byte prefix
    pub fn get(&self, ekey: &EncodingKey) -> Option<&LocalEntry> {
        self.entries.get(&ekey.local_prefix())
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split an index file name `BBVVVVVVVV.idx` into bucket and version
pub fn parse_index_file_name(name: &str) -> Option<(u8, u32)> {
    let stem = name.strip_suffix(".idx")?;
    if stem.len() != 10 || !stem.is_ascii() {
        return None;
    }
    let bucket = u8::from_str_radix(&stem[..2], 16).ok()?;
    let version = u32::from_str_radix(&stem[2..], 16).ok()?;
    Some((bucket, version))
}

/// Pick the highest version of every bucket from a list of file names
///
/// The result is ordered by bucket.
pub fn latest_index_files<'a, I>(names: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut latest: BTreeMap<u8, (u32, &'a str)> = BTreeMap::new();
    for name in names {
        let Some((bucket, version)) = parse_index_file_name(name) else {
            continue;
        };
        match latest.get(&bucket) {
            Some((current, _)) if *current >= version => {}
            _ => {
                latest.insert(bucket, (version, name));
            }
        }
    }
    latest.into_values().map(|(_, name)| name).collect()
}

/// Assemble a bucket file from records
pub fn build_local_index(records: &[LocalRecord]) -> ArchiveResult<Vec<u8>> {
    const HEADER: [u8; 8] = [0x07, 0x00, 0x00, 0x04, 0x05, 0x09, 0x1E, 0x00];

    let mut cursor = Cursor::new(Vec::new());
    (HEADER.len() as u32).write_le(&mut cursor)?;
    0u32.write_le(&mut cursor)?;
    HEADER.write_le(&mut cursor)?;
    let pad = (cursor.position().next_multiple_of(16) - cursor.position()) as usize;
    vec![0u8; pad].write_le(&mut cursor)?;
    ((records.len() * LocalRecord::SIZE) as u32).write_le(&mut cursor)?;
    0u32.write_le(&mut cursor)?;
    for record in records {
        record.write(&mut cursor)?;
    }
    Ok(cursor.into_inner())
}
