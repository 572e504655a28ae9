//! Root manifest: FileDataID to content key, per locale and content flags
//!
//! A root file is a sequence of blocks. Every block carries one pair of
//! locale and content flags, a run of delta-encoded FileDataIDs and the
//! content key of each of those files. Two on-disk layouts exist:
//!
//! - **Legacy**: no file header; each record stores its content key followed
//!   by an 8-byte name hash.
//! - **Modern**: starts with the `TSFM` magic and file counts; content keys
//!   are stored as one array and the name hash array is omitted for blocks
//!   flagged [`ContentFlags::NO_NAME_HASH`]. An extended header
//!   (`header_size == 0x18`) adds a version; version 2 widens block flags.
//!
//! Both layouts go through the same block parser, parametrized by
//! [`RootLayout`].

mod error;
mod flags;

pub use error::{Result, RootError};
pub use flags::{ContentFlags, LocaleFlags};

use binrw::io::{Cursor, Seek, SeekFrom};
use binrw::{BinRead, BinReaderExt};
use std::collections::BTreeMap;
use wowcasc_crypto::{ContentKey, FileDataId};

/// `TSFM` read as a little-endian `u32`
pub const ROOT_MAGIC: u32 = 0x4D46_5354;

const EXTENDED_HEADER_SIZE: u32 = 0x18;
const NAME_HASH_SIZE: usize = 8;
const KEY_SIZE: usize = 16;

/// On-disk layout of a root file, decided once from its leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootLayout {
    /// Headerless layout with inline name hashes
    Legacy,
    /// `TSFM` layout
    Modern {
        /// Extended header version; 1 for the plain header
        version: u32,
        /// Number of files in the manifest
        total_files: u32,
        /// Number of files with a name hash
        named_files: u32,
    },
}

impl RootLayout {
    /// Detect the layout and return the offset of the first block
    pub fn detect(data: &[u8]) -> Result<(Self, u64)> {
        let mut cursor = Cursor::new(data);
        if data.len() < 12 || cursor.read_le::<u32>()? != ROOT_MAGIC {
            return Ok((Self::Legacy, 0));
        }

        let first: u32 = cursor.read_le()?;
        if first == EXTENDED_HEADER_SIZE && data.len() >= EXTENDED_HEADER_SIZE as usize {
            let version: u32 = cursor.read_le()?;
            if version != 1 && version != 2 {
                return Err(RootError::UnsupportedVersion(version));
            }
            let total_files: u32 = cursor.read_le()?;
            let named_files: u32 = cursor.read_le()?;
            return Ok((
                Self::Modern {
                    version,
                    total_files,
                    named_files,
                },
                u64::from(EXTENDED_HEADER_SIZE),
            ));
        }

        let named_files: u32 = cursor.read_le()?;
        Ok((
            Self::Modern {
                version: 1,
                total_files: first,
                named_files,
            },
            cursor.position(),
        ))
    }

    fn read_block_header(self, cursor: &mut Cursor<&[u8]>) -> Result<BlockHeader> {
        let num_records: u32 = cursor.read_le()?;

        let (locale, content) = match self {
            Self::Modern { version: 2, .. } => {
                let locale: u32 = cursor.read_le()?;
                let low: u32 = cursor.read_le()?;
                let high: u32 = cursor.read_le()?;
                let extra: u8 = cursor.read_le()?;
                (
                    locale,
                    u64::from(low) | u64::from(high) | (u64::from(extra) << 17),
                )
            }
            _ => {
                let content: u32 = cursor.read_le()?;
                let locale: u32 = cursor.read_le()?;
                (locale, u64::from(content))
            }
        };

        Ok(BlockHeader {
            num_records: num_records as usize,
            locale: LocaleFlags(locale),
            content: ContentFlags(content),
        })
    }

    /// Bytes each record occupies after the block header
    fn record_size(self, content: ContentFlags) -> usize {
        match self {
            Self::Legacy => 4 + KEY_SIZE + NAME_HASH_SIZE,
            Self::Modern { .. } if content.has_name_hashes() => 4 + KEY_SIZE + NAME_HASH_SIZE,
            Self::Modern { .. } => 4 + KEY_SIZE,
        }
    }
}

#[derive(Debug)]
struct BlockHeader {
    num_records: usize,
    locale: LocaleFlags,
    content: ContentFlags,
}

/// Locale and content flags shared by every record of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootType {
    /// Locales the block applies to
    pub locale: LocaleFlags,
    /// Content flags of the block
    pub content: ContentFlags,
}

impl RootType {
    /// Whether this variant is served for `locale`: the locale must
    /// intersect and the block must not be a low violence variant.
    pub fn serves(&self, locale: LocaleFlags) -> bool {
        self.locale.intersects(locale) && !self.content.is_low_violence()
    }
}

/// Append-only arena of root types
#[derive(Debug, Clone, Default)]
pub struct RootTypes(Vec<RootType>);

impl RootTypes {
    /// Append a type and return its index
    pub fn push(&mut self, root_type: RootType) -> usize {
        self.0.push(root_type);
        self.0.len() - 1
    }

    /// Type at `index`
    pub fn get(&self, index: usize) -> Option<&RootType> {
        self.0.get(index)
    }

    /// Number of types
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no block has been parsed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why a FileDataID did not resolve to a content key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootMiss {
    /// The id is not in the manifest
    UnknownId,
    /// The id exists but no variant serves the locale
    NoLocaleMatch,
}

/// Parsed root manifest
#[derive(Debug, Clone)]
pub struct RootTable {
    layout: RootLayout,
    types: RootTypes,
    entries: BTreeMap<FileDataId, BTreeMap<usize, ContentKey>>,
}

impl RootTable {
    /// Parse an already BLTE-decoded root file
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (layout, start) = RootLayout::detect(data)?;
        let mut table = Self {
            layout,
            types: RootTypes::default(),
            entries: BTreeMap::new(),
        };

        let mut cursor = Cursor::new(data);
        cursor.set_position(start);
        while (cursor.position() as usize) < data.len() {
            table.parse_block(&mut cursor)?;
        }

        Ok(table)
    }

    fn parse_block(&mut self, cursor: &mut Cursor<&[u8]>) -> Result<()> {
        let offset = cursor.position();
        let header = self.layout.read_block_header(cursor)?;
        let count = header.num_records;

        let available = cursor.get_ref().len() - cursor.position() as usize;
        let needed = count.saturating_mul(self.layout.record_size(header.content));
        if needed > available {
            return Err(RootError::Truncated {
                offset,
                needed,
                available,
            });
        }

        let ids = read_file_data_ids(cursor, count)?;
        let keys = match self.layout {
            RootLayout::Legacy => (0..count)
                .map(|_| {
                    let key = read_key(cursor)?;
                    skip(cursor, NAME_HASH_SIZE)?;
                    Ok(key)
                })
                .collect::<Result<Vec<_>>>()?,
            RootLayout::Modern { .. } => {
                let keys = (0..count)
                    .map(|_| read_key(cursor))
                    .collect::<Result<Vec<_>>>()?;
                if header.content.has_name_hashes() {
                    skip(cursor, NAME_HASH_SIZE * count)?;
                }
                keys
            }
        };

        let type_index = self.types.push(RootType {
            locale: header.locale,
            content: header.content,
        });
        for (id, key) in ids.into_iter().zip(keys) {
            self.entries.entry(id).or_default().insert(type_index, key);
        }

        Ok(())
    }

    /// Layout the file was parsed with
    pub fn layout(&self) -> RootLayout {
        self.layout
    }

    /// Root types in block order
    pub fn types(&self) -> &RootTypes {
        &self.types
    }

    /// Number of distinct FileDataIDs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no files
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All variants of a file, keyed by root type index
    pub fn variants(&self, id: FileDataId) -> Option<&BTreeMap<usize, ContentKey>> {
        self.entries.get(&id)
    }

    /// All FileDataIDs, ascending
    pub fn file_data_ids(&self) -> impl Iterator<Item = FileDataId> + '_ {
        self.entries.keys().copied()
    }

    /// Content key of the first variant serving `locale`
    pub fn select(&self, id: FileDataId, locale: LocaleFlags) -> std::result::Result<ContentKey, RootMiss> {
        let variants = self.entries.get(&id).ok_or(RootMiss::UnknownId)?;
        self.first_serving(variants, locale)
            .ok_or(RootMiss::NoLocaleMatch)
    }

    /// FileDataIDs that resolve under `locale`, ascending
    pub fn valid_ids(&self, locale: LocaleFlags) -> Vec<FileDataId> {
        self.entries
            .iter()
            .filter(|(_, variants)| self.first_serving(variants, locale).is_some())
            .map(|(&id, _)| id)
            .collect()
    }

    fn first_serving(
        &self,
        variants: &BTreeMap<usize, ContentKey>,
        locale: LocaleFlags,
    ) -> Option<ContentKey> {
        variants
            .iter()
            .find(|(index, _)| self.types.get(**index).is_some_and(|t| t.serves(locale)))
            .map(|(_, key)| *key)
    }
}

/// Decode `count` delta-encoded ids: `next = prev + delta + 1`, `prev` starting at -1
fn read_file_data_ids(cursor: &mut Cursor<&[u8]>, count: usize) -> Result<Vec<FileDataId>> {
    let mut prev: i64 = -1;
    (0..count)
        .map(|_| {
            let delta: i32 = cursor.read_le()?;
            let next = prev + i64::from(delta) + 1;
            let id = u32::try_from(next).map_err(|_| RootError::InvalidFileDataId(next))?;
            prev = next;
            Ok(FileDataId::new(id))
        })
        .collect()
}

fn read_key(cursor: &mut Cursor<&[u8]>) -> Result<ContentKey> {
    Ok(ContentKey::read_le(cursor)?)
}

fn skip(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<()> {
    cursor
        .seek(SeekFrom::Current(len as i64))
        .map_err(binrw::Error::Io)?;
    Ok(())
}

/// Serialize blocks into a `TSFM` root file with the plain header
///
/// Records of a block are written in ascending id order. Content flags are
/// truncated to 32 bits; blocks without [`ContentFlags::NO_NAME_HASH`] get
/// zeroed name hashes.
pub fn build_root(blocks: &[(RootType, Vec<(FileDataId, ContentKey)>)]) -> Vec<u8> {
    let mut total = 0u32;
    let mut named = 0u32;
    let mut body = Vec::new();

    for (root_type, records) in blocks {
        let mut records = records.clone();
        records.sort_by_key(|(id, _)| *id);
        let count = records.len() as u32;
        total += count;

        body.extend_from_slice(&count.to_le_bytes());
        body.extend_from_slice(&(root_type.content.0 as u32).to_le_bytes());
        body.extend_from_slice(&root_type.locale.0.to_le_bytes());

        let mut prev = -1i64;
        for (id, _) in &records {
            let id = i64::from(id.get());
            body.extend_from_slice(&((id - prev - 1) as i32).to_le_bytes());
            prev = id;
        }
        for (_, ckey) in &records {
            body.extend_from_slice(ckey.as_bytes());
        }
        if root_type.content.has_name_hashes() {
            named += count;
            body.resize(body.len() + NAME_HASH_SIZE * records.len(), 0);
        }
    }

    let mut data = Vec::with_capacity(12 + body.len());
    data.extend_from_slice(&ROOT_MAGIC.to_le_bytes());
    data.extend_from_slice(&total.to_le_bytes());
    data.extend_from_slice(&named.to_le_bytes());
    data.extend_from_slice(&body);
    data
}
