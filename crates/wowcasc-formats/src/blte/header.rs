//! BLTE header and chunk table

use binrw::io::Cursor;
use binrw::{BinRead, BinReaderExt, BinWrite};

use super::error::{BlteError, BlteResult};

/// BLTE magic bytes
pub const BLTE_MAGIC: [u8; 4] = *b"BLTE";

/// Chunk table flags byte for 24-byte chunk entries
pub const CHUNK_TABLE_FLAGS: u8 = 0x0F;

/// Magic plus header size field
pub const PREAMBLE_SIZE: usize = 8;

/// Flags byte plus 24-bit chunk count
const TABLE_PREFIX_SIZE: usize = 4;

/// One chunk table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct ChunkInfo {
    /// Encoded size including the mode byte
    pub compressed_size: u32,
    /// Size after decoding
    pub decompressed_size: u32,
    /// MD5 of the encoded block
    pub checksum: [u8; 16],
}

impl ChunkInfo {
    /// Serialized size of one entry
    pub const SIZE: usize = 24;
}

/// Parsed BLTE header
#[derive(Debug, Clone)]
pub struct BlteHeader {
    /// Header size field; 0 means a single block with no chunk table
    pub header_size: u32,
    /// Chunk table, empty for single-block containers
    pub chunks: Vec<ChunkInfo>,
}

impl BlteHeader {
    /// Parse the header at the start of `data`
    pub fn parse(data: &[u8]) -> BlteResult<Self> {
        if data.len() < PREAMBLE_SIZE {
            return Err(BlteError::Truncated {
                needed: PREAMBLE_SIZE,
                available: data.len(),
            });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[..4]);
        if magic != BLTE_MAGIC {
            return Err(BlteError::InvalidMagic(magic));
        }

        let mut cursor = Cursor::new(data);
        cursor.set_position(4);
        let header_size: u32 = cursor.read_be()?;

        if header_size == 0 {
            return Ok(Self {
                header_size,
                chunks: Vec::new(),
            });
        }

        let table_start = PREAMBLE_SIZE + TABLE_PREFIX_SIZE;
        if data.len() < table_start {
            return Err(BlteError::Truncated {
                needed: table_start,
                available: data.len(),
            });
        }

        let flags: u8 = cursor.read_be()?;
        if flags != CHUNK_TABLE_FLAGS {
            return Err(BlteError::InvalidHeader(format!(
                "unsupported chunk table flags 0x{flags:02X}"
            )));
        }

        let count_bytes: [u8; 3] = cursor.read_be()?;
        let chunk_count = u32::from_be_bytes([0, count_bytes[0], count_bytes[1], count_bytes[2]]);
        if chunk_count == 0 {
            return Err(BlteError::InvalidHeader("chunk table is empty".to_string()));
        }

        let expected_size = table_start + chunk_count as usize * ChunkInfo::SIZE;
        if header_size as usize != expected_size {
            return Err(BlteError::InvalidHeader(format!(
                "header size {header_size} does not match {chunk_count} chunks ({expected_size})"
            )));
        }
        if data.len() < expected_size {
            return Err(BlteError::Truncated {
                needed: expected_size,
                available: data.len(),
            });
        }

        let chunks = (0..chunk_count)
            .map(|_| ChunkInfo::read(&mut cursor))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            header_size,
            chunks,
        })
    }

    /// Whether the container has no chunk table
    pub fn is_single_block(&self) -> bool {
        self.header_size == 0
    }

    /// Offset of the first block
    pub fn data_offset(&self) -> usize {
        if self.is_single_block() {
            PREAMBLE_SIZE
        } else {
            self.header_size as usize
        }
    }

    /// Sum of decoded chunk sizes, when the chunk table is present
    pub fn decompressed_size(&self) -> Option<u64> {
        (!self.is_single_block())
            .then(|| self.chunks.iter().map(|c| u64::from(c.decompressed_size)).sum())
    }
}
