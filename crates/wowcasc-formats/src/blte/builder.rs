//! BLTE writer for raw, zlib and LZ4 blocks

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use super::block::BlockMode;
use super::error::{BlteError, BlteResult};
use super::header::{BLTE_MAGIC, CHUNK_TABLE_FLAGS, ChunkInfo, PREAMBLE_SIZE};

/// Assembles BLTE containers.
///
/// Used to produce fixtures and to re-wrap payloads; the client only reads.
#[derive(Debug, Default)]
pub struct BlteBuilder {
    blocks: Vec<(Vec<u8>, u32)>,
}

impl BlteBuilder {
    /// Start an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block encoded with `mode`
    pub fn block(mut self, mode: BlockMode, data: &[u8]) -> BlteResult<Self> {
        let encoded = encode_block(mode, data)?;
        let size = u32::try_from(data.len())
            .map_err(|_| BlteError::InvalidHeader("block larger than 4 GiB".to_string()))?;
        self.blocks.push((encoded, size));
        Ok(self)
    }

    /// Append a block that is already encoded, mode byte included
    pub fn encoded_block(mut self, encoded: Vec<u8>, decompressed_size: u32) -> Self {
        self.blocks.push((encoded, decompressed_size));
        self
    }

    /// Emit a container with a chunk table
    pub fn build(self) -> Vec<u8> {
        let count = self.blocks.len() as u32;
        let header_size = PREAMBLE_SIZE + 4 + self.blocks.len() * ChunkInfo::SIZE;

        let mut out = Vec::with_capacity(
            header_size + self.blocks.iter().map(|(b, _)| b.len()).sum::<usize>(),
        );
        out.extend_from_slice(&BLTE_MAGIC);
        out.extend_from_slice(&(header_size as u32).to_be_bytes());
        out.push(CHUNK_TABLE_FLAGS);
        out.extend_from_slice(&count.to_be_bytes()[1..]);

        for (encoded, decompressed_size) in &self.blocks {
            out.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
            out.extend_from_slice(&decompressed_size.to_be_bytes());
            out.extend_from_slice(&*md5::compute(encoded));
        }
        for (encoded, _) in self.blocks {
            out.extend_from_slice(&encoded);
        }
        out
    }

    /// Emit a headerless container holding exactly one block
    pub fn single(mode: BlockMode, data: &[u8]) -> BlteResult<Vec<u8>> {
        let encoded = encode_block(mode, data)?;
        let mut out = Vec::with_capacity(PREAMBLE_SIZE + encoded.len());
        out.extend_from_slice(&BLTE_MAGIC);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&encoded);
        Ok(out)
    }
}

/// Encode a payload as one block, mode byte first
pub fn encode_block(mode: BlockMode, data: &[u8]) -> BlteResult<Vec<u8>> {
    let mut out = vec![mode.as_byte()];
    match mode {
        BlockMode::None => out.extend_from_slice(data),
        BlockMode::ZLib => {
            let mut encoder = ZlibEncoder::new(out, Compression::default());
            encoder.write_all(data)?;
            out = encoder.finish()?;
        }
        BlockMode::Lz4 => {
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            out.extend_from_slice(&lz4_flex::block::compress(data));
        }
        BlockMode::Encrypted | BlockMode::Frame => {
            return Err(BlteError::UnsupportedMode(mode.as_byte()));
        }
    }
    Ok(out)
}
