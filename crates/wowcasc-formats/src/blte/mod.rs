//! BLTE (Block Table Encoded) container
//!
//! Every blob stored in CASC is a BLTE container: the `BLTE` magic, a header
//! size, an optional chunk table and then one or more blocks. Each block starts
//! with a mode byte saying whether it is stored raw, zlib or LZ4 compressed,
//! or Salsa20 encrypted around another block.
//!
//! The encoding key of a blob is the MD5 of its header (or of the whole blob
//! when there is no chunk table), so a reader given the expected key can
//! verify it received the right bytes before decoding them.
//!
//! # Example
//!
//! ```
//! use wowcasc_formats::blte::{BlockMode, BlteBuilder, BlteReader, DecodeOptions};
//!
//! let blob = BlteBuilder::new()
//!     .block(BlockMode::ZLib, b"hello ")?
//!     .block(BlockMode::None, b"world")?
//!     .build();
//!
//! let data = BlteReader::new(&blob)?.decode(&DecodeOptions::default())?;
//! assert_eq!(data, b"hello world");
//! # Ok::<(), wowcasc_formats::BlteError>(())
//! ```

mod block;
mod builder;
mod error;
mod header;

pub use block::{BlockMode, MAX_BLOCK_SIZE, decompress};
pub use builder::{BlteBuilder, encode_block};
pub use error::{BlteError, BlteResult};
pub use header::{BLTE_MAGIC, BlteHeader, ChunkInfo};

use block::{Decoded, decode_block};
use wowcasc_crypto::{EncodingKey, TactKeyStore};

/// How to decode a container
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions<'a> {
    /// Expected encoding key; when set, the container hash is verified
    pub expected: Option<&'a EncodingKey>,
    /// Keys for encrypted blocks
    pub keys: Option<&'a TactKeyStore>,
    /// Replace blocks whose key is missing with zeroes instead of failing
    pub partial: bool,
}

/// Reader over one BLTE container held in memory
#[derive(Debug)]
pub struct BlteReader<'a> {
    data: &'a [u8],
    header: BlteHeader,
}

impl<'a> BlteReader<'a> {
    /// Parse the header and chunk table
    pub fn new(data: &'a [u8]) -> BlteResult<Self> {
        let header = BlteHeader::parse(data)?;
        Ok(Self { data, header })
    }

    /// Parsed header
    pub fn header(&self) -> &BlteHeader {
        &self.header
    }

    /// Number of blocks in the container
    pub fn block_count(&self) -> usize {
        self.header.chunks.len().max(1)
    }

    /// Check the container against an encoding key
    pub fn verify(&self, expected: &EncodingKey) -> BlteResult<()> {
        let hashed = if self.header.is_single_block() {
            self.data
        } else {
            &self.data[..self.header.header_size as usize]
        };

        let actual: [u8; 16] = *md5::compute(hashed);
        if &actual != expected.as_bytes() {
            return Err(BlteError::ChecksumMismatch {
                expected: expected.to_hex(),
                actual: hex::encode(actual),
            });
        }
        Ok(())
    }

    /// Decode every block into one contiguous buffer
    pub fn decode(&self, options: &DecodeOptions<'_>) -> BlteResult<Vec<u8>> {
        if let Some(expected) = options.expected {
            self.verify(expected)?;
        }

        let mut offset = self.header.data_offset();

        if self.header.is_single_block() {
            return match decode_block(&self.data[offset..], 0, options.keys)? {
                Decoded::Data(data) => Ok(data),
                Decoded::MissingKey(_) if options.partial => Ok(Vec::new()),
                Decoded::MissingKey(name) => Err(BlteError::MissingKey(name)),
            };
        }

        let total = self.header.decompressed_size().unwrap_or_default();
        let mut out = Vec::with_capacity(usize::try_from(total).unwrap_or(0).min(MAX_BLOCK_SIZE));

        for (index, info) in self.header.chunks.iter().enumerate() {
            let end = offset + info.compressed_size as usize;
            if end > self.data.len() {
                return Err(BlteError::Truncated {
                    needed: end,
                    available: self.data.len(),
                });
            }
            let encoded = &self.data[offset..end];
            offset = end;

            let actual: [u8; 16] = *md5::compute(encoded);
            if actual != info.checksum {
                return Err(BlteError::BlockChecksumMismatch {
                    index,
                    expected: hex::encode(info.checksum),
                    actual: hex::encode(actual),
                });
            }

            let expected_size = info.decompressed_size as usize;
            match decode_block(encoded, index, options.keys)? {
                Decoded::Data(data) => {
                    if data.len() != expected_size {
                        return Err(BlteError::SizeMismatch {
                            index,
                            expected: expected_size,
                            actual: data.len(),
                        });
                    }
                    out.extend_from_slice(&data);
                }
                Decoded::MissingKey(_) if options.partial => {
                    out.resize(out.len() + expected_size, 0);
                }
                Decoded::MissingKey(name) => return Err(BlteError::MissingKey(name)),
            }
        }

        Ok(out)
    }
}

/// Decode a container in one call
pub fn decode(data: &[u8], options: &DecodeOptions<'_>) -> BlteResult<Vec<u8>> {
    BlteReader::new(data)?.decode(options)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wowcasc_crypto::salsa20::decrypt_salsa20;

    const KEY_NAME: u64 = 0xFA50_5078_126A_CB3E;

    fn header_key(blob: &[u8]) -> EncodingKey {
        let header = BlteHeader::parse(blob).expect("Test operation should succeed");
        let end = if header.is_single_block() {
            blob.len()
        } else {
            header.header_size as usize
        };
        EncodingKey::from_data(&blob[..end])
    }

    fn encrypted_block(payload: &[u8], index: usize, key: &[u8; 16]) -> Vec<u8> {
        let iv = [0x10, 0x20, 0x30, 0x40];
        let mut inner = vec![b'N'];
        inner.extend_from_slice(payload);
        let cipher = decrypt_salsa20(&inner, key, &iv, index).expect("Test operation should succeed");

        let mut block = vec![b'E', 8];
        block.extend_from_slice(&KEY_NAME.to_le_bytes());
        block.push(4);
        block.extend_from_slice(&iv);
        block.push(b'S');
        block.extend_from_slice(&cipher);
        block
    }

    #[test]
    fn test_mixed_blocks() {
        let blob = BlteBuilder::new()
            .block(BlockMode::None, b"raw|")
            .and_then(|b| b.block(BlockMode::ZLib, b"zlib zlib zlib|"))
            .and_then(|b| b.block(BlockMode::Lz4, b"lz4 lz4 lz4"))
            .expect("Test operation should succeed")
            .build();

        let key = header_key(&blob);
        let options = DecodeOptions {
            expected: Some(&key),
            ..DecodeOptions::default()
        };
        let reader = BlteReader::new(&blob).expect("Test operation should succeed");
        assert_eq!(reader.block_count(), 3);
        assert_eq!(reader.header().decompressed_size(), Some(30));
        assert_eq!(
            reader.decode(&options).expect("Test operation should succeed"),
            b"raw|zlib zlib zlib|lz4 lz4 lz4".to_vec()
        );
    }

    #[test]
    fn test_single_block_verifies_whole_file() {
        let blob = BlteBuilder::single(BlockMode::ZLib, b"single").expect("Test operation should succeed");
        let key = EncodingKey::from_data(&blob);
        let data = decode(
            &blob,
            &DecodeOptions {
                expected: Some(&key),
                ..DecodeOptions::default()
            },
        )
        .expect("Test operation should succeed");
        assert_eq!(data, b"single".to_vec());
    }

    #[test]
    fn test_wrong_expected_key() {
        let blob = BlteBuilder::new()
            .block(BlockMode::None, b"payload")
            .expect("Test operation should succeed")
            .build();
        let wrong = EncodingKey::from_bytes([0xAB; 16]);
        let result = decode(
            &blob,
            &DecodeOptions {
                expected: Some(&wrong),
                ..DecodeOptions::default()
            },
        );
        assert!(matches!(result, Err(BlteError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_block_checksum_mismatch() {
        let mut blob = BlteBuilder::new()
            .block(BlockMode::None, b"payload")
            .expect("Test operation should succeed")
            .build();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(matches!(
            decode(&blob, &DecodeOptions::default()),
            Err(BlteError::BlockChecksumMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            decode(b"NOPE\0\0\0\0Nxx", &DecodeOptions::default()),
            Err(BlteError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_encrypted_block_with_key() {
        let key = [0x42u8; 16];
        let mut store = TactKeyStore::new();
        assert!(store.add_key("FA505078126ACB3E", &hex::encode(key)));

        let blob = BlteBuilder::new()
            .block(BlockMode::None, b"clear ")
            .expect("Test operation should succeed")
            .encoded_block(encrypted_block(b"secret", 1, &key), 6)
            .build();

        let data = decode(
            &blob,
            &DecodeOptions {
                keys: Some(&store),
                ..DecodeOptions::default()
            },
        )
        .expect("Test operation should succeed");
        assert_eq!(data, b"clear secret".to_vec());
    }

    #[test]
    fn test_missing_key_partial_and_strict() {
        let key = [0x42u8; 16];
        let blob = BlteBuilder::new()
            .block(BlockMode::None, b"head")
            .expect("Test operation should succeed")
            .encoded_block(encrypted_block(b"secret", 1, &key), 6)
            .build();

        let strict = decode(&blob, &DecodeOptions::default());
        assert!(matches!(strict, Err(BlteError::MissingKey(KEY_NAME))));

        let partial = decode(
            &blob,
            &DecodeOptions {
                partial: true,
                ..DecodeOptions::default()
            },
        )
        .expect("Test operation should succeed");
        assert_eq!(partial, b"head\0\0\0\0\0\0".to_vec());
    }

    #[test]
    fn test_truncated_block_data() {
        let mut blob = BlteBuilder::new()
            .block(BlockMode::None, b"payload")
            .expect("Test operation should succeed")
            .build();
        blob.truncate(blob.len() - 3);
        assert!(matches!(
            decode(&blob, &DecodeOptions::default()),
            Err(BlteError::Truncated { .. })
        ));
    }
}
