//! Per-block decoding: raw, zlib, LZ4 and Salsa20-encrypted blocks

use std::io::Read;

use flate2::read::ZlibDecoder;
use wowcasc_crypto::TactKeyStore;
use wowcasc_crypto::salsa20::decrypt_salsa20;

use super::error::{BlteError, BlteResult};

/// Upper bound for a single decoded block
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024 * 1024;

const KEY_NAME_SIZE: u8 = 8;
const ENCRYPTION_SALSA20: u8 = b'S';

/// Block encoding, the first byte of every block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockMode {
    /// Stored as is (`N`)
    None = b'N',
    /// zlib stream (`Z`)
    ZLib = b'Z',
    /// LZ4 block with an 8-byte size prefix (`4`)
    Lz4 = b'4',
    /// Encrypted inner block (`E`)
    Encrypted = b'E',
    /// Nested BLTE frame (`F`)
    Frame = b'F',
}

impl BlockMode {
    /// Parse a mode byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'N' => Some(Self::None),
            b'Z' => Some(Self::ZLib),
            b'4' => Some(Self::Lz4),
            b'E' => Some(Self::Encrypted),
            b'F' => Some(Self::Frame),
            _ => None,
        }
    }

    /// Mode byte
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// What a block turned into
#[derive(Debug)]
pub(crate) enum Decoded {
    /// Fully decoded payload
    Data(Vec<u8>),
    /// Encrypted with a key that is not registered
    MissingKey(u64),
}

/// Decode one block, mode byte included
pub(crate) fn decode_block(
    block: &[u8],
    index: usize,
    keys: Option<&TactKeyStore>,
) -> BlteResult<Decoded> {
    let (&mode_byte, payload) = block.split_first().ok_or(BlteError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let mode = BlockMode::from_byte(mode_byte).ok_or(BlteError::UnknownMode(mode_byte))?;

    match mode {
        BlockMode::Encrypted => decrypt_block(payload, index, keys),
        _ => decompress(payload, mode).map(Decoded::Data),
    }
}

/// Decompress a non-encrypted payload
pub fn decompress(payload: &[u8], mode: BlockMode) -> BlteResult<Vec<u8>> {
    match mode {
        BlockMode::None => Ok(payload.to_vec()),
        BlockMode::ZLib => {
            let mut out = Vec::new();
            ZlibDecoder::new(payload)
                .take(MAX_BLOCK_SIZE as u64 + 1)
                .read_to_end(&mut out)
                .map_err(|e| BlteError::Decompression(format!("zlib: {e}")))?;
            if out.len() > MAX_BLOCK_SIZE {
                return Err(BlteError::Decompression(format!(
                    "zlib output exceeds {MAX_BLOCK_SIZE} bytes"
                )));
            }
            Ok(out)
        }
        BlockMode::Lz4 => {
            if payload.len() < 8 {
                return Err(BlteError::Truncated {
                    needed: 8,
                    available: payload.len(),
                });
            }
            let (size_bytes, compressed) = payload.split_at(8);
            let mut size = [0u8; 8];
            size.copy_from_slice(size_bytes);
            let size = usize::try_from(u64::from_le_bytes(size))
                .ok()
                .filter(|&s| s <= MAX_BLOCK_SIZE)
                .ok_or_else(|| BlteError::Decompression("LZ4 size header out of range".into()))?;

            lz4_flex::block::decompress(compressed, size)
                .map_err(|e| BlteError::Decompression(format!("lz4: {e}")))
        }
        BlockMode::Encrypted => Err(BlteError::NestedEncryption),
        BlockMode::Frame => Err(BlteError::UnsupportedMode(mode.as_byte())),
    }
}

fn decrypt_block(
    payload: &[u8],
    index: usize,
    keys: Option<&TactKeyStore>,
) -> BlteResult<Decoded> {
    let mut rest = payload;

    let name_size = take(&mut rest, 1)?[0];
    if name_size != KEY_NAME_SIZE {
        return Err(BlteError::InvalidHeader(format!(
            "encrypted block key name size {name_size}"
        )));
    }
    let mut name = [0u8; 8];
    name.copy_from_slice(take(&mut rest, 8)?);
    let key_name = u64::from_le_bytes(name);

    let iv_size = take(&mut rest, 1)?[0] as usize;
    let iv = take(&mut rest, iv_size)?;
    let cipher = take(&mut rest, 1)?[0];
    if cipher != ENCRYPTION_SALSA20 {
        return Err(BlteError::UnsupportedEncryption(cipher));
    }

    let Some(key) = keys.and_then(|store| store.get(key_name)) else {
        return Ok(Decoded::MissingKey(key_name));
    };

    let plain = decrypt_salsa20(rest, key, iv, index)?;
    let (&inner, inner_payload) = plain.split_first().ok_or(BlteError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let inner_mode = BlockMode::from_byte(inner).ok_or(BlteError::UnknownMode(inner))?;
    decompress(inner_payload, inner_mode).map(Decoded::Data)
}

fn take<'a>(rest: &mut &'a [u8], n: usize) -> BlteResult<&'a [u8]> {
    if rest.len() < n {
        return Err(BlteError::Truncated {
            needed: n,
            available: rest.len(),
        });
    }
    let (head, tail) = rest.split_at(n);
    *rest = tail;
    Ok(head)
}
