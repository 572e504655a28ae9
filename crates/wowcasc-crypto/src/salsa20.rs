//! Salsa20 as used by BLTE `E` blocks
//!
//! CASC keys are 16 bytes, so the state is built with the "expand 16-byte k"
//! constants and the key repeated. The block IV is zero-padded to the 8-byte
//! nonce and the block index is XORed into its first four bytes.

use crate::error::CryptoError;

const TAU: [u32; 4] = [0x6170_7865, 0x3120_646e, 0x7962_2d36, 0x6b20_6574];
const BLOCK_LEN: usize = 64;

/// Salsa20/20 keystream generator with a 16-byte key
pub struct Salsa20Cipher {
    state: [u32; 16],
    block: [u8; BLOCK_LEN],
    used: usize,
}

impl Salsa20Cipher {
    /// Build a cipher for one BLTE block.
    ///
    /// `iv` may be 4 or 8 bytes long.
    pub fn new(key: &[u8; 16], iv: &[u8], block_index: usize) -> Result<Self, CryptoError> {
        if iv.len() != 4 && iv.len() != 8 {
            return Err(CryptoError::InvalidIvSize {
                expected: 4,
                actual: iv.len(),
            });
        }

        let mut nonce = [0u8; 8];
        nonce[..iv.len()].copy_from_slice(iv);
        let index = (block_index as u32).to_le_bytes();
        for (byte, mask) in nonce.iter_mut().zip(index) {
            *byte ^= mask;
        }

        let k = [le_word(key, 0), le_word(key, 4), le_word(key, 8), le_word(key, 12)];

        let state = [
            TAU[0],
            k[0],
            k[1],
            k[2],
            k[3],
            TAU[1],
            le_word(&nonce, 0),
            le_word(&nonce, 4),
            0,
            0,
            TAU[2],
            k[0],
            k[1],
            k[2],
            k[3],
            TAU[3],
        ];

        Ok(Self {
            state,
            block: [0; BLOCK_LEN],
            used: BLOCK_LEN,
        })
    }

    fn refill(&mut self) {
        let mut x = self.state;
        for _ in 0..10 {
            quarter_round(&mut x, 0, 4, 8, 12);
            quarter_round(&mut x, 5, 9, 13, 1);
            quarter_round(&mut x, 10, 14, 2, 6);
            quarter_round(&mut x, 15, 3, 7, 11);

            quarter_round(&mut x, 0, 1, 2, 3);
            quarter_round(&mut x, 5, 6, 7, 4);
            quarter_round(&mut x, 10, 11, 8, 9);
            quarter_round(&mut x, 15, 12, 13, 14);
        }

        for (i, (out, init)) in x.iter().zip(self.state).enumerate() {
            self.block[i * 4..i * 4 + 4].copy_from_slice(&out.wrapping_add(init).to_le_bytes());
        }

        let (counter, carry) = self.state[8].overflowing_add(1);
        self.state[8] = counter;
        if carry {
            self.state[9] = self.state[9].wrapping_add(1);
        }
        self.used = 0;
    }

    /// XOR the keystream into `data` in place
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data {
            if self.used == BLOCK_LEN {
                self.refill();
            }
            *byte ^= self.block[self.used];
            self.used += 1;
        }
    }
}

fn le_word(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn quarter_round(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    x[b] ^= x[a].wrapping_add(x[d]).rotate_left(7);
    x[c] ^= x[b].wrapping_add(x[a]).rotate_left(9);
    x[d] ^= x[c].wrapping_add(x[b]).rotate_left(13);
    x[a] ^= x[d].wrapping_add(x[c]).rotate_left(18);
}

/// Decrypt (or encrypt) one block's payload
pub fn decrypt_salsa20(
    data: &[u8],
    key: &[u8; 16],
    iv: &[u8],
    block_index: usize,
) -> Result<Vec<u8>, CryptoError> {
    let mut cipher = Salsa20Cipher::new(key, iv, block_index)?;
    let mut output = data.to_vec();
    cipher.apply_keystream(&mut output);
    Ok(output)
}
