//! AES-CBC transforms: streaming payload decryption and raw block helpers

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};
use generic_array::GenericArray;
use rand::{thread_rng, RngCore};

use crate::error::{PDFSecurityError, PDFSecurityResult};

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

pub(crate) const BLOCK_SIZE: usize = 16;

/// Ciphertext size for a payload: IV, then PKCS#7 padded blocks
pub(crate) fn padded_size(plaintext_len: usize) -> usize {
    BLOCK_SIZE + (plaintext_len / BLOCK_SIZE + 1) * BLOCK_SIZE
}

/// Encrypt a payload under a fresh random IV, prefixed to the output
pub(crate) fn cbc_encrypt_payload(key: &[u8], plaintext: &[u8]) -> PDFSecurityResult<Vec<u8>> {
    let mut iv = [0u8; BLOCK_SIZE];
    thread_rng().fill_bytes(&mut iv);

    let body = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, &iv)?.encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        32 => Aes256CbcEnc::new_from_slices(key, &iv)?.encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        len => return Err(PDFSecurityError::unsupported(format!("AES key of {} bytes", len))),
    };

    let mut out = Vec::with_capacity(BLOCK_SIZE + body.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&body);
    Ok(out)
}

/// CBC encryption without padding; `data` must be block aligned
pub(crate) fn cbc_encrypt_raw(key: &[u8], iv: &[u8], data: &[u8]) -> PDFSecurityResult<Vec<u8>> {
    check_aligned(data)?;
    Ok(match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)?.encrypt_padded_vec_mut::<NoPadding>(data),
        32 => Aes256CbcEnc::new_from_slices(key, iv)?.encrypt_padded_vec_mut::<NoPadding>(data),
        len => return Err(PDFSecurityError::unsupported(format!("AES key of {} bytes", len))),
    })
}

/// CBC decryption without padding; `data` must be block aligned
pub(crate) fn cbc_decrypt_raw(key: &[u8], iv: &[u8], data: &[u8]) -> PDFSecurityResult<Vec<u8>> {
    check_aligned(data)?;
    let decrypted = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<NoPadding>(data),
        32 => Aes256CbcDec::new_from_slices(key, iv)?.decrypt_padded_vec_mut::<NoPadding>(data),
        len => return Err(PDFSecurityError::unsupported(format!("AES key of {} bytes", len))),
    };
    decrypted.map_err(|_| PDFSecurityError::crypto("AES block decryption failed"))
}

fn check_aligned(data: &[u8]) -> PDFSecurityResult<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(PDFSecurityError::crypto(format!(
            "{} bytes is not a multiple of the AES block size",
            data.len()
        )));
    }
    Ok(())
}

enum CbcState {
    Aes128(Aes128CbcDec),
    Aes256(Aes256CbcDec),
}

impl CbcState {
    fn decrypt_blocks(&mut self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(chunk);
            match self {
                CbcState::Aes128(cipher) => cipher.decrypt_block_mut(block),
                CbcState::Aes256(cipher) => cipher.decrypt_block_mut(block),
            }
        }
    }
}

/// Chunked AES-CBC decryption of one `IV ‖ ciphertext` payload.
///
/// The first 16 bytes fed are taken as IV. The last complete block is held
/// back until [`CbcStreamDecryptor::finish`] so the padding can be stripped.
pub(crate) struct CbcStreamDecryptor {
    key: zeroize::Zeroizing<Vec<u8>>,
    state: Option<CbcState>,
    pending: Vec<u8>,
}

impl CbcStreamDecryptor {
    pub fn new(key: &[u8]) -> PDFSecurityResult<Self> {
        if key.len() != 16 && key.len() != 32 {
            return Err(PDFSecurityError::unsupported(format!("AES key of {} bytes", key.len())));
        }
        Ok(Self {
            key: zeroize::Zeroizing::new(key.to_vec()),
            state: None,
            pending: Vec::new(),
        })
    }

    pub fn update(&mut self, chunk: &[u8]) -> PDFSecurityResult<Vec<u8>> {
        self.pending.extend_from_slice(chunk);

        if self.state.is_none() {
            if self.pending.len() < BLOCK_SIZE {
                return Ok(Vec::new());
            }
            let iv: Vec<u8> = self.pending.drain(..BLOCK_SIZE).collect();
            self.state = Some(match self.key.len() {
                16 => CbcState::Aes128(Aes128CbcDec::new_from_slices(&self.key, &iv)?),
                _ => CbcState::Aes256(Aes256CbcDec::new_from_slices(&self.key, &iv)?),
            });
        }

        // Keep one full block back for padding removal
        let full = self.pending.len() / BLOCK_SIZE;
        let ready = if self.pending.len() % BLOCK_SIZE == 0 {
            full.saturating_sub(1)
        } else {
            full
        } * BLOCK_SIZE;
        if ready == 0 {
            return Ok(Vec::new());
        }

        let mut out: Vec<u8> = self.pending.drain(..ready).collect();
        if let Some(state) = self.state.as_mut() {
            state.decrypt_blocks(&mut out);
        }
        Ok(out)
    }

    pub fn finish(mut self) -> PDFSecurityResult<Vec<u8>> {
        let Some(state) = self.state.as_mut() else {
            if self.pending.is_empty() {
                return Ok(Vec::new());
            }
            return Err(PDFSecurityError::crypto("AES payload shorter than its IV"));
        };

        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        if self.pending.len() != BLOCK_SIZE {
            return Err(PDFSecurityError::crypto("truncated AES payload"));
        }

        let mut last = std::mem::take(&mut self.pending);
        state.decrypt_blocks(&mut last);
        let unpadded = unpad(&last)?;
        last.truncate(unpadded);
        Ok(last)
    }
}

/// Length of `block` without its PKCS#7 padding
fn unpad(block: &[u8]) -> PDFSecurityResult<usize> {
    let pad = block.last().copied().unwrap_or(0) as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > block.len() {
        return Err(PDFSecurityError::crypto("invalid AES padding"));
    }
    let start = block.len() - pad;
    if block[start..].iter().any(|&b| b as usize != pad) {
        return Err(PDFSecurityError::crypto("invalid AES padding"));
    }
    Ok(start)
}
