//! Per-object key derivation and payload transforms

use zeroize::Zeroizing;

use super::aes::{cbc_encrypt_payload, padded_size, CbcStreamDecryptor};
use super::rc4::{rc4_apply, Rc4Stream};
use super::{CipherId, CipherInfo};
use crate::error::{PDFSecurityError, PDFSecurityResult};
use crate::pdf::ObjectId;

/// Key and cipher for the payloads of one indirect object.
///
/// RC4 and AES-128 keys are `MD5(file key ‖ object number (3 bytes LE) ‖
/// generation (2 bytes LE) [‖ "sAlT"])` truncated to `min(n + 5, 16)`.
/// AES-256 uses the file key for every object.
pub struct ObjectCrypt {
    cipher: CipherId,
    key: Zeroizing<Vec<u8>>,
}

impl ObjectCrypt {
    pub fn new(info: &CipherInfo, id: ObjectId) -> PDFSecurityResult<Self> {
        let key = match info.cipher() {
            CipherId::None => Zeroizing::new(Vec::new()),
            CipherId::Aes if info.key_len() == 32 => Zeroizing::new(info.key().to_vec()),
            CipherId::Rc4 | CipherId::Aes => derive_object_key(info, id),
            CipherId::Other(raw) => {
                return Err(PDFSecurityError::unsupported(format!(
                    "cipher {} has no built-in object transform",
                    raw
                )))
            }
        };
        Ok(Self {
            cipher: info.cipher(),
            key,
        })
    }

    pub fn object_key(&self) -> &[u8] {
        &self.key
    }

    /// Start a chunked decryption of one payload
    pub fn decryptor(&self) -> PDFSecurityResult<ObjectDecryptor> {
        let inner = match self.cipher {
            CipherId::Rc4 => DecryptState::Rc4(Rc4Stream::new(&self.key)?),
            CipherId::Aes => DecryptState::Aes(CbcStreamDecryptor::new(&self.key)?),
            _ => DecryptState::Identity,
        };
        Ok(ObjectDecryptor { inner })
    }

    /// Exact ciphertext size for a plaintext of `len` bytes
    pub fn encrypted_size(&self, len: usize) -> usize {
        match self.cipher {
            CipherId::Aes => padded_size(len),
            _ => len,
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> PDFSecurityResult<Vec<u8>> {
        match self.cipher {
            CipherId::Rc4 => rc4_apply(&self.key, plaintext),
            CipherId::Aes => cbc_encrypt_payload(&self.key, plaintext),
            _ => Ok(plaintext.to_vec()),
        }
    }

    /// Whole-payload decryption
    pub fn decrypt(&self, ciphertext: &[u8]) -> PDFSecurityResult<Vec<u8>> {
        let mut decryptor = self.decryptor()?;
        let mut out = decryptor.update(ciphertext)?;
        out.extend(decryptor.finish()?);
        Ok(out)
    }
}

fn derive_object_key(info: &CipherInfo, id: ObjectId) -> Zeroizing<Vec<u8>> {
    let mut buf = Zeroizing::new(Vec::with_capacity(info.key_len() + 9));
    buf.extend_from_slice(info.key());
    // Low order 3 bytes of the object number, 2 of the generation
    buf.extend_from_slice(&id.number.to_le_bytes()[..3]);
    buf.extend_from_slice(&id.generation.to_le_bytes());
    if info.cipher() == CipherId::Aes {
        buf.extend_from_slice(b"sAlT");
    }

    let digest = md5::compute(&buf[..]);
    let len = (info.key_len() + 5).min(16);
    Zeroizing::new(digest.0[..len].to_vec())
}

enum DecryptState {
    Identity,
    Rc4(Rc4Stream),
    Aes(CbcStreamDecryptor),
}

/// Chunked decryption state of one payload
pub struct ObjectDecryptor {
    inner: DecryptState,
}

impl ObjectDecryptor {
    /// Decrypt the next chunk; output may lag input by one AES block
    pub fn update(&mut self, chunk: &[u8]) -> PDFSecurityResult<Vec<u8>> {
        match &mut self.inner {
            DecryptState::Identity => Ok(chunk.to_vec()),
            DecryptState::Rc4(stream) => {
                let mut out = chunk.to_vec();
                stream.apply(&mut out);
                Ok(out)
            }
            DecryptState::Aes(cbc) => cbc.update(chunk),
        }
    }

    /// Flush held-back bytes
    pub fn finish(self) -> PDFSecurityResult<Vec<u8>> {
        match self.inner {
            DecryptState::Aes(cbc) => cbc.finish(),
            _ => Ok(Vec::new()),
        }
    }
}
