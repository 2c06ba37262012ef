//! Cipher descriptions and the per-object transforms shared by every scheme

mod aes;
mod object_crypt;
mod rc4;

use std::fmt;

use zeroize::Zeroizing;

pub use object_crypt::{ObjectCrypt, ObjectDecryptor};

pub(crate) use self::aes::{cbc_decrypt_raw, cbc_encrypt_raw};
pub(crate) use self::rc4::rc4_apply;

use crate::buffer::copy_out;
use crate::error::{PDFSecurityError, PDFSecurityResult};

/// Raw identifier of "no cipher"
pub const FSCRT_CIPHER_NONE: i32 = 0;
/// Raw identifier of RC4
pub const FSCRT_CIPHER_RC4: i32 = 1;
/// Raw identifier of AES
pub const FSCRT_CIPHER_AES: i32 = 2;

/// Cipher identifier reported by a security handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherId {
    None,
    Rc4,
    Aes,
    /// Identifier only the reporting handler understands
    Other(i32),
}

impl CipherId {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            FSCRT_CIPHER_NONE => CipherId::None,
            FSCRT_CIPHER_RC4 => CipherId::Rc4,
            FSCRT_CIPHER_AES => CipherId::Aes,
            other => CipherId::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            CipherId::None => FSCRT_CIPHER_NONE,
            CipherId::Rc4 => FSCRT_CIPHER_RC4,
            CipherId::Aes => FSCRT_CIPHER_AES,
            CipherId::Other(raw) => raw,
        }
    }

    /// Check key length against the cipher's constraints
    pub fn validate_key_len(self, len: usize) -> PDFSecurityResult<()> {
        let valid = match self {
            CipherId::Rc4 => (5..=16).contains(&len),
            CipherId::Aes => len == 16 || len == 32,
            CipherId::None => len == 0,
            CipherId::Other(_) => true,
        };
        if valid {
            Ok(())
        } else {
            Err(PDFSecurityError::unsupported(format!(
                "{} bytes key for {:?}",
                len, self
            )))
        }
    }
}

/// Cipher identifier plus key material of one encryption context
#[derive(Clone, PartialEq, Eq)]
pub struct CipherInfo {
    cipher: CipherId,
    key: Zeroizing<Vec<u8>>,
}

impl CipherInfo {
    pub fn new(cipher: CipherId, key: impl Into<Vec<u8>>) -> PDFSecurityResult<Self> {
        let key = Zeroizing::new(key.into());
        cipher.validate_key_len(key.len())?;
        Ok(Self { cipher, key })
    }

    pub fn rc4(key: impl Into<Vec<u8>>) -> PDFSecurityResult<Self> {
        Self::new(CipherId::Rc4, key)
    }

    pub fn aes(key: impl Into<Vec<u8>>) -> PDFSecurityResult<Self> {
        Self::new(CipherId::Aes, key)
    }

    /// Plain text pass-through
    pub fn none() -> Self {
        Self {
            cipher: CipherId::None,
            key: Zeroizing::new(Vec::new()),
        }
    }

    pub fn cipher(&self) -> CipherId {
        self.cipher
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// Export the key with the two-call size convention
    pub fn copy_key(&self, out: Option<&mut [u8]>) -> PDFSecurityResult<usize> {
        copy_out(&self.key, out)
    }
}

impl fmt::Debug for CipherInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherInfo")
            .field("cipher", &self.cipher)
            .field("key_len", &self.key.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CipherId::Rc4, 5, true)]
    #[case(CipherId::Rc4, 16, true)]
    #[case(CipherId::Rc4, 4, false)]
    #[case(CipherId::Rc4, 17, false)]
    #[case(CipherId::Aes, 16, true)]
    #[case(CipherId::Aes, 32, true)]
    #[case(CipherId::Aes, 24, false)]
    #[case(CipherId::Other(9), 3, true)]
    fn test_key_length_rules(#[case] cipher: CipherId, #[case] len: usize, #[case] ok: bool) {
        let result = CipherInfo::new(cipher, vec![0u8; len]);
        assert_eq!(result.is_ok(), ok);
        if !ok {
            assert!(matches!(result, Err(PDFSecurityError::Unsupported(_))));
        }
    }

    #[test]
    fn test_raw_identifiers() {
        assert_eq!(CipherId::from_raw(0), CipherId::None);
        assert_eq!(CipherId::from_raw(1), CipherId::Rc4);
        assert_eq!(CipherId::from_raw(2), CipherId::Aes);
        assert_eq!(CipherId::from_raw(77), CipherId::Other(77));
        assert_eq!(CipherId::Other(77).raw(), 77);
    }

    #[test]
    fn test_copy_key_two_call() {
        let info = CipherInfo::aes(vec![3u8; 16]).unwrap();
        let len = info.copy_key(None).unwrap();
        assert_eq!(len, 16);

        let mut short = [0u8; 15];
        assert!(matches!(
            info.copy_key(Some(&mut short)),
            Err(PDFSecurityError::BufferTooSmall { required: 16, provided: 15 })
        ));

        let mut buf = vec![0u8; len];
        info.copy_key(Some(&mut buf)).unwrap();
        assert_eq!(buf, vec![3u8; 16]);
    }

    #[test]
    fn test_debug_hides_key() {
        let info = CipherInfo::rc4(b"secret".to_vec()).unwrap();
        let text = format!("{:?}", info);
        assert!(!text.contains("115"));
        assert!(text.contains("key_len: 6"));
    }
}
