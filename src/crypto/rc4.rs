//! RC4 keystream over runtime key lengths

use rc4::consts::{U10, U11, U12, U13, U14, U15, U16, U5, U6, U7, U8, U9};
use rc4::{KeyInit, Rc4, StreamCipher};

use crate::error::{PDFSecurityError, PDFSecurityResult};

/// RC4 state that keeps its position across chunks
pub(crate) struct Rc4Stream {
    cipher: Box<dyn StreamCipher + Send>,
}

impl Rc4Stream {
    /// Create keystream for a 5 to 16 byte key
    pub fn new(key: &[u8]) -> PDFSecurityResult<Self> {
        macro_rules! keyed {
            ($($len:literal => $size:ty),* $(,)?) => {
                match key.len() {
                    $($len => Box::new(Rc4::<$size>::new_from_slice(key)?) as Box<dyn StreamCipher + Send>,)*
                    len => {
                        return Err(PDFSecurityError::unsupported(format!("RC4 key of {} bytes", len)))
                    }
                }
            };
        }

        let cipher = keyed!(
            5 => U5, 6 => U6, 7 => U7, 8 => U8, 9 => U9, 10 => U10,
            11 => U11, 12 => U12, 13 => U13, 14 => U14, 15 => U15, 16 => U16,
        );
        Ok(Self { cipher })
    }

    pub fn apply(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
    }
}

/// One-shot RC4 over a copy of `data`
pub(crate) fn rc4_apply(key: &[u8], data: &[u8]) -> PDFSecurityResult<Vec<u8>> {
    let mut out = data.to_vec();
    Rc4Stream::new(key)?.apply(&mut out);
    Ok(out)
}
