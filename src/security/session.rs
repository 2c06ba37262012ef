//! Per-payload transform sessions

use log::trace;

use super::EncryptionContext;
use crate::buffer::SizeNegotiator;
use crate::crypto::CipherInfo;
use crate::error::{PDFSecurityError, PDFSecurityResult};
use crate::handlers::{Decryptor, HandlerContext};
use crate::pdf::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Created,
    Feeding,
    /// A finish size query is waiting for its fill call
    Finishing,
    Finished,
}

/// Chunked decryption of one payload of object `(num, gen)`.
///
/// `Created -> Feeding* -> Finished`. Output of `feed` only contains fully
/// decoded bytes; `finish` flushes the rest and must be called exactly once.
pub struct DecryptSession {
    id: ObjectId,
    decryptor: Option<Box<dyn Decryptor>>,
    negotiator: SizeNegotiator,
    state: SessionState,
}

impl DecryptSession {
    pub fn open(context: &mut EncryptionContext, number: u32, generation: u16) -> PDFSecurityResult<Self> {
        let id = ObjectId::new(number, generation);
        let cipher = context.cipher_info()?.clone();
        let decryptor = context.handler()?.start_decryptor(id, &cipher)?;
        trace!("Opened decrypt session for {}", id);
        Ok(Self {
            id,
            decryptor: Some(decryptor),
            negotiator: SizeNegotiator::new(),
            state: SessionState::Created,
        })
    }

    pub fn object_id(&self) -> ObjectId {
        self.id
    }

    fn out_of_order(&self, call: &str) -> PDFSecurityError {
        PDFSecurityError::unrecoverable(format!(
            "{} on decrypt session {} in state {:?}",
            call, self.id, self.state
        ))
    }

    pub fn feed(&mut self, chunk: &[u8]) -> PDFSecurityResult<Vec<u8>> {
        if self.negotiator.has_pending() {
            return Err(self.out_of_order("feed with a pending size query"));
        }
        let len = self.feed_into(chunk, None)?;
        let mut out = vec![0u8; len];
        self.feed_into(chunk, Some(&mut out))?;
        Ok(out)
    }

    /// Two-call form of [`DecryptSession::feed`].
    ///
    /// With `out == None` the chunk is decrypted and the output length
    /// returned; the fill call that follows hands out that output without
    /// consuming its chunk again.
    pub fn feed_into(&mut self, chunk: &[u8], out: Option<&mut [u8]>) -> PDFSecurityResult<usize> {
        if !matches!(self.state, SessionState::Created | SessionState::Feeding) {
            return Err(self.out_of_order("feed"));
        }
        self.state = SessionState::Feeding;

        let Self {
            decryptor,
            negotiator,
            ..
        } = self;
        negotiator.negotiate(out, || match decryptor.as_mut() {
            Some(decryptor) => decryptor.feed(chunk),
            None => Err(PDFSecurityError::unrecoverable("decryptor already released")),
        })
    }

    /// Flush held-back plaintext and close the session
    pub fn finish(mut self) -> PDFSecurityResult<Vec<u8>> {
        if self.negotiator.has_pending() && self.state != SessionState::Finishing {
            return Err(self.out_of_order("finish with a pending size query"));
        }
        let len = self.finish_into(None)?;
        let mut out = vec![0u8; len];
        self.finish_into(Some(&mut out))?;
        Ok(out)
    }

    /// Two-call form of [`DecryptSession::finish`]
    pub fn finish_into(&mut self, out: Option<&mut [u8]>) -> PDFSecurityResult<usize> {
        match self.state {
            SessionState::Finished => return Err(self.out_of_order("finish")),
            SessionState::Created | SessionState::Feeding if self.negotiator.has_pending() => {
                return Err(self.out_of_order("finish with a pending feed"))
            }
            _ => {}
        }

        let filling = out.is_some();
        let Self {
            decryptor,
            negotiator,
            ..
        } = self;
        let result = negotiator.negotiate(out, || match decryptor.take() {
            Some(decryptor) => decryptor.finish(),
            None => Err(PDFSecurityError::unrecoverable("decryptor already released")),
        });

        self.state = match &result {
            Ok(_) if filling => SessionState::Finished,
            Ok(_) | Err(PDFSecurityError::BufferTooSmall { .. }) => SessionState::Finishing,
            Err(_) => SessionState::Finished,
        };
        if self.state == SessionState::Finished {
            trace!("Closed decrypt session for {}", self.id);
        }
        result
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }
}

/// Encryption of one payload of object `(num, gen)`.
///
/// [`EncryptSession::encrypted_size`] must be asked before
/// [`EncryptSession::encrypt_into`], and the output buffer sized against it.
pub struct EncryptSession<'c> {
    id: ObjectId,
    handler: &'c dyn HandlerContext,
    cipher: &'c CipherInfo,
    reserved: Option<usize>,
    finished: bool,
}

impl<'c> EncryptSession<'c> {
    pub fn open(context: &'c mut EncryptionContext, number: u32, generation: u16) -> PDFSecurityResult<Self> {
        context.cipher_info()?;
        let context: &'c EncryptionContext = context;
        Self::with_context(context, ObjectId::new(number, generation))
    }

    /// Open on a context whose cipher info is already negotiated
    pub(crate) fn with_context(context: &'c EncryptionContext, id: ObjectId) -> PDFSecurityResult<Self> {
        Ok(Self {
            id,
            handler: context.handler()?,
            cipher: context.cached_cipher()?,
            reserved: None,
            finished: false,
        })
    }

    pub fn object_id(&self) -> ObjectId {
        self.id
    }

    /// Upper bound of the ciphertext for `plaintext`
    pub fn encrypted_size(&mut self, plaintext: &[u8]) -> PDFSecurityResult<usize> {
        if self.finished {
            return Err(PDFSecurityError::unrecoverable(format!(
                "size query on finished encrypt session {}",
                self.id
            )));
        }
        let size = self.handler.encrypted_size(self.id, self.cipher, plaintext)?;
        self.reserved = Some(size);
        Ok(size)
    }

    /// Encrypt into a buffer sized by [`EncryptSession::encrypted_size`]
    pub fn encrypt_into(&mut self, plaintext: &[u8], out: &mut [u8]) -> PDFSecurityResult<usize> {
        if self.finished {
            return Err(PDFSecurityError::unrecoverable(format!(
                "encrypt on finished encrypt session {}",
                self.id
            )));
        }
        let reserved = self.reserved.ok_or_else(|| {
            PDFSecurityError::unrecoverable(format!("encrypt without size query on session {}", self.id))
        })?;
        if out.len() < reserved {
            return Err(PDFSecurityError::buffer_too_small(reserved, out.len()));
        }

        self.finished = true;
        let written = self
            .handler
            .encrypt_data(self.id, self.cipher, plaintext, &mut out[..reserved])?;
        if written > reserved {
            return Err(PDFSecurityError::buffer_too_small(written, reserved));
        }
        Ok(written)
    }

    /// Size query and encryption in one call
    pub fn encrypt(mut self, plaintext: &[u8]) -> PDFSecurityResult<Vec<u8>> {
        let size = self.encrypted_size(plaintext)?;
        let mut out = vec![0u8; size];
        let written = self.encrypt_into(plaintext, &mut out)?;
        out.truncate(written);
        Ok(out)
    }
}
