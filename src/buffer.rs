//! Two-call size negotiation for buffer-returning operations.
//!
//! Every operation that hands back a variable-length byte buffer can be called
//! first without an output buffer to learn the required length, then again
//! with a buffer of at least that length. Stateless operations use
//! [`copy_out`]; streaming ones keep the produced bytes in a
//! [`SizeNegotiator`] between the two calls so that cipher state advances
//! exactly once per input.

use zeroize::Zeroizing;

use crate::error::{PDFSecurityError, PDFSecurityResult};

/// Copy `src` into `out`, or report the required length when `out` is `None`.
pub fn copy_out(src: &[u8], out: Option<&mut [u8]>) -> PDFSecurityResult<usize> {
    match out {
        None => Ok(src.len()),
        Some(buf) if buf.len() < src.len() => {
            Err(PDFSecurityError::buffer_too_small(src.len(), buf.len()))
        }
        Some(buf) => {
            buf[..src.len()].copy_from_slice(src);
            Ok(src.len())
        }
    }
}

/// Pending output of a streaming call, held between size query and fill.
#[derive(Default)]
pub struct SizeNegotiator {
    pending: Option<Zeroizing<Vec<u8>>>,
}

impl SizeNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `produce` unless output is already pending, then hand it out.
    ///
    /// With `out == None` the output stays pending and its length is returned.
    /// A buffer shorter than the pending output fails with `BufferTooSmall`
    /// and leaves the output pending, so the caller may retry. The input of a
    /// fill call that follows a size query is not processed again.
    pub fn negotiate<F>(&mut self, out: Option<&mut [u8]>, produce: F) -> PDFSecurityResult<usize>
    where
        F: FnOnce() -> PDFSecurityResult<Vec<u8>>,
    {
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => Zeroizing::new(produce()?),
        };

        match out {
            None => {
                let len = pending.len();
                self.pending = Some(pending);
                Ok(len)
            }
            Some(buf) if buf.len() < pending.len() => {
                let err = PDFSecurityError::buffer_too_small(pending.len(), buf.len());
                self.pending = Some(pending);
                Err(err)
            }
            Some(buf) => {
                buf[..pending.len()].copy_from_slice(&pending);
                Ok(pending.len())
            }
        }
    }

    /// Whether a size query is waiting for its fill call
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
