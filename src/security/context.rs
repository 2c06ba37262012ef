//! Encryption context lifecycle

use log::{debug, trace};

use crate::crypto::CipherInfo;
use crate::error::{PDFSecurityError, PDFSecurityResult};
use crate::handlers::{ContextRequest, HandlerContext, HandlerRegistry, OpenContextGuard};
use crate::permissions::PDFPermissions;

/// Scheme state of one document-level encrypt or decrypt operation.
///
/// The cipher info is asked from the handler once and cached. Scheme state is
/// released by [`EncryptionContext::close`], or on drop if the caller never
/// closed it.
pub struct EncryptionContext {
    inner: Option<Box<dyn HandlerContext>>,
    cipher: Option<CipherInfo>,
    guard: OpenContextGuard,
}

impl EncryptionContext {
    /// Create a context from the handler registered for `request.filter`
    pub fn create(registry: &HandlerRegistry, request: &ContextRequest<'_>) -> PDFSecurityResult<Self> {
        let (handler, guard) = registry
            .acquire(request.filter)
            .ok_or_else(|| PDFSecurityError::UnknownSecurityHandler(request.filter.to_string()))?;

        debug!("Creating {:?} context for filter {}", request.mode, request.filter);
        let inner = handler.create_context(request)?;
        Ok(Self {
            inner: Some(inner),
            cipher: None,
            guard,
        })
    }

    pub fn filter(&self) -> &str {
        self.guard.filter()
    }

    pub(crate) fn handler(&self) -> PDFSecurityResult<&dyn HandlerContext> {
        self.inner
            .as_deref()
            .ok_or_else(|| PDFSecurityError::unrecoverable("encryption context already released"))
    }

    /// Permissions for this opening, never wider than `original`
    pub fn user_permissions(&self, original: PDFPermissions) -> PDFSecurityResult<PDFPermissions> {
        let granted = self.handler()?.user_permissions(original)?;
        Ok(granted.intersect(original))
    }

    pub fn is_owner(&self) -> PDFSecurityResult<bool> {
        self.handler()?.is_owner()
    }

    /// Cipher and key of this context, queried from the handler once
    pub fn cipher_info(&mut self) -> PDFSecurityResult<&CipherInfo> {
        if self.cipher.is_none() {
            let info = self.handler()?.cipher_info()?;
            trace!("Context cipher {:?}", info);
            self.cipher = Some(info);
        }
        self.cached_cipher()
    }

    pub(crate) fn cached_cipher(&self) -> PDFSecurityResult<&CipherInfo> {
        self.cipher
            .as_ref()
            .ok_or_else(|| PDFSecurityError::unrecoverable("cipher info not negotiated"))
    }

    /// Planning hint only
    pub fn decrypted_size(&self, len: usize) -> usize {
        self.inner.as_ref().map_or(len, |inner| inner.decrypted_size(len))
    }

    /// Release scheme state
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            debug!("Releasing context for filter {}", self.guard.filter());
            inner.release();
        }
    }
}

impl Drop for EncryptionContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("filter", &self.filter())
            .field("open", &self.inner.is_some())
            .field("cipher", &self.cipher)
            .finish()
    }
}
