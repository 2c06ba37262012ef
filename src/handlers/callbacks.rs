//! Security handler assembled from individual callbacks

use std::sync::Arc;

use super::{ContextRequest, Decryptor, HandlerContext, SecurityHandler};
use crate::crypto::CipherInfo;
use crate::error::{PDFSecurityError, PDFSecurityResult};
use crate::pdf::ObjectId;
use crate::permissions::PDFPermissions;

type CreateFn<T> = Box<dyn Fn(&ContextRequest<'_>) -> PDFSecurityResult<T> + Send + Sync>;
type ReleaseFn<T> = Box<dyn Fn(T) + Send + Sync>;
type PermissionsFn<T> = Box<dyn Fn(&T, PDFPermissions) -> PDFPermissions + Send + Sync>;
type OwnerFn<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type CipherFn<T> = Box<dyn Fn(&T) -> PDFSecurityResult<CipherInfo> + Send + Sync>;
type DecryptedSizeFn<T> = Box<dyn Fn(&T, usize) -> usize + Send + Sync>;
type StartDecryptorFn<T, D> = Box<dyn Fn(&T, ObjectId, &CipherInfo) -> PDFSecurityResult<D> + Send + Sync>;
type DecryptFeedFn<D> = Box<dyn Fn(&mut D, &[u8]) -> PDFSecurityResult<Vec<u8>> + Send + Sync>;
type DecryptFinishFn<D> = Box<dyn Fn(D) -> PDFSecurityResult<Vec<u8>> + Send + Sync>;
type EncryptedSizeFn<T> = Box<dyn Fn(&T, ObjectId, &CipherInfo, &[u8]) -> usize + Send + Sync>;
type EncryptFn<T> =
    Box<dyn Fn(&T, ObjectId, &CipherInfo, &[u8], &mut [u8]) -> PDFSecurityResult<usize> + Send + Sync>;

/// Builder for a handler described callback by callback.
///
/// `T` is the per-context state produced by `create_context`, `D` the
/// per-payload decryptor state produced by `start_decryptor`. Every callback
/// is required; [`CallbackHandler::build`] names the first one missing.
pub struct CallbackHandler<T, D> {
    create_context: Option<CreateFn<T>>,
    release_context: Option<ReleaseFn<T>>,
    user_permissions: Option<PermissionsFn<T>>,
    is_owner: Option<OwnerFn<T>>,
    cipher_info: Option<CipherFn<T>>,
    decrypted_size: Option<DecryptedSizeFn<T>>,
    start_decryptor: Option<StartDecryptorFn<T, D>>,
    decrypt_feed: Option<DecryptFeedFn<D>>,
    decrypt_finish: Option<DecryptFinishFn<D>>,
    encrypted_size: Option<EncryptedSizeFn<T>>,
    encrypt_data: Option<EncryptFn<T>>,
}

impl<T, D> Default for CallbackHandler<T, D> {
    fn default() -> Self {
        Self {
            create_context: None,
            release_context: None,
            user_permissions: None,
            is_owner: None,
            cipher_info: None,
            decrypted_size: None,
            start_decryptor: None,
            decrypt_feed: None,
            decrypt_finish: None,
            encrypted_size: None,
            encrypt_data: None,
        }
    }
}

impl<T: Send + 'static, D: Send + 'static> CallbackHandler<T, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_context<F>(mut self, f: F) -> Self
    where
        F: Fn(&ContextRequest<'_>) -> PDFSecurityResult<T> + Send + Sync + 'static,
    {
        self.create_context = Some(Box::new(f));
        self
    }

    pub fn release_context<F>(mut self, f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.release_context = Some(Box::new(f));
        self
    }

    pub fn user_permissions<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, PDFPermissions) -> PDFPermissions + Send + Sync + 'static,
    {
        self.user_permissions = Some(Box::new(f));
        self
    }

    pub fn is_owner<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.is_owner = Some(Box::new(f));
        self
    }

    pub fn cipher_info<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> PDFSecurityResult<CipherInfo> + Send + Sync + 'static,
    {
        self.cipher_info = Some(Box::new(f));
        self
    }

    pub fn decrypted_size<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, usize) -> usize + Send + Sync + 'static,
    {
        self.decrypted_size = Some(Box::new(f));
        self
    }

    pub fn start_decryptor<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, ObjectId, &CipherInfo) -> PDFSecurityResult<D> + Send + Sync + 'static,
    {
        self.start_decryptor = Some(Box::new(f));
        self
    }

    pub fn decrypt_feed<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut D, &[u8]) -> PDFSecurityResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.decrypt_feed = Some(Box::new(f));
        self
    }

    pub fn decrypt_finish<F>(mut self, f: F) -> Self
    where
        F: Fn(D) -> PDFSecurityResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.decrypt_finish = Some(Box::new(f));
        self
    }

    pub fn encrypted_size<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, ObjectId, &CipherInfo, &[u8]) -> usize + Send + Sync + 'static,
    {
        self.encrypted_size = Some(Box::new(f));
        self
    }

    pub fn encrypt_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, ObjectId, &CipherInfo, &[u8], &mut [u8]) -> PDFSecurityResult<usize> + Send + Sync + 'static,
    {
        self.encrypt_data = Some(Box::new(f));
        self
    }

    /// Check completeness and turn the callbacks into a handler
    pub fn build(self) -> PDFSecurityResult<Arc<dyn SecurityHandler>> {
        fn required<F>(callback: Option<F>, name: &'static str) -> PDFSecurityResult<F> {
            callback.ok_or(PDFSecurityError::InvalidHandler(name))
        }

        let callbacks = Callbacks {
            create_context: required(self.create_context, "create_context")?,
            release_context: required(self.release_context, "release_context")?,
            user_permissions: required(self.user_permissions, "user_permissions")?,
            is_owner: required(self.is_owner, "is_owner")?,
            cipher_info: required(self.cipher_info, "cipher_info")?,
            decrypted_size: required(self.decrypted_size, "decrypted_size")?,
            start_decryptor: required(self.start_decryptor, "start_decryptor")?,
            decrypt_feed: required(self.decrypt_feed, "decrypt_feed")?,
            decrypt_finish: required(self.decrypt_finish, "decrypt_finish")?,
            encrypted_size: required(self.encrypted_size, "encrypted_size")?,
            encrypt_data: required(self.encrypt_data, "encrypt_data")?,
        };
        Ok(Arc::new(CallbackSecurityHandler {
            callbacks: Arc::new(callbacks),
        }))
    }
}

struct Callbacks<T, D> {
    create_context: CreateFn<T>,
    release_context: ReleaseFn<T>,
    user_permissions: PermissionsFn<T>,
    is_owner: OwnerFn<T>,
    cipher_info: CipherFn<T>,
    decrypted_size: DecryptedSizeFn<T>,
    start_decryptor: StartDecryptorFn<T, D>,
    decrypt_feed: DecryptFeedFn<D>,
    decrypt_finish: DecryptFinishFn<D>,
    encrypted_size: EncryptedSizeFn<T>,
    encrypt_data: EncryptFn<T>,
}

struct CallbackSecurityHandler<T, D> {
    callbacks: Arc<Callbacks<T, D>>,
}

impl<T: Send + 'static, D: Send + 'static> SecurityHandler for CallbackSecurityHandler<T, D> {
    fn create_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<Box<dyn HandlerContext>> {
        let state = (self.callbacks.create_context)(request)?;
        Ok(Box::new(CallbackContext {
            callbacks: Arc::clone(&self.callbacks),
            state: Some(state),
        }))
    }
}

struct CallbackContext<T, D> {
    callbacks: Arc<Callbacks<T, D>>,
    state: Option<T>,
}

impl<T, D> CallbackContext<T, D> {
    fn state(&self) -> PDFSecurityResult<&T> {
        self.state
            .as_ref()
            .ok_or_else(|| PDFSecurityError::unrecoverable("handler context already released"))
    }
}

impl<T: Send + 'static, D: Send + 'static> HandlerContext for CallbackContext<T, D> {
    fn user_permissions(&self, original: PDFPermissions) -> PDFSecurityResult<PDFPermissions> {
        Ok((self.callbacks.user_permissions)(self.state()?, original))
    }

    fn is_owner(&self) -> PDFSecurityResult<bool> {
        Ok((self.callbacks.is_owner)(self.state()?))
    }

    fn cipher_info(&self) -> PDFSecurityResult<CipherInfo> {
        (self.callbacks.cipher_info)(self.state()?)
    }

    fn decrypted_size(&self, len: usize) -> usize {
        match self.state.as_ref() {
            Some(state) => (self.callbacks.decrypted_size)(state, len),
            None => len,
        }
    }

    fn start_decryptor(&self, id: ObjectId, cipher: &CipherInfo) -> PDFSecurityResult<Box<dyn Decryptor>> {
        let state = (self.callbacks.start_decryptor)(self.state()?, id, cipher)?;
        Ok(Box::new(CallbackDecryptor {
            callbacks: Arc::clone(&self.callbacks),
            state,
        }))
    }

    fn encrypted_size(&self, id: ObjectId, cipher: &CipherInfo, plaintext: &[u8]) -> PDFSecurityResult<usize> {
        Ok((self.callbacks.encrypted_size)(self.state()?, id, cipher, plaintext))
    }

    fn encrypt_data(
        &self,
        id: ObjectId,
        cipher: &CipherInfo,
        plaintext: &[u8],
        out: &mut [u8],
    ) -> PDFSecurityResult<usize> {
        (self.callbacks.encrypt_data)(self.state()?, id, cipher, plaintext, out)
    }

    fn release(&mut self) {
        if let Some(state) = self.state.take() {
            (self.callbacks.release_context)(state);
        }
    }
}

struct CallbackDecryptor<T, D> {
    callbacks: Arc<Callbacks<T, D>>,
    state: D,
}

impl<T: Send + 'static, D: Send + 'static> Decryptor for CallbackDecryptor<T, D> {
    fn feed(&mut self, chunk: &[u8]) -> PDFSecurityResult<Vec<u8>> {
        (self.callbacks.decrypt_feed)(&mut self.state, chunk)
    }

    fn finish(self: Box<Self>) -> PDFSecurityResult<Vec<u8>> {
        let CallbackDecryptor { callbacks, state } = *self;
        (callbacks.decrypt_finish)(state)
    }
}
