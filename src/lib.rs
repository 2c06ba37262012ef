//! PDF Security Library for Rust
//!
//! Pluggable document-security handlers for PDF: password (`Standard`),
//! certificate (`Adobe.PubSec`), Foxit DRM, Microsoft RMS and caller-defined
//! schemes, all driven through one handler interface and a resumable
//! encrypt/decrypt pipeline that writes into an [`ObjectSink`].
//!
//! ```no_run
//! use pdf_security::{Credentials, DocumentSink, PDFSecurity, PasswordParams, SaveFlags};
//! # fn demo(document: &pdf_security::Document) -> pdf_security::PDFSecurityResult<()> {
//! let security = PDFSecurity::new();
//! let mut sink = DocumentSink::new();
//! let mut progress = security.start_password_encryption(
//!     document,
//!     PasswordParams::new("user", "owner"),
//!     &mut sink,
//!     SaveFlags::empty(),
//! )?;
//! progress.run_to_end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub mod buffer;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod pdf;
pub mod permissions;
pub mod progress;
pub mod security;

pub use crypto::{CipherId, CipherInfo};
pub use error::{PDFSecurityError, PDFSecurityResult};
pub use handlers::{
    CallbackHandler, CertificateKeyProvider, CertificateParams, ContextMode, ContextRequest, Credentials,
    CustomParams, Decryptor, EncryptionParams, FoxitDrmParams, FoxitDrmProvider, HandlerContext,
    HandlerRegistry, PasswordParams, PasswordType, RmsParams, SecurityHandler,
};
pub use pdf::{Dictionary, Document, DocumentSink, Object, ObjectId, ObjectSink, PdfWriter, Stream};
pub use permissions::PDFPermissions;
pub use progress::{Operation, PauseHandler, Progress, SaveFlags, StepResult, WorkBudget};
pub use security::{DecryptSession, EncryptSession, EncryptionContext};

use handlers::{
    FoxitDrmHandler, ProviderSlot, PublicKeySecurityHandler, StandardSecurityHandler, FOXIT_DRM_FILTER,
    PUBSEC_FILTER, STANDARD_FILTER,
};

/// Kind of security applied to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EncryptionType {
    /// Not encrypted
    NoEncrypt = 0,
    /// Password-based encryption (`Standard`)
    Password = 1,
    /// Certificate-based encryption (`Adobe.PubSec`)
    Certificate = 2,
    /// Foxit DRM
    FoxitDRM = 3,
    /// Any other registered filter
    Custom = 4,
    /// Microsoft RMS
    RMS = 5,
}

impl EncryptionType {
    /// Classify a `/Filter` name
    pub fn from_filter(filter: &str) -> Self {
        match filter {
            handlers::STANDARD_FILTER => EncryptionType::Password,
            handlers::PUBSEC_FILTER => EncryptionType::Certificate,
            handlers::FOXIT_DRM_FILTER => EncryptionType::FoxitDRM,
            handlers::RMS_FILTER => EncryptionType::RMS,
            _ => EncryptionType::Custom,
        }
    }
}

/// Caller-owned security subsystem.
///
/// Holds the handler registry with the built-in schemes already registered
/// and the late-bound providers the certificate and DRM schemes consult.
/// Every pass starts here.
pub struct PDFSecurity {
    registry: Arc<HandlerRegistry>,
    certificate_provider: ProviderSlot<dyn CertificateKeyProvider>,
    foxit_drm_provider: ProviderSlot<dyn FoxitDrmProvider>,
    budget: WorkBudget,
}

impl Default for PDFSecurity {
    fn default() -> Self {
        Self::new()
    }
}

impl PDFSecurity {
    /// Create a subsystem with the `Standard`, `Adobe.PubSec` and `FoxitDRM` handlers
    pub fn new() -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let certificate_provider = ProviderSlot::new();
        let foxit_drm_provider = ProviderSlot::new();

        let builtins: [(&str, Arc<dyn SecurityHandler>); 3] = [
            (STANDARD_FILTER, Arc::new(StandardSecurityHandler::new())),
            (
                PUBSEC_FILTER,
                Arc::new(PublicKeySecurityHandler::new(certificate_provider.clone())),
            ),
            (
                FOXIT_DRM_FILTER,
                Arc::new(FoxitDrmHandler::new(foxit_drm_provider.clone())),
            ),
        ];
        for (filter, handler) in builtins {
            // A fresh registry cannot already hold a built-in name
            if let Err(err) = registry.register_builtin(filter, handler) {
                log::warn!("Failed to register built-in handler {}: {}", filter, err);
            }
        }

        Self {
            registry,
            certificate_provider,
            foxit_drm_provider,
            budget: WorkBudget::default(),
        }
    }

    /// Work done by each step of passes started from now on
    pub fn with_budget(mut self, budget: WorkBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn budget(&self) -> WorkBudget {
        self.budget
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Install or clear the provider that opens certificate envelopes
    pub fn set_certificate_provider(&self, provider: Option<Arc<dyn CertificateKeyProvider>>) {
        self.certificate_provider.set(provider);
    }

    /// Install or clear the provider of Foxit DRM decryption parameters
    pub fn set_foxit_drm_provider(&self, provider: Option<Arc<dyn FoxitDrmProvider>>) {
        self.foxit_drm_provider.set(provider);
    }

    pub fn register(&self, filter: &str, handler: Arc<dyn SecurityHandler>) -> PDFSecurityResult<()> {
        self.registry.register(filter, handler)
    }

    pub fn register_callbacks<T, D>(&self, filter: &str, callbacks: CallbackHandler<T, D>) -> PDFSecurityResult<()>
    where
        T: Send + 'static,
        D: Send + 'static,
    {
        self.registry.register_callbacks(filter, callbacks)
    }

    pub fn unregister(&self, filter: &str) -> PDFSecurityResult<()> {
        self.registry.unregister(filter)
    }

    /// Start a pass with any operation
    pub fn start<'a, S: ObjectSink>(
        &self,
        document: &'a Document,
        operation: Operation,
        sink: S,
        flags: SaveFlags,
    ) -> PDFSecurityResult<Progress<'a, S>> {
        Progress::start(&self.registry, document, operation, sink, flags, self.budget)
    }

    pub fn start_password_encryption<'a, S: ObjectSink>(
        &self,
        document: &'a Document,
        params: PasswordParams,
        sink: S,
        flags: SaveFlags,
    ) -> PDFSecurityResult<Progress<'a, S>> {
        self.start(document, Operation::Encrypt(EncryptionParams::Password(params)), sink, flags)
    }

    pub fn start_certificate_encryption<'a, S: ObjectSink>(
        &self,
        document: &'a Document,
        params: CertificateParams,
        sink: S,
        flags: SaveFlags,
    ) -> PDFSecurityResult<Progress<'a, S>> {
        self.start(document, Operation::Encrypt(EncryptionParams::Certificate(params)), sink, flags)
    }

    /// Encrypt with Foxit DRM; parameter strings staged on `document` are sealed into the dictionary
    pub fn start_foxit_drm_encryption<'a, S: ObjectSink>(
        &self,
        document: &'a Document,
        params: FoxitDrmParams,
        sink: S,
        flags: SaveFlags,
    ) -> PDFSecurityResult<Progress<'a, S>> {
        self.start(document, Operation::Encrypt(EncryptionParams::FoxitDrm(params)), sink, flags)
    }

    /// Encrypt through a registered custom handler
    pub fn start_custom_encryption<'a, S: ObjectSink>(
        &self,
        document: &'a Document,
        params: CustomParams,
        sink: S,
        flags: SaveFlags,
    ) -> PDFSecurityResult<Progress<'a, S>> {
        self.start(document, Operation::Encrypt(EncryptionParams::Custom(params)), sink, flags)
    }

    /// Encrypt through the handler registered under `MicrosoftIRMServices`
    pub fn start_rms_encryption<'a, S: ObjectSink>(
        &self,
        document: &'a Document,
        params: RmsParams,
        sink: S,
        flags: SaveFlags,
    ) -> PDFSecurityResult<Progress<'a, S>> {
        self.start(document, Operation::Encrypt(EncryptionParams::Rms(params)), sink, flags)
    }

    /// Remove security, dispatching on the document's `/Filter`
    pub fn start_decryption<'a, S: ObjectSink>(
        &self,
        document: &'a Document,
        credentials: Credentials,
        sink: S,
        flags: SaveFlags,
    ) -> PDFSecurityResult<Progress<'a, S>> {
        self.start(document, Operation::Decrypt(credentials), sink, flags)
    }

    /// Classify `password` against a `Standard` encrypted document
    pub fn check_password(&self, document: &Document, password: &[u8]) -> PDFSecurityResult<PasswordType> {
        handlers::check_password(document, password)
    }

    /// Whether a Foxit DRM document's parameter dictionary is intact
    pub fn verify_foxit_drm_params(&self, document: &Document) -> PDFSecurityResult<bool> {
        handlers::verify_foxit_drm_params(document)
    }

    pub fn encryption_type(&self, document: &Document) -> EncryptionType {
        document.encryption_type()
    }

    /// Permissions granted to `credentials`, intersected with `original`.
    ///
    /// Opens and releases a decryption context without transforming anything.
    pub fn user_permissions(
        &self,
        document: &Document,
        credentials: &Credentials,
        original: PDFPermissions,
    ) -> PDFSecurityResult<PDFPermissions> {
        let context = self.open_context(document, credentials)?;
        let permissions = context.user_permissions(original);
        context.close();
        permissions
    }

    /// Whether `credentials` authenticate as the document owner
    pub fn is_owner(&self, document: &Document, credentials: &Credentials) -> PDFSecurityResult<bool> {
        let context = self.open_context(document, credentials)?;
        let owner = context.is_owner();
        context.close();
        owner
    }

    fn open_context(&self, document: &Document, credentials: &Credentials) -> PDFSecurityResult<EncryptionContext> {
        let dict = document
            .encryption_dict()
            .ok_or_else(|| PDFSecurityError::invalid_param("document is not encrypted"))?;
        let filter = dict
            .get_name("Filter")
            .ok_or_else(|| PDFSecurityError::malformed("encryption dictionary without /Filter"))?;
        let request = ContextRequest {
            mode: ContextMode::Decrypt,
            filter,
            sub_filter: dict.get_name("SubFilter").unwrap_or_default(),
            encrypt_info: dict.get_string("EncryptInfo").unwrap_or_default(),
            encrypt_dict: Some(dict),
            file_id: document.file_id().unwrap_or_default(),
            document,
            params: None,
            credentials,
        };
        EncryptionContext::create(&self.registry, &request)
    }
}

impl std::fmt::Debug for PDFSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PDFSecurity")
            .field("filters", &self.registry.filters())
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}
