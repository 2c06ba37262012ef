//! Error types for the PDF security subsystem

use std::io;
use thiserror::Error;

/// Main error type for PDF security operations
#[derive(Error, Debug)]
pub enum PDFSecurityError {
    /// Null, empty or malformed argument
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Filter name collides with a registered handler
    #[error("Security filter already registered: {0}")]
    Conflict(String),

    /// Unknown filter, missing key or missing object
    #[error("Not found: {0}")]
    NotFound(String),

    /// No handler registered for the filter named by the document or request
    #[error("Unknown security handler: {0}")]
    UnknownSecurityHandler(String),

    /// Callback handler is missing a required callback
    #[error("Invalid security handler: missing callback {0}")]
    InvalidHandler(&'static str),

    /// Cipher/key-length combination the active scheme cannot implement
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Caller under-allocated against a reported size
    #[error("Buffer too small: {required} bytes required, {provided} provided")]
    BufferTooSmall {
        required: usize,
        provided: usize,
    },

    /// Internal invariant or call-order violation
    #[error("Unrecoverable error: {0}")]
    Unrecoverable(String),

    /// Sink or source could not be written or read
    #[error("IO failure: {0}")]
    IoFailure(#[from] io::Error),

    /// Neither the user nor the owner password matched
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// No certificate envelope could be opened by the key provider
    #[error("No matching recipient among {0} envelopes")]
    NoMatchingRecipient(usize),

    /// Foxit DRM parameter dictionary failed verification
    #[error("Encryption parameters failed verification")]
    VerificationFailed,

    /// Encryption dictionary or object graph is structurally wrong
    #[error("Malformed PDF structure: {0}")]
    MalformedPDF(String),

    /// Cryptographic primitive failed
    #[error("Cryptographic operation failed: {0}")]
    CryptoError(String),
}

/// Result type for PDF security operations
pub type PDFSecurityResult<T> = Result<T, PDFSecurityError>;

impl PDFSecurityError {
    /// Create a new invalid parameter error
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a new unsupported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a new unrecoverable error
    pub fn unrecoverable(msg: impl Into<String>) -> Self {
        Self::Unrecoverable(msg.into())
    }

    /// Create a new malformed PDF error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPDF(msg.into())
    }

    /// Create a new crypto error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::CryptoError(msg.into())
    }

    /// Create a new buffer too small error
    pub fn buffer_too_small(required: usize, provided: usize) -> Self {
        Self::BufferTooSmall { required, provided }
    }

    /// Check if error is authentication related
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::NoMatchingRecipient(_) | Self::VerificationFailed
        )
    }

    /// Check if error was caused by the caller's arguments
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter(_)
                | Self::Conflict(_)
                | Self::InvalidHandler(_)
                | Self::BufferTooSmall { .. }
        )
    }

    /// Check if error must abort the current operation without retry
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unrecoverable(_) | Self::MalformedPDF(_))
    }
}

#[cfg(feature = "rsa-recipients")]
impl From<rsa::errors::Error> for PDFSecurityError {
    fn from(err: rsa::errors::Error) -> Self {
        Self::CryptoError(err.to_string())
    }
}

impl From<aes::cipher::InvalidLength> for PDFSecurityError {
    fn from(err: aes::cipher::InvalidLength) -> Self {
        Self::Unsupported(format!("key length: {}", err))
    }
}

impl From<base64::DecodeError> for PDFSecurityError {
    fn from(err: base64::DecodeError) -> Self {
        Self::InvalidParameter(format!("base64: {}", err))
    }
}
