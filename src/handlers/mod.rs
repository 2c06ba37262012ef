//! Security handler interface and the built-in schemes

mod callbacks;
mod foxit_drm;
mod public_key;
mod registry;
mod rms;
mod standard;

pub use callbacks::CallbackHandler;
pub use foxit_drm::{
    foxit_drm_param, foxit_drm_param_into, set_foxit_drm_param, verify_foxit_drm_params,
    FoxitDrmDecryptParams, FoxitDrmHandler, FoxitDrmParams, FoxitDrmProvider,
};
#[cfg(feature = "rsa-recipients")]
pub use public_key::{seal_envelope, RsaRecipient};
pub use public_key::{CertificateKeyProvider, CertificateParams, PublicKeySecurityHandler};
pub use registry::{HandlerRegistry, OpenContextGuard};
pub use rms::{decode_rms_blob, encode_rms_blob, RmsParams};
pub use standard::{check_password, PasswordParams, PasswordType, StandardSecurityHandler};

pub(crate) use foxit_drm::verify_drm_dict;
pub(crate) use rms::rms_license;

use std::sync::{Arc, PoisonError, RwLock};

use zeroize::Zeroizing;

use crate::buffer::copy_out;
use crate::crypto::{CipherInfo, ObjectCrypt, ObjectDecryptor};
use crate::error::PDFSecurityResult;
use crate::pdf::{Dictionary, Document, ObjectId};
use crate::permissions::PDFPermissions;
use crate::EncryptionType;

/// Filter name of the password scheme
pub const STANDARD_FILTER: &str = "Standard";
/// Filter name of the certificate scheme
pub const PUBSEC_FILTER: &str = "Adobe.PubSec";
/// Filter name of the Foxit DRM scheme
pub const FOXIT_DRM_FILTER: &str = "FoxitDRM";
/// Conventional filter name of Microsoft RMS handlers
pub const RMS_FILTER: &str = "MicrosoftIRMServices";

/// Direction of the pass a context is created for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    Decrypt,
    Encrypt,
}

/// Secrets offered when opening an encrypted document
#[derive(Clone, Default)]
pub enum Credentials {
    #[default]
    None,
    Password(Zeroizing<Vec<u8>>),
}

impl Credentials {
    pub fn password(password: impl AsRef<[u8]>) -> Self {
        Credentials::Password(Zeroizing::new(password.as_ref().to_vec()))
    }

    /// Password bytes, empty when none was given
    pub fn password_bytes(&self) -> &[u8] {
        match self {
            Credentials::None => &[],
            Credentials::Password(password) => password,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => f.write_str("Credentials::None"),
            Credentials::Password(_) => f.write_str("Credentials::Password(..)"),
        }
    }
}

/// Parameters of a registered custom handler
#[derive(Debug, Clone)]
pub struct CustomParams {
    pub filter: String,
    pub sub_filter: String,
    /// Opaque bytes forwarded to the handler and written as `/EncryptInfo`
    pub encrypt_info: Vec<u8>,
    pub encrypt_metadata: bool,
}

impl CustomParams {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            sub_filter: String::new(),
            encrypt_info: Vec::new(),
            encrypt_metadata: true,
        }
    }
}

/// Scheme parameters of an encryption pass
#[derive(Debug, Clone)]
pub enum EncryptionParams {
    Password(PasswordParams),
    Certificate(CertificateParams),
    FoxitDrm(FoxitDrmParams),
    Custom(CustomParams),
    Rms(RmsParams),
}

impl EncryptionParams {
    pub fn filter(&self) -> &str {
        match self {
            EncryptionParams::Password(_) => STANDARD_FILTER,
            EncryptionParams::Certificate(_) => PUBSEC_FILTER,
            EncryptionParams::FoxitDrm(_) => FOXIT_DRM_FILTER,
            EncryptionParams::Custom(params) => &params.filter,
            EncryptionParams::Rms(_) => RMS_FILTER,
        }
    }

    pub fn sub_filter(&self) -> &str {
        match self {
            EncryptionParams::Certificate(_) => public_key::SUB_FILTER_S5,
            EncryptionParams::FoxitDrm(params) => &params.sub_filter,
            EncryptionParams::Custom(params) => &params.sub_filter,
            _ => "",
        }
    }

    pub fn encrypt_info(&self) -> &[u8] {
        match self {
            EncryptionParams::Custom(params) => &params.encrypt_info,
            EncryptionParams::Rms(params) => &params.publish_license,
            _ => &[],
        }
    }

    pub fn encrypt_metadata(&self) -> bool {
        match self {
            EncryptionParams::Password(params) => params.encrypt_metadata,
            EncryptionParams::Certificate(params) => params.encrypt_metadata,
            EncryptionParams::FoxitDrm(params) => params.encrypt_metadata,
            EncryptionParams::Custom(params) => params.encrypt_metadata,
            EncryptionParams::Rms(params) => params.encrypt_metadata,
        }
    }

    pub fn encryption_type(&self) -> EncryptionType {
        match self {
            EncryptionParams::Password(_) => EncryptionType::Password,
            EncryptionParams::Certificate(_) => EncryptionType::Certificate,
            EncryptionParams::FoxitDrm(_) => EncryptionType::FoxitDRM,
            EncryptionParams::Custom(_) => EncryptionType::Custom,
            EncryptionParams::Rms(_) => EncryptionType::RMS,
        }
    }
}

/// Everything a handler sees when asked for a context
pub struct ContextRequest<'a> {
    pub mode: ContextMode,
    pub filter: &'a str,
    pub sub_filter: &'a str,
    pub encrypt_info: &'a [u8],
    /// Existing encryption dictionary (decryption only)
    pub encrypt_dict: Option<&'a Dictionary>,
    /// First element of the trailer `/ID` the pass will write
    pub file_id: &'a [u8],
    pub document: &'a Document,
    /// Scheme parameters (encryption only)
    pub params: Option<&'a EncryptionParams>,
    pub credentials: &'a Credentials,
}

/// Security scheme registered under a filter name
pub trait SecurityHandler: Send + Sync {
    fn create_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<Box<dyn HandlerContext>>;
}

/// Scheme state for one document-level operation.
///
/// Object transforms default to the standard per-object RC4/AES crypt keyed
/// by the context's cipher info, so a scheme only overrides them when it
/// keys objects differently.
pub trait HandlerContext: Send {
    /// Narrow the document's permission mask
    fn user_permissions(&self, original: PDFPermissions) -> PDFSecurityResult<PDFPermissions>;

    fn is_owner(&self) -> PDFSecurityResult<bool>;

    fn cipher_info(&self) -> PDFSecurityResult<CipherInfo>;

    /// Planning hint for a ciphertext of `len` bytes
    fn decrypted_size(&self, len: usize) -> usize {
        len
    }

    fn start_decryptor(&self, id: ObjectId, cipher: &CipherInfo) -> PDFSecurityResult<Box<dyn Decryptor>> {
        Ok(Box::new(ObjectCrypt::new(cipher, id)?.decryptor()?))
    }

    /// Upper bound of the ciphertext `encrypt_data` will produce
    fn encrypted_size(&self, id: ObjectId, cipher: &CipherInfo, plaintext: &[u8]) -> PDFSecurityResult<usize> {
        Ok(ObjectCrypt::new(cipher, id)?.encrypted_size(plaintext.len()))
    }

    fn encrypt_data(
        &self,
        id: ObjectId,
        cipher: &CipherInfo,
        plaintext: &[u8],
        out: &mut [u8],
    ) -> PDFSecurityResult<usize> {
        let encrypted = ObjectCrypt::new(cipher, id)?.encrypt(plaintext)?;
        copy_out(&encrypted, Some(out))
    }

    /// Scheme entries of the encryption dictionary written by an encryption pass
    fn encryption_entries(&self) -> PDFSecurityResult<Dictionary> {
        Ok(Dictionary::new())
    }

    /// Release scheme state; called exactly once
    fn release(&mut self) {}
}

/// Chunked decryption of one payload
pub trait Decryptor: Send {
    fn feed(&mut self, chunk: &[u8]) -> PDFSecurityResult<Vec<u8>>;

    fn finish(self: Box<Self>) -> PDFSecurityResult<Vec<u8>>;
}

impl Decryptor for ObjectDecryptor {
    fn feed(&mut self, chunk: &[u8]) -> PDFSecurityResult<Vec<u8>> {
        self.update(chunk)
    }

    fn finish(self: Box<Self>) -> PDFSecurityResult<Vec<u8>> {
        ObjectDecryptor::finish(*self)
    }
}

/// Late-bound collaborator shared between a built-in handler and its owner
pub(crate) struct ProviderSlot<P: ?Sized> {
    inner: Arc<RwLock<Option<Arc<P>>>>,
}

impl<P: ?Sized> ProviderSlot<P> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set(&self, provider: Option<Arc<P>>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = provider;
    }

    pub fn get(&self) -> Option<Arc<P>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<P: ?Sized> Clone for ProviderSlot<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Crypt filter entries (`/V`, `/Length`, `/CF`, `/StmF`, `/StrF`) for a cipher
pub(crate) fn crypt_filter_entries(cipher: &CipherInfo, dict: &mut Dictionary) {
    use crate::crypto::CipherId;
    use crate::pdf::Object;

    let method = match (cipher.cipher(), cipher.key_len()) {
        (CipherId::Aes, 32) => Some((5, "AESV3")),
        (CipherId::Aes, _) => Some((4, "AESV2")),
        _ => None,
    };

    match method {
        Some((version, cfm)) => {
            let mut std_cf = Dictionary::new();
            std_cf.set("Type", Object::name("CryptFilter"));
            std_cf.set("CFM", Object::name(cfm));
            std_cf.set("AuthEvent", Object::name("DocOpen"));
            std_cf.set("Length", cipher.key_len() as i64);
            let mut cf = Dictionary::new();
            cf.set("StdCF", std_cf);

            dict.set("V", version);
            dict.set("Length", (cipher.key_len() * 8) as i64);
            dict.set("CF", cf);
            dict.set("StmF", Object::name("StdCF"));
            dict.set("StrF", Object::name("StdCF"));
        }
        None => {
            dict.set("V", if cipher.key_len() > 5 { 2 } else { 1 });
            dict.set("Length", (cipher.key_len() * 8) as i64);
        }
    }
}

/// Cipher and key length declared by an encryption dictionary
pub(crate) fn declared_cipher(dict: &Dictionary) -> (crate::crypto::CipherId, usize) {
    use crate::crypto::CipherId;

    let v = dict.get_integer("V").unwrap_or(0);
    let length_bits = dict.get_integer("Length").unwrap_or(40);
    let rc4_len = ((length_bits / 8) as usize).clamp(5, 16);

    if v >= 4 {
        let cfm = dict
            .get_dict("CF")
            .and_then(|cf| {
                let name = dict.get_name("StmF").unwrap_or("StdCF");
                cf.get_dict(name)
            })
            .and_then(|filter| filter.get_name("CFM"));
        match cfm {
            Some("AESV3") => (CipherId::Aes, 32),
            Some("AESV2") => (CipherId::Aes, 16),
            Some("None") => (CipherId::None, 0),
            _ if v == 5 => (CipherId::Aes, 32),
            _ => (CipherId::Rc4, rc4_len),
        }
    } else if v >= 2 {
        (CipherId::Rc4, rc4_len)
    } else {
        (CipherId::Rc4, 5)
    }
}
