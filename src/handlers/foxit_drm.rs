//! Foxit DRM security handler and its sealed parameter dictionary

use log::{debug, warn};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{ContextMode, ContextRequest, EncryptionParams, HandlerContext, ProviderSlot, SecurityHandler};
use crate::buffer::copy_out;
use crate::crypto::{CipherId, CipherInfo};
use crate::error::{PDFSecurityError, PDFSecurityResult};
use crate::pdf::{Dictionary, Document, Object};
use crate::permissions::PDFPermissions;
use crate::security::constant_time_eq;
use crate::EncryptionType;

/// Key of the verification digest inside `/Params`
const VERIFY_KEY: &str = "Verify";

/// Parameters of a Foxit DRM encryption pass
#[derive(Clone)]
pub struct FoxitDrmParams {
    pub sub_filter: String,
    pub is_owner: bool,
    pub permissions: PDFPermissions,
    pub cipher: CipherId,
    pub key_len: usize,
    /// File identity code mixed into the key
    pub file_id: Vec<u8>,
    pub initial_key: Zeroizing<Vec<u8>>,
    pub encrypt_metadata: bool,
}

impl FoxitDrmParams {
    pub fn new(sub_filter: impl Into<String>) -> Self {
        Self {
            sub_filter: sub_filter.into(),
            is_owner: false,
            permissions: PDFPermissions::all(),
            cipher: CipherId::Aes,
            key_len: 16,
            file_id: Vec::new(),
            initial_key: Zeroizing::new(Vec::new()),
            encrypt_metadata: true,
        }
    }

    pub fn with_cipher(mut self, cipher: CipherId, key_len: usize) -> Self {
        self.cipher = cipher;
        self.key_len = key_len;
        self
    }

    pub fn with_keys(mut self, file_id: impl Into<Vec<u8>>, initial_key: impl Into<Vec<u8>>) -> Self {
        self.file_id = file_id.into();
        self.initial_key = Zeroizing::new(initial_key.into());
        self
    }

    pub fn with_permissions(mut self, permissions: PDFPermissions, is_owner: bool) -> Self {
        self.permissions = permissions;
        self.is_owner = is_owner;
        self
    }

    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }
}

impl std::fmt::Debug for FoxitDrmParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoxitDrmParams")
            .field("sub_filter", &self.sub_filter)
            .field("is_owner", &self.is_owner)
            .field("permissions", &self.permissions)
            .field("cipher", &self.cipher)
            .field("key_len", &self.key_len)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .finish_non_exhaustive()
    }
}

/// What a [`FoxitDrmProvider`] hands back for an encrypted document
#[derive(Clone)]
pub struct FoxitDrmDecryptParams {
    pub is_owner: bool,
    pub permissions: PDFPermissions,
    pub cipher: CipherId,
    pub key_len: usize,
    pub file_id: Vec<u8>,
    pub initial_key: Zeroizing<Vec<u8>>,
}

/// Supplies decryption parameters of Foxit DRM documents
pub trait FoxitDrmProvider: Send + Sync {
    fn decryption_params(&self, document: &Document, sub_filter: &str) -> PDFSecurityResult<FoxitDrmDecryptParams>;
}

/// Key = digest(initial key ‖ file ID), MD5 up to 16 bytes and SHA-256 above
fn drm_key(cipher: CipherId, key_len: usize, file_id: &[u8], initial_key: &[u8]) -> PDFSecurityResult<CipherInfo> {
    if !matches!(cipher, CipherId::Rc4 | CipherId::Aes) {
        return Err(PDFSecurityError::unsupported(format!("{:?} cipher for Foxit DRM", cipher)));
    }
    cipher.validate_key_len(key_len)?;

    let mut input = Zeroizing::new(Vec::with_capacity(initial_key.len() + file_id.len()));
    input.extend_from_slice(initial_key);
    input.extend_from_slice(file_id);
    let mut key = Zeroizing::new(if key_len > 16 {
        Sha256::digest(&input[..]).to_vec()
    } else {
        md5::compute(&input[..]).0.to_vec()
    });
    key.truncate(key_len);
    CipherInfo::new(cipher, key.to_vec())
}

/// Verification digest over the parameter strings, sub-filter and `/P`
fn params_digest(params: &Dictionary, sub_filter: &str, p: i64) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in params.iter().filter(|(key, _)| key.as_str() != VERIFY_KEY) {
        if let Some(bytes) = value.as_string() {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(bytes);
            hasher.update([0u8]);
        }
    }
    hasher.update(sub_filter.as_bytes());
    hasher.update([0u8]);
    hasher.update((p as i32).to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Check the `/Params` digest of a Foxit DRM encryption dictionary
pub(crate) fn verify_drm_dict(dict: &Dictionary) -> bool {
    let Some(params) = dict.get_dict("Params") else {
        warn!("Foxit DRM dictionary without /Params");
        return false;
    };
    let Some(recorded) = params.get_string(VERIFY_KEY) else {
        warn!("Foxit DRM parameters without verification digest");
        return false;
    };
    let expected = params_digest(
        params,
        dict.get_name("SubFilter").unwrap_or_default(),
        dict.get_integer("P").unwrap_or(0),
    );
    constant_time_eq(expected.as_bytes(), recorded)
}

/// Whether the DRM parameters of `document` are intact
pub fn verify_foxit_drm_params(document: &Document) -> PDFSecurityResult<bool> {
    match document.encryption_dict() {
        Some(dict) if document.encryption_type() == EncryptionType::FoxitDRM => Ok(verify_drm_dict(dict)),
        _ => Err(PDFSecurityError::invalid_param("document is not Foxit DRM encrypted")),
    }
}

/// Value of a DRM parameter, from the encryption dictionary or the pending set
pub fn foxit_drm_param(document: &Document, key: &str) -> PDFSecurityResult<String> {
    if key.is_empty() {
        return Err(PDFSecurityError::invalid_param("empty parameter key"));
    }
    if document.encryption_type() == EncryptionType::FoxitDRM {
        let recorded = document
            .encryption_dict()
            .and_then(|dict| dict.get_dict("Params"))
            .and_then(|params| params.get_string(key));
        if let Some(bytes) = recorded {
            return Ok(String::from_utf8_lossy(bytes).into_owned());
        }
    }
    document
        .drm_params()
        .get(key)
        .cloned()
        .ok_or_else(|| PDFSecurityError::not_found(format!("DRM parameter {}", key)))
}

/// [`foxit_drm_param`] with the two-call size convention
pub fn foxit_drm_param_into(document: &Document, key: &str, out: Option<&mut [u8]>) -> PDFSecurityResult<usize> {
    let value = foxit_drm_param(document, key)?;
    copy_out(value.as_bytes(), out)
}

/// Set (or with `None` remove) a parameter recorded by the next DRM encryption
pub fn set_foxit_drm_param(document: &mut Document, key: &str, value: Option<&str>) -> PDFSecurityResult<()> {
    if key.is_empty() || key == VERIFY_KEY {
        return Err(PDFSecurityError::invalid_param(format!("DRM parameter key {:?}", key)));
    }
    match value {
        Some(value) => {
            document.drm_params_mut().insert(key.to_string(), value.to_string());
        }
        None => {
            document.drm_params_mut().remove(key);
        }
    }
    Ok(())
}

/// Handler registered under `FoxitDRM`
pub struct FoxitDrmHandler {
    provider: ProviderSlot<dyn FoxitDrmProvider>,
}

impl FoxitDrmHandler {
    pub(crate) fn new(provider: ProviderSlot<dyn FoxitDrmProvider>) -> Self {
        Self { provider }
    }

    fn encrypt_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<DrmContext> {
        let params = match request.params {
            Some(EncryptionParams::FoxitDrm(params)) => params,
            _ => return Err(PDFSecurityError::invalid_param("Foxit DRM parameters required")),
        };
        if params.sub_filter.is_empty() {
            return Err(PDFSecurityError::invalid_param("Foxit DRM requires a sub-filter"));
        }
        let cipher = drm_key(params.cipher, params.key_len, &params.file_id, &params.initial_key)?;

        let p = params.permissions.to_p_value();
        let mut sealed: Dictionary = request
            .document
            .drm_params()
            .iter()
            .map(|(key, value)| (key.clone(), Object::string(value.as_bytes().to_vec())))
            .collect();
        let digest = params_digest(&sealed, &params.sub_filter, i64::from(p));
        sealed.set(VERIFY_KEY, Object::string(digest.into_bytes()));

        let mut entries = Dictionary::new();
        entries.set("P", p);
        entries.set("Params", sealed);
        entries.set("EncryptMetadata", params.encrypt_metadata);
        debug!(
            "Foxit DRM encryption ({}) with {} parameters",
            params.sub_filter,
            request.document.drm_params().len()
        );

        Ok(DrmContext {
            cipher,
            permissions: params.permissions,
            owner: params.is_owner,
            entries: Some(entries),
        })
    }

    fn decrypt_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<DrmContext> {
        let provider = self
            .provider
            .get()
            .ok_or_else(|| PDFSecurityError::not_found("Foxit DRM provider"))?;
        let params = provider.decryption_params(request.document, request.sub_filter)?;
        let cipher = drm_key(params.cipher, params.key_len, &params.file_id, &params.initial_key)?;

        Ok(DrmContext {
            cipher,
            permissions: params.permissions,
            owner: params.is_owner,
            entries: None,
        })
    }
}

impl SecurityHandler for FoxitDrmHandler {
    fn create_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<Box<dyn HandlerContext>> {
        let context = match request.mode {
            ContextMode::Encrypt => self.encrypt_context(request)?,
            ContextMode::Decrypt => self.decrypt_context(request)?,
        };
        Ok(Box::new(context))
    }
}

struct DrmContext {
    cipher: CipherInfo,
    permissions: PDFPermissions,
    owner: bool,
    entries: Option<Dictionary>,
}

impl HandlerContext for DrmContext {
    fn user_permissions(&self, _original: PDFPermissions) -> PDFSecurityResult<PDFPermissions> {
        Ok(self.permissions)
    }

    fn is_owner(&self) -> PDFSecurityResult<bool> {
        Ok(self.owner)
    }

    fn cipher_info(&self) -> PDFSecurityResult<CipherInfo> {
        Ok(self.cipher.clone())
    }

    fn encryption_entries(&self) -> PDFSecurityResult<Dictionary> {
        Ok(self.entries.clone().unwrap_or_default())
    }
}
