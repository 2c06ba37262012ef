//! Standard security handler: password based RC4 and AES encryption

use log::{debug, trace};
use rand::{thread_rng, RngCore};
use zeroize::Zeroizing;

use super::{declared_cipher, ContextMode, ContextRequest, EncryptionParams, HandlerContext, SecurityHandler};
use crate::crypto::{CipherId, CipherInfo};
use crate::error::{PDFSecurityError, PDFSecurityResult};
use crate::pdf::{Dictionary, Document, Object};
use crate::permissions::PDFPermissions;
use crate::security::{
    authenticate_owner, authenticate_user, compute_encryption_key, compute_o_value, compute_u_value,
    r6_owner_values, r6_perms, r6_user_values, StandardEntries,
};

/// Kind of password that opened a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PasswordType {
    Invalid = -1,
    /// The document opens without a password
    NoPassword = 0,
    User = 1,
    Owner = 2,
}

/// Parameters of a password encryption pass
#[derive(Clone)]
pub struct PasswordParams {
    pub user_password: Zeroizing<Vec<u8>>,
    pub owner_password: Zeroizing<Vec<u8>>,
    pub permissions: PDFPermissions,
    pub cipher: CipherId,
    /// Key length in bytes: 5 to 16 for RC4, 16 or 32 for AES
    pub key_len: usize,
    pub encrypt_metadata: bool,
}

impl PasswordParams {
    /// AES-128 with every right granted
    pub fn new(user_password: impl AsRef<[u8]>, owner_password: impl AsRef<[u8]>) -> Self {
        Self {
            user_password: Zeroizing::new(user_password.as_ref().to_vec()),
            owner_password: Zeroizing::new(owner_password.as_ref().to_vec()),
            permissions: PDFPermissions::all(),
            cipher: CipherId::Aes,
            key_len: 16,
            encrypt_metadata: true,
        }
    }

    pub fn with_cipher(mut self, cipher: CipherId, key_len: usize) -> Self {
        self.cipher = cipher;
        self.key_len = key_len;
        self
    }

    pub fn with_permissions(mut self, permissions: PDFPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    /// Standard revision implementing the cipher and key length
    pub fn revision(&self) -> PDFSecurityResult<i64> {
        self.cipher.validate_key_len(self.key_len)?;
        let revision = match (self.cipher, self.key_len) {
            (CipherId::Rc4, 5) => 2,
            (CipherId::Rc4, _) => 3,
            (CipherId::Aes, 16) => 4,
            (CipherId::Aes, _) => 6,
            (other, _) => {
                return Err(PDFSecurityError::unsupported(format!(
                    "{:?} cipher for password encryption",
                    other
                )))
            }
        };
        if revision < 4 && !self.encrypt_metadata {
            return Err(PDFSecurityError::invalid_param(
                "clear-text metadata requires an AES password cipher",
            ));
        }
        Ok(revision)
    }
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self::new(b"", b"")
    }
}

impl std::fmt::Debug for PasswordParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordParams")
            .field("permissions", &self.permissions)
            .field("cipher", &self.cipher)
            .field("key_len", &self.key_len)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .finish_non_exhaustive()
    }
}

/// Handler registered under `Standard`
#[derive(Debug, Default)]
pub struct StandardSecurityHandler;

impl StandardSecurityHandler {
    pub fn new() -> Self {
        Self
    }

    fn encrypt_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<StandardContext> {
        let params = match request.params {
            Some(EncryptionParams::Password(params)) => params,
            _ => return Err(PDFSecurityError::invalid_param("password parameters required")),
        };
        let revision = params.revision()?;
        let p = params.permissions.to_p_value();

        let mut entries = Dictionary::new();
        entries.set("R", revision);
        entries.set("P", p);

        let key = if revision >= 6 {
            let mut key = Zeroizing::new(vec![0u8; 32]);
            thread_rng().fill_bytes(&mut key);

            let owner = if params.owner_password.is_empty() {
                &params.user_password
            } else {
                &params.owner_password
            };
            let (u_value, ue_value) = r6_user_values(&params.user_password, &key)?;
            let (o_value, oe_value) = r6_owner_values(owner, &key, &u_value)?;
            entries.set("O", Object::string(o_value));
            entries.set("U", Object::string(u_value));
            entries.set("OE", Object::string(oe_value));
            entries.set("UE", Object::string(ue_value));
            entries.set("Perms", Object::string(r6_perms(&key, p, params.encrypt_metadata)?));
            key
        } else {
            let o_value = compute_o_value(&params.owner_password, &params.user_password, revision, params.key_len)?;
            let key = compute_encryption_key(
                &params.user_password,
                &o_value,
                p,
                request.file_id,
                revision,
                params.key_len,
                params.encrypt_metadata,
            );
            let u_value = compute_u_value(&key, request.file_id, revision)?;
            entries.set("O", Object::string(o_value));
            entries.set("U", Object::string(u_value));
            key
        };
        if revision >= 4 {
            entries.set("EncryptMetadata", params.encrypt_metadata);
        }

        debug!("Standard encryption at revision {}", revision);
        Ok(StandardContext {
            cipher: CipherInfo::new(params.cipher, key.to_vec())?,
            permissions: params.permissions,
            owner: true,
            entries: Some(entries),
        })
    }

    fn decrypt_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<StandardContext> {
        let dict = request
            .encrypt_dict
            .ok_or_else(|| PDFSecurityError::malformed("missing encryption dictionary"))?;
        let (cipher, key_len) = standard_cipher(dict);
        let entries = StandardEntries::from_dict(dict, request.file_id, key_len)?;
        let password = request.credentials.password_bytes();

        let (key, owner) = match authenticate_owner(&entries, password)? {
            Some(key) => (key, true),
            None => match authenticate_user(&entries, password)? {
                Some(key) => (key, false),
                None => return Err(PDFSecurityError::AuthenticationFailed),
            },
        };
        trace!("Standard password accepted (owner: {})", owner);

        Ok(StandardContext {
            cipher: CipherInfo::new(cipher, key.to_vec())?,
            permissions: PDFPermissions::from_p_value(entries.p),
            owner,
            entries: None,
        })
    }
}

impl SecurityHandler for StandardSecurityHandler {
    fn create_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<Box<dyn HandlerContext>> {
        let context = match request.mode {
            ContextMode::Encrypt => self.encrypt_context(request)?,
            ContextMode::Decrypt => self.decrypt_context(request)?,
        };
        Ok(Box::new(context))
    }
}

/// Cipher of a Standard dictionary; revisions 5 and 6 always use AES-256
fn standard_cipher(dict: &Dictionary) -> (CipherId, usize) {
    if dict.get_integer("R").unwrap_or(0) >= 5 {
        (CipherId::Aes, 32)
    } else {
        declared_cipher(dict)
    }
}

struct StandardContext {
    cipher: CipherInfo,
    permissions: PDFPermissions,
    owner: bool,
    entries: Option<Dictionary>,
}

impl HandlerContext for StandardContext {
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

/// Which password `password` is for a Standard-encrypted document
pub fn check_password(document: &Document, password: &[u8]) -> PDFSecurityResult<PasswordType> {
    let dict = match document.encryption_dict() {
        Some(dict) => dict,
        None => return Ok(PasswordType::NoPassword),
    };
    if document.security_filter() != Some(super::STANDARD_FILTER) {
        return Err(PDFSecurityError::invalid_param("document is not password encrypted"));
    }

    let (_, key_len) = standard_cipher(dict);
    let entries = StandardEntries::from_dict(dict, document.file_id().unwrap_or_default(), key_len)?;

    if authenticate_owner(&entries, password)?.is_some() {
        return Ok(PasswordType::Owner);
    }
    if authenticate_user(&entries, password)?.is_some() {
        return Ok(if password.is_empty() {
            PasswordType::NoPassword
        } else {
            PasswordType::User
        });
    }
    Ok(PasswordType::Invalid)
}
