//! Public key security handler (`Adobe.PubSec`)
//!
//! Each recipient envelope wraps the 20-byte seed followed by the
//! recipient's permission word (big endian). The file key is a digest of the
//! seed and every envelope, so all recipients derive the same key.

use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace, warn};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{
    declared_cipher, ContextMode, ContextRequest, EncryptionParams, HandlerContext, ProviderSlot,
    SecurityHandler,
};
use crate::crypto::{CipherId, CipherInfo};
use crate::error::{PDFSecurityError, PDFSecurityResult};
use crate::pdf::{Dictionary, Object};
use crate::permissions::PDFPermissions;

/// Sub-filter written by certificate encryption
pub const SUB_FILTER_S5: &str = "adbe.pkcs7.s5";

const SEED_LEN: usize = 20;
const CRYPT_FILTER: &str = "DefaultCryptFilter";

/// Opens recipient envelopes with the caller's private key material.
///
/// Called first with `out == None` to learn the length of the opened
/// envelope, then with a buffer of at least that length.
pub trait CertificateKeyProvider: Send + Sync {
    fn decryption_key(&self, envelope: &[u8], out: Option<&mut [u8]>) -> PDFSecurityResult<usize>;
}

/// Parameters of a certificate encryption pass
#[derive(Clone)]
pub struct CertificateParams {
    /// One sealed envelope per recipient
    pub envelopes: Vec<Vec<u8>>,
    pub cipher: CipherId,
    pub key_len: usize,
    /// Seed sealed inside every envelope
    pub seed: Zeroizing<[u8; 20]>,
    pub encrypt_metadata: bool,
}

impl CertificateParams {
    pub fn new(envelopes: Vec<Vec<u8>>, seed: [u8; 20]) -> Self {
        Self {
            envelopes,
            cipher: CipherId::Aes,
            key_len: 16,
            seed: Zeroizing::new(seed),
            encrypt_metadata: true,
        }
    }

    pub fn with_cipher(mut self, cipher: CipherId, key_len: usize) -> Self {
        self.cipher = cipher;
        self.key_len = key_len;
        self
    }

    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    /// Fresh random seed for [`CertificateParams::new`]
    pub fn random_seed() -> [u8; 20] {
        use rand::{thread_rng, RngCore};
        let mut seed = [0u8; 20];
        thread_rng().fill_bytes(&mut seed);
        seed
    }
}

impl std::fmt::Debug for CertificateParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateParams")
            .field("envelopes", &self.envelopes.len())
            .field("cipher", &self.cipher)
            .field("key_len", &self.key_len)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .finish_non_exhaustive()
    }
}

/// File key: digest of seed, envelopes and the metadata marker, truncated
fn file_key(seed: &[u8], envelopes: &[Vec<u8>], encrypt_metadata: bool, key_len: usize) -> Zeroizing<Vec<u8>> {
    fn digest<D: Digest>(seed: &[u8], envelopes: &[Vec<u8>], encrypt_metadata: bool) -> Vec<u8> {
        let mut hasher = D::new();
        hasher.update(seed);
        for envelope in envelopes {
            hasher.update(envelope);
        }
        if !encrypt_metadata {
            hasher.update([0xFF; 4]);
        }
        hasher.finalize().to_vec()
    }

    let mut key = Zeroizing::new(if key_len > 20 {
        digest::<Sha256>(seed, envelopes, encrypt_metadata)
    } else {
        digest::<Sha1>(seed, envelopes, encrypt_metadata)
    });
    key.truncate(key_len);
    key
}

/// Handler registered under `Adobe.PubSec`
pub struct PublicKeySecurityHandler {
    provider: ProviderSlot<dyn CertificateKeyProvider>,
}

impl PublicKeySecurityHandler {
    pub(crate) fn new(provider: ProviderSlot<dyn CertificateKeyProvider>) -> Self {
        Self { provider }
    }

    fn encrypt_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<PublicKeyContext> {
        let params = match request.params {
            Some(EncryptionParams::Certificate(params)) => params,
            _ => return Err(PDFSecurityError::invalid_param("certificate parameters required")),
        };
        if params.envelopes.is_empty() || params.envelopes.iter().any(Vec::is_empty) {
            return Err(PDFSecurityError::invalid_param("at least one non-empty envelope required"));
        }
        if !matches!(params.cipher, CipherId::Rc4 | CipherId::Aes) {
            return Err(PDFSecurityError::unsupported(format!(
                "{:?} cipher for certificate encryption",
                params.cipher
            )));
        }

        let key = file_key(&params.seed[..], &params.envelopes, params.encrypt_metadata, params.key_len);
        let cipher = CipherInfo::new(params.cipher, key.to_vec())?;
        debug!("Certificate encryption for {} recipients", params.envelopes.len());

        Ok(PublicKeyContext {
            entries: Some(recipient_entries(&cipher, &params.envelopes, params.encrypt_metadata)),
            cipher,
            permissions: PDFPermissions::all(),
        })
    }

    fn decrypt_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<PublicKeyContext> {
        let dict = request
            .encrypt_dict
            .ok_or_else(|| PDFSecurityError::malformed("missing encryption dictionary"))?;
        let provider = self
            .provider
            .get()
            .ok_or_else(|| PDFSecurityError::not_found("certificate key provider"))?;

        let (cipher, key_len) = declared_cipher(dict);
        let (envelopes, encrypt_metadata) = recipients(dict)?;

        for (index, envelope) in envelopes.iter().enumerate() {
            let opened = match open_envelope(provider.as_ref(), envelope) {
                Ok(opened) if opened.len() >= SEED_LEN => opened,
                Ok(_) => {
                    warn!("Envelope {} opened to fewer than {} bytes", index, SEED_LEN);
                    continue;
                }
                Err(err) => {
                    trace!("Envelope {} not for us: {}", index, err);
                    continue;
                }
            };

            let permissions = if opened.len() >= SEED_LEN + 4 {
                PDFPermissions::from_p_value(BigEndian::read_u32(&opened[SEED_LEN..SEED_LEN + 4]) as i32)
            } else {
                PDFPermissions::all()
            };
            let key = file_key(&opened[..SEED_LEN], &envelopes, encrypt_metadata, key_len);
            debug!("Opened certificate envelope {} of {}", index + 1, envelopes.len());
            return Ok(PublicKeyContext {
                cipher: CipherInfo::new(cipher, key.to_vec())?,
                permissions,
                entries: None,
            });
        }

        Err(PDFSecurityError::NoMatchingRecipient(envelopes.len()))
    }
}

impl SecurityHandler for PublicKeySecurityHandler {
    fn create_context(&self, request: &ContextRequest<'_>) -> PDFSecurityResult<Box<dyn HandlerContext>> {
        let context = match request.mode {
            ContextMode::Encrypt => self.encrypt_context(request)?,
            ContextMode::Decrypt => self.decrypt_context(request)?,
        };
        Ok(Box::new(context))
    }
}

/// Two-call envelope opening
fn open_envelope(provider: &dyn CertificateKeyProvider, envelope: &[u8]) -> PDFSecurityResult<Zeroizing<Vec<u8>>> {
    let len = provider.decryption_key(envelope, None)?;
    let mut opened = Zeroizing::new(vec![0u8; len]);
    let written = provider.decryption_key(envelope, Some(&mut opened))?;
    opened.truncate(written);
    Ok(opened)
}

/// Crypt filter carrying the recipient list
fn recipient_entries(cipher: &CipherInfo, envelopes: &[Vec<u8>], encrypt_metadata: bool) -> Dictionary {
    let (version, cfm) = match (cipher.cipher(), cipher.key_len()) {
        (CipherId::Aes, 32) => (5, "AESV3"),
        (CipherId::Aes, _) => (4, "AESV2"),
        _ => (4, "V2"),
    };
    let recipients: Vec<Object> = envelopes.iter().map(|e| Object::string(e.clone())).collect();

    let mut filter = Dictionary::new();
    filter.set("Type", Object::name("CryptFilter"));
    filter.set("CFM", Object::name(cfm));
    filter.set("AuthEvent", Object::name("DocOpen"));
    filter.set("Length", (cipher.key_len() * 8) as i64);
    filter.set("Recipients", recipients);
    filter.set("EncryptMetadata", encrypt_metadata);
    let mut cf = Dictionary::new();
    cf.set(CRYPT_FILTER, filter);

    let mut entries = Dictionary::new();
    entries.set("V", version);
    entries.set("Length", (cipher.key_len() * 8) as i64);
    entries.set("CF", cf);
    entries.set("StmF", Object::name(CRYPT_FILTER));
    entries.set("StrF", Object::name(CRYPT_FILTER));
    entries
}

/// Envelopes and metadata flag, from the stream crypt filter or the top level
fn recipients(dict: &Dictionary) -> PDFSecurityResult<(Vec<Vec<u8>>, bool)> {
    let filter = dict
        .get_dict("CF")
        .and_then(|cf| cf.get_dict(dict.get_name("StmF").unwrap_or(CRYPT_FILTER)));
    let source = filter.filter(|f| f.contains_key("Recipients")).unwrap_or(dict);

    let envelopes: Vec<Vec<u8>> = source
        .get_array("Recipients")
        .ok_or_else(|| PDFSecurityError::malformed("certificate encryption without /Recipients"))?
        .iter()
        .filter_map(Object::as_string)
        .map(<[u8]>::to_vec)
        .collect();
    if envelopes.is_empty() {
        return Err(PDFSecurityError::malformed("empty /Recipients"));
    }
    let encrypt_metadata = source
        .get_bool("EncryptMetadata")
        .or_else(|| dict.get_bool("EncryptMetadata"))
        .unwrap_or(true);
    Ok((envelopes, encrypt_metadata))
}

struct PublicKeyContext {
    cipher: CipherInfo,
    permissions: PDFPermissions,
    entries: Option<Dictionary>,
}

impl HandlerContext for PublicKeyContext {
    fn user_permissions(&self, _original: PDFPermissions) -> PDFSecurityResult<PDFPermissions> {
        Ok(self.permissions)
    }

    /// Recipients granted every right act as owners
    fn is_owner(&self) -> PDFSecurityResult<bool> {
        Ok(self.permissions == PDFPermissions::all())
    }

    fn cipher_info(&self) -> PDFSecurityResult<CipherInfo> {
        Ok(self.cipher.clone())
    }

    fn encryption_entries(&self) -> PDFSecurityResult<Dictionary> {
        Ok(self.entries.clone().unwrap_or_default())
    }
}

#[cfg(feature = "rsa-recipients")]
mod rsa_recipient {
    use rand::thread_rng;
    use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
    use zeroize::Zeroizing;

    use super::{CertificateKeyProvider, SEED_LEN};
    use crate::buffer::copy_out;
    use crate::error::PDFSecurityResult;
    use crate::permissions::PDFPermissions;

    /// Envelope opener backed by an RSA private key (PKCS#1 v1.5)
    pub struct RsaRecipient {
        key: RsaPrivateKey,
    }

    impl RsaRecipient {
        pub fn new(key: RsaPrivateKey) -> Self {
            Self { key }
        }

        pub fn public_key(&self) -> RsaPublicKey {
            self.key.to_public_key()
        }
    }

    impl CertificateKeyProvider for RsaRecipient {
        fn decryption_key(&self, envelope: &[u8], out: Option<&mut [u8]>) -> PDFSecurityResult<usize> {
            let opened = Zeroizing::new(self.key.decrypt(Pkcs1v15Encrypt, envelope)?);
            copy_out(&opened, out)
        }
    }

    /// Seal `seed` and the recipient's rights for `recipient`
    pub fn seal_envelope(
        recipient: &RsaPublicKey,
        seed: &[u8; SEED_LEN],
        permissions: PDFPermissions,
    ) -> PDFSecurityResult<Vec<u8>> {
        let mut payload = Zeroizing::new(Vec::with_capacity(SEED_LEN + 4));
        payload.extend_from_slice(seed);
        payload.extend_from_slice(&(permissions.to_p_value() as u32).to_be_bytes());
        Ok(recipient.encrypt(&mut thread_rng(), Pkcs1v15Encrypt, &payload)?)
    }
}

#[cfg(feature = "rsa-recipients")]
pub use rsa_recipient::{seal_envelope, RsaRecipient};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::copy_out;
    use crate::handlers::Credentials;
    use crate::pdf::Document;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Opens envelopes by table lookup
    struct TableProvider {
        opened: HashMap<Vec<u8>, Vec<u8>>,
    }

    impl CertificateKeyProvider for TableProvider {
        fn decryption_key(&self, envelope: &[u8], out: Option<&mut [u8]>) -> PDFSecurityResult<usize> {
            let opened = self
                .opened
                .get(envelope)
                .ok_or_else(|| PDFSecurityError::crypto("not our envelope"))?;
            copy_out(opened, out)
        }
    }

    fn seed_payload(seed: &[u8; 20], permissions: u32) -> Vec<u8> {
        let mut payload = seed.to_vec();
        payload.extend_from_slice(&(PDFPermissions::new(permissions).to_p_value() as u32).to_be_bytes());
        payload
    }

    fn encrypt_entries(params: CertificateParams) -> (Dictionary, CipherInfo) {
        let handler = PublicKeySecurityHandler::new(ProviderSlot::new());
        let document = Document::new();
        let params = EncryptionParams::Certificate(params);
        let credentials = Credentials::None;
        let context = handler
            .create_context(&ContextRequest {
                mode: ContextMode::Encrypt,
                filter: super::super::PUBSEC_FILTER,
                sub_filter: SUB_FILTER_S5,
                encrypt_info: &[],
                encrypt_dict: None,
                file_id: b"id",
                document: &document,
                params: Some(&params),
                credentials: &credentials,
            })
            .unwrap();
        (context.encryption_entries().unwrap(), context.cipher_info().unwrap())
    }

    fn decrypt(handler: &PublicKeySecurityHandler, dict: &Dictionary) -> PDFSecurityResult<Box<dyn HandlerContext>> {
        let document = Document::new();
        let credentials = Credentials::None;
        handler.create_context(&ContextRequest {
            mode: ContextMode::Decrypt,
            filter: super::super::PUBSEC_FILTER,
            sub_filter: SUB_FILTER_S5,
            encrypt_info: &[],
            encrypt_dict: Some(dict),
            file_id: b"id",
            document: &document,
            params: None,
            credentials: &credentials,
        })
    }

    #[test]
    fn test_third_envelope_opens() {
        let seed = [7u8; 20];
        let envelopes = vec![b"alice".to_vec(), b"bob".to_vec(), b"carol".to_vec()];
        let (dict, expected) = encrypt_entries(CertificateParams::new(envelopes, seed));

        let slot = ProviderSlot::new();
        let provider: Arc<dyn CertificateKeyProvider> = Arc::new(TableProvider {
            opened: HashMap::from([(b"carol".to_vec(), seed_payload(&seed, PDFPermissions::PRINT))]),
        });
        slot.set(Some(provider));
        let handler = PublicKeySecurityHandler::new(slot);

        let context = decrypt(&handler, &dict).unwrap();
        assert_eq!(context.cipher_info().unwrap(), expected);
        assert_eq!(
            context.user_permissions(PDFPermissions::all()).unwrap(),
            PDFPermissions::new(PDFPermissions::PRINT)
        );
        assert!(!context.is_owner().unwrap());
    }

    #[test]
    fn test_no_matching_recipient() {
        let envelopes = vec![b"alice".to_vec(), b"bob".to_vec()];
        let (dict, _) = encrypt_entries(CertificateParams::new(envelopes, [1u8; 20]));

        let slot = ProviderSlot::new();
        let provider: Arc<dyn CertificateKeyProvider> = Arc::new(TableProvider { opened: HashMap::new() });
        slot.set(Some(provider));
        let handler = PublicKeySecurityHandler::new(slot);

        assert!(matches!(decrypt(&handler, &dict), Err(PDFSecurityError::NoMatchingRecipient(2))));
    }

    #[test]
    fn test_missing_provider() {
        let (dict, _) = encrypt_entries(CertificateParams::new(vec![b"a".to_vec()], [1u8; 20]));
        let handler = PublicKeySecurityHandler::new(ProviderSlot::new());
        assert!(matches!(decrypt(&handler, &dict), Err(PDFSecurityError::NotFound(_))));
    }

    #[test]
    fn test_metadata_flag_changes_key() {
        let envelopes = vec![b"alice".to_vec()];
        let (_, with) = encrypt_entries(CertificateParams::new(envelopes.clone(), [3u8; 20]));
        let (dict, without) =
            encrypt_entries(CertificateParams::new(envelopes, [3u8; 20]).with_encrypt_metadata(false));
        assert_ne!(with, without);
        assert!(!recipients(&dict).unwrap().1);
    }

    #[test]
    fn test_aes256_key_from_sha256() {
        let params = CertificateParams::new(vec![b"alice".to_vec()], [3u8; 20]).with_cipher(CipherId::Aes, 32);
        let (dict, cipher) = encrypt_entries(params);
        assert_eq!(cipher.key_len(), 32);
        assert_eq!(declared_cipher(&dict), (CipherId::Aes, 32));
    }

    #[cfg(feature = "rsa-recipients")]
    #[test]
    fn test_rsa_envelope_round_trip() {
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let recipient = RsaRecipient::new(key);
        let seed = [9u8; 20];
        let envelope = seal_envelope(&recipient.public_key(), &seed, PDFPermissions::all()).unwrap();

        let opened = open_envelope(&recipient, &envelope).unwrap();
        assert_eq!(&opened[..20], &seed);
        assert_eq!(opened.len(), 24);
    }
}
