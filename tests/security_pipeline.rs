use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pdf_security::buffer::copy_out;
use pdf_security::crypto::{ObjectCrypt, ObjectDecryptor};
use pdf_security::handlers::{
    encode_rms_blob, set_foxit_drm_param, verify_foxit_drm_params, FoxitDrmDecryptParams,
};
use pdf_security::{
    CallbackHandler, CertificateKeyProvider, CertificateParams, CipherId, CipherInfo, ContextMode,
    ContextRequest, Credentials, CustomParams, DecryptSession, Dictionary, Document, DocumentSink,
    EncryptSession, EncryptionContext, EncryptionType, FoxitDrmParams, FoxitDrmProvider, Object,
    ObjectId, PDFPermissions, PDFSecurity, PDFSecurityError, PDFSecurityResult, PasswordParams,
    PasswordType, PdfWriter, RmsParams, SaveFlags, StepResult, Stream,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use zeroize::Zeroizing;

const TEST_FILTER: &str = "Test/1.0";

fn stream_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Three plain strings and a 10 000-byte stream
fn sample_document() -> Document {
    let mut document = Document::new();
    for text in ["first string", "second string", "third string"] {
        document.add_object(Object::string(text.as_bytes().to_vec()));
    }
    let mut dict = Dictionary::new();
    dict.set("Kind", Object::name("Payload"));
    document.add_object(Stream::new(dict, stream_payload(10_000)));
    document
}

/// Password-less AES-16 scheme with a fixed key
fn symmetric_handler(created: Arc<AtomicUsize>) -> CallbackHandler<CipherInfo, ObjectDecryptor> {
    CallbackHandler::new()
        .create_context(move |_request| {
            created.fetch_add(1, Ordering::SeqCst);
            CipherInfo::aes(vec![0x5A; 16])
        })
        .release_context(|_cipher| {})
        .user_permissions(|_cipher, original| original)
        .is_owner(|_cipher| true)
        .cipher_info(|cipher| Ok(cipher.clone()))
        .decrypted_size(|_cipher, len| len)
        .start_decryptor(|_state, id, cipher| ObjectCrypt::new(cipher, id)?.decryptor())
        .decrypt_feed(|decryptor, chunk| decryptor.update(chunk))
        .decrypt_finish(|decryptor| decryptor.finish())
        .encrypted_size(|_state, id, cipher, plaintext| {
            ObjectCrypt::new(cipher, id)
                .map(|crypt| crypt.encrypted_size(plaintext.len()))
                .unwrap_or(0)
        })
        .encrypt_data(|_state, id, cipher, plaintext, out| {
            let encrypted = ObjectCrypt::new(cipher, id)?.encrypt(plaintext)?;
            copy_out(&encrypted, Some(out))
        })
}

fn security_with_test_handler() -> (PDFSecurity, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    let security = PDFSecurity::new();
    security
        .register_callbacks(TEST_FILTER, symmetric_handler(Arc::clone(&created)))
        .unwrap();
    (security, created)
}

fn decrypt(security: &PDFSecurity, document: &Document, credentials: Credentials) -> PDFSecurityResult<Document> {
    let mut sink = DocumentSink::new();
    security
        .start_decryption(document, credentials, &mut sink, SaveFlags::empty())?
        .run_to_end()?;
    Ok(sink.into_document().unwrap())
}

fn assert_same_objects(actual: &Document, expected: &Document) {
    assert_eq!(actual.object_count(), expected.object_count());
    for (id, object) in expected.objects() {
        assert_eq!(actual.get(id), Some(object), "object {}", id);
    }
}

#[test_log::test]
fn test_custom_handler_four_steps() {
    let (security, _) = security_with_test_handler();
    let original = sample_document();

    let mut sink = DocumentSink::new();
    let mut progress = security
        .start_custom_encryption(&original, CustomParams::new(TEST_FILTER), &mut sink, SaveFlags::empty())
        .unwrap();
    let results: Vec<StepResult> = (0..4).map(|_| progress.continue_step()).collect();
    assert!(results[..3].iter().all(|result| matches!(result, StepResult::TobeContinued)));
    assert!(results[3].is_finished());
    assert_eq!(progress.percent(), 100);
    drop(progress);
    assert_eq!(security.registry().open_contexts(TEST_FILTER), 0);

    let encrypted = sink.into_document().unwrap();
    assert_eq!(encrypted.encryption_type(), EncryptionType::Custom);
    assert_eq!(encrypted.security_filter(), Some(TEST_FILTER));
    assert_ne!(encrypted.get(ObjectId::new(1, 0)), original.get(ObjectId::new(1, 0)));

    let decrypted = decrypt(&security, &encrypted, Credentials::None).unwrap();
    assert!(!decrypted.is_encrypted());
    assert_same_objects(&decrypted, &original);
}

#[test_log::test]
fn test_remove_security_rejected_before_context() {
    let (security, created) = security_with_test_handler();
    let original = sample_document();
    let mut sink = DocumentSink::new();

    let result = security.start_custom_encryption(
        &original,
        CustomParams::new(TEST_FILTER),
        &mut sink,
        SaveFlags::REMOVE_SECURITY,
    );
    assert!(matches!(result, Err(PDFSecurityError::InvalidParameter(_))));
    assert_eq!(created.load(Ordering::SeqCst), 0);
    drop(result);
    assert!(!sink.is_finished());
}

/// Opens envelopes by table lookup and records every envelope it is shown
struct RecordingProvider {
    opened: HashMap<Vec<u8>, Vec<u8>>,
    seen: Mutex<Vec<Vec<u8>>>,
}

impl CertificateKeyProvider for RecordingProvider {
    fn decryption_key(&self, envelope: &[u8], out: Option<&mut [u8]>) -> PDFSecurityResult<usize> {
        self.seen.lock().unwrap().push(envelope.to_vec());
        let opened = self
            .opened
            .get(envelope)
            .ok_or_else(|| PDFSecurityError::crypto("not our envelope"))?;
        copy_out(opened, out)
    }
}

#[test_log::test]
fn test_certificate_second_envelope_matches() {
    let seed = [0x17u8; 20];
    let envelopes = vec![b"envelope-A".to_vec(), b"envelope-B".to_vec(), b"envelope-C".to_vec()];
    let mut opened = seed.to_vec();
    opened.extend_from_slice(&(PDFPermissions::new(PDFPermissions::PRINT).to_p_value() as u32).to_be_bytes());
    let provider = Arc::new(RecordingProvider {
        opened: HashMap::from([(b"envelope-B".to_vec(), opened)]),
        seen: Mutex::new(Vec::new()),
    });

    let security = PDFSecurity::new();
    let original = sample_document();
    let mut sink = DocumentSink::new();
    security
        .start_certificate_encryption(&original, CertificateParams::new(envelopes, seed), &mut sink, SaveFlags::empty())
        .unwrap()
        .run_to_end()
        .unwrap();
    let encrypted = sink.into_document().unwrap();
    assert_eq!(encrypted.encryption_type(), EncryptionType::Certificate);

    security.set_certificate_provider(Some(provider.clone()));
    let decrypted = decrypt(&security, &encrypted, Credentials::None).unwrap();
    assert_same_objects(&decrypted, &original);

    let seen = provider.seen.lock().unwrap();
    assert!(seen.contains(&b"envelope-A".to_vec()));
    assert!(seen.contains(&b"envelope-B".to_vec()));
    assert!(!seen.contains(&b"envelope-C".to_vec()));
}

#[test_log::test]
fn test_certificate_without_match() {
    let security = PDFSecurity::new();
    let original = sample_document();
    let mut sink = DocumentSink::new();
    security
        .start_certificate_encryption(
            &original,
            CertificateParams::new(vec![b"one".to_vec(), b"two".to_vec()], [1u8; 20]),
            &mut sink,
            SaveFlags::empty(),
        )
        .unwrap()
        .run_to_end()
        .unwrap();
    let encrypted = sink.into_document().unwrap();

    assert!(matches!(
        decrypt(&security, &encrypted, Credentials::None),
        Err(PDFSecurityError::NotFound(_))
    ));
    security.set_certificate_provider(Some(Arc::new(RecordingProvider {
        opened: HashMap::new(),
        seen: Mutex::new(Vec::new()),
    })));
    assert!(matches!(
        decrypt(&security, &encrypted, Credentials::None),
        Err(PDFSecurityError::NoMatchingRecipient(2))
    ));
}

#[cfg(feature = "rsa-recipients")]
#[test_log::test]
fn test_rsa_recipients() {
    use pdf_security::handlers::{seal_envelope, RsaRecipient};

    let mut rng = rand::thread_rng();
    let ours = RsaRecipient::new(rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap());
    let theirs = RsaRecipient::new(rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap());
    let seed = CertificateParams::random_seed();
    let rights = PDFPermissions::new(PDFPermissions::PRINT | PDFPermissions::EXTRACT);
    let envelopes = vec![
        seal_envelope(&theirs.public_key(), &seed, PDFPermissions::all()).unwrap(),
        seal_envelope(&ours.public_key(), &seed, rights).unwrap(),
        seal_envelope(&theirs.public_key(), &seed, PDFPermissions::all()).unwrap(),
    ];

    let security = PDFSecurity::new();
    let original = sample_document();
    let mut sink = DocumentSink::new();
    security
        .start_certificate_encryption(&original, CertificateParams::new(envelopes, seed), &mut sink, SaveFlags::empty())
        .unwrap()
        .run_to_end()
        .unwrap();
    let encrypted = sink.into_document().unwrap();

    security.set_certificate_provider(Some(Arc::new(ours)));
    let granted = security
        .user_permissions(&encrypted, &Credentials::None, PDFPermissions::all())
        .unwrap();
    assert_eq!(granted, rights);
    assert_same_objects(&decrypt(&security, &encrypted, Credentials::None).unwrap(), &original);
}

fn open_test_context(security: &PDFSecurity, document: &Document, mode: ContextMode) -> EncryptionContext {
    let credentials = Credentials::None;
    EncryptionContext::create(
        security.registry(),
        &ContextRequest {
            mode,
            filter: TEST_FILTER,
            sub_filter: "",
            encrypt_info: &[],
            encrypt_dict: None,
            file_id: b"0123456789abcdef",
            document,
            params: None,
            credentials: &credentials,
        },
    )
    .unwrap()
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(16)]
#[case(333)]
#[case(5000)]
fn test_chunking_invariance(#[case] chunk_len: usize) {
    let (security, _) = security_with_test_handler();
    let document = Document::new();
    let mut context = open_test_context(&security, &document, ContextMode::Encrypt);
    let plaintext = stream_payload(4099);

    let ciphertext = EncryptSession::open(&mut context, 12, 3).unwrap().encrypt(&plaintext).unwrap();

    let mut session = DecryptSession::open(&mut context, 12, 3).unwrap();
    let mut decrypted = Vec::new();
    for chunk in ciphertext.chunks(chunk_len) {
        decrypted.extend(session.feed(chunk).unwrap());
    }
    decrypted.extend(session.finish().unwrap());
    assert_eq!(decrypted, plaintext);
    context.close();
}

#[test_log::test]
fn test_two_call_protocol() {
    let (security, _) = security_with_test_handler();
    let document = Document::new();
    let mut context = open_test_context(&security, &document, ContextMode::Encrypt);
    let plaintext = b"size negotiated payload".to_vec();

    let mut encrypt = EncryptSession::open(&mut context, 4, 0).unwrap();
    let required = encrypt.encrypted_size(&plaintext).unwrap();
    let mut short = vec![0u8; required - 1];
    assert!(matches!(
        encrypt.encrypt_into(&plaintext, &mut short),
        Err(PDFSecurityError::BufferTooSmall { .. })
    ));
    let mut ciphertext = vec![0u8; required];
    let written = encrypt.encrypt_into(&plaintext, &mut ciphertext).unwrap();
    ciphertext.truncate(written);

    let mut session = DecryptSession::open(&mut context, 4, 0).unwrap();
    let mut decrypted = Vec::new();
    let len = session.feed_into(&ciphertext, None).unwrap();
    if len > 0 {
        let mut too_small = vec![0u8; len - 1];
        assert!(matches!(
            session.feed_into(&ciphertext, Some(&mut too_small)),
            Err(PDFSecurityError::BufferTooSmall { .. })
        ));
    }
    let mut out = vec![0u8; len];
    session.feed_into(&ciphertext, Some(&mut out)).unwrap();
    decrypted.extend(out);

    let len = session.finish_into(None).unwrap();
    let mut out = vec![0u8; len];
    session.finish_into(Some(&mut out)).unwrap();
    decrypted.extend(out);
    assert!(session.is_finished());
    assert_eq!(decrypted, plaintext);

    let cipher = context.cipher_info().unwrap();
    let key_len = cipher.copy_key(None).unwrap();
    let mut key = vec![0u8; key_len];
    cipher.copy_key(Some(&mut key)).unwrap();
    assert_eq!(key, vec![0x5A; 16]);
}

#[test_log::test]
fn test_empty_payload_finish() {
    let (security, _) = security_with_test_handler();
    let document = Document::new();
    let mut context = open_test_context(&security, &document, ContextMode::Decrypt);
    let session = DecryptSession::open(&mut context, 1, 0).unwrap();
    assert_eq!(session.finish().unwrap(), Vec::<u8>::new());
}

#[rstest]
#[case::rc4_40(CipherId::Rc4, 5)]
#[case::rc4_128(CipherId::Rc4, 16)]
#[case::aes_128(CipherId::Aes, 16)]
#[case::aes_256(CipherId::Aes, 32)]
fn test_password_round_trip(#[case] cipher: CipherId, #[case] key_len: usize) {
    let security = PDFSecurity::new();
    let original = sample_document();
    let params = PasswordParams::new("user", "owner")
        .with_cipher(cipher, key_len)
        .with_permissions(PDFPermissions::new(PDFPermissions::PRINT | PDFPermissions::ASSEMBLE));

    let mut sink = DocumentSink::new();
    security
        .start_password_encryption(&original, params, &mut sink, SaveFlags::empty())
        .unwrap()
        .run_to_end()
        .unwrap();
    let encrypted = sink.into_document().unwrap();
    assert_eq!(encrypted.encryption_type(), EncryptionType::Password);

    assert_eq!(security.check_password(&encrypted, b"owner").unwrap(), PasswordType::Owner);
    assert_eq!(security.check_password(&encrypted, b"user").unwrap(), PasswordType::User);
    assert_eq!(security.check_password(&encrypted, b"wrong").unwrap(), PasswordType::Invalid);

    let granted = security
        .user_permissions(&encrypted, &Credentials::password("user"), PDFPermissions::all())
        .unwrap();
    assert!(granted.has_permission(PDFPermissions::PRINT));
    assert!(!granted.has_permission(PDFPermissions::MODIFY));
    assert_eq!(granted.bits() & !PDFPermissions::ALL, 0);

    assert!(matches!(
        decrypt(&security, &encrypted, Credentials::password("wrong")),
        Err(PDFSecurityError::AuthenticationFailed)
    ));
    assert_same_objects(&decrypt(&security, &encrypted, Credentials::password("user")).unwrap(), &original);
    assert_same_objects(&decrypt(&security, &encrypted, Credentials::password("owner")).unwrap(), &original);
}

#[test_log::test]
fn test_granted_rights_limited_to_original_mask() {
    let narrow = PDFPermissions::new(PDFPermissions::PRINT | PDFPermissions::EXTRACT);

    let security = PDFSecurity::new();
    let original = sample_document();
    let mut sink = DocumentSink::new();
    security
        .start_password_encryption(
            &original,
            PasswordParams::new("user", "owner").with_permissions(PDFPermissions::all()),
            &mut sink,
            SaveFlags::empty(),
        )
        .unwrap()
        .run_to_end()
        .unwrap();
    let encrypted = sink.into_document().unwrap();
    let owner = Credentials::password("owner");
    assert_eq!(
        security.user_permissions(&encrypted, &owner, PDFPermissions::all()).unwrap(),
        PDFPermissions::all()
    );
    assert_eq!(security.user_permissions(&encrypted, &owner, narrow).unwrap(), narrow);

    let generous = symmetric_handler(Arc::new(AtomicUsize::new(0))).user_permissions(|_cipher, _original| PDFPermissions::all());
    security.register_callbacks("Test/Generous", generous).unwrap();
    let mut sink = DocumentSink::new();
    security
        .start_custom_encryption(&original, CustomParams::new("Test/Generous"), &mut sink, SaveFlags::empty())
        .unwrap()
        .run_to_end()
        .unwrap();
    let encrypted = sink.into_document().unwrap();
    assert_eq!(security.user_permissions(&encrypted, &Credentials::None, narrow).unwrap(), narrow);
}

#[test_log::test]
fn test_legacy_revision_with_aes256_key_fails_cleanly() {
    let mut std_cf = Dictionary::new();
    std_cf.set("CFM", Object::name("AESV3"));
    let mut cf = Dictionary::new();
    cf.set("StdCF", std_cf);

    let mut dict = Dictionary::new();
    dict.set("Filter", Object::name("Standard"));
    dict.set("V", 5);
    dict.set("R", 4);
    dict.set("P", -4);
    dict.set("O", Object::string(vec![0x4F; 32]));
    dict.set("U", Object::string(vec![0x55; 32]));
    dict.set("CF", cf);
    dict.set("StmF", Object::name("StdCF"));

    let mut document = sample_document();
    let encrypt = document.add_object(dict);
    document.trailer_mut().set("Encrypt", encrypt);
    document
        .trailer_mut()
        .set("ID", vec![Object::string(vec![7u8; 16]), Object::string(vec![7u8; 16])]);

    let security = PDFSecurity::new();
    let credentials = Credentials::password("pw");
    assert!(matches!(
        security.check_password(&document, b"pw"),
        Err(PDFSecurityError::MalformedPDF(_))
    ));
    assert!(matches!(
        security.is_owner(&document, &credentials),
        Err(PDFSecurityError::MalformedPDF(_))
    ));
    assert!(matches!(
        decrypt(&security, &document, credentials),
        Err(PDFSecurityError::MalformedPDF(_))
    ));
}

#[test_log::test]
fn test_metadata_left_clear() {
    let security = PDFSecurity::new();
    let mut original = sample_document();
    let mut dict = Dictionary::new();
    dict.set("Type", Object::name("Metadata"));
    dict.set("Subtype", Object::name("XML"));
    let xmp = b"<x:xmpmeta xmlns:x='adobe:ns:meta/'/>".to_vec();
    let metadata = original.add_object(Stream::new(dict, xmp.clone()));

    let mut sink = DocumentSink::new();
    security
        .start_password_encryption(
            &original,
            PasswordParams::new("", "owner").with_encrypt_metadata(false),
            &mut sink,
            SaveFlags::empty(),
        )
        .unwrap()
        .run_to_end()
        .unwrap();
    let encrypted = sink.into_document().unwrap();

    match encrypted.get(metadata) {
        Some(Object::Stream(stream)) => assert_eq!(stream.data(), &xmp[..]),
        other => panic!("metadata stream missing: {:?}", other),
    }
    assert_eq!(encrypted.encryption_dict().and_then(|d| d.get_bool("EncryptMetadata")), Some(false));
    assert_ne!(encrypted.get(ObjectId::new(4, 0)), original.get(ObjectId::new(4, 0)));

    assert_eq!(security.check_password(&encrypted, b"").unwrap(), PasswordType::NoPassword);
    assert_same_objects(&decrypt(&security, &encrypted, Credentials::None).unwrap(), &original);
}

#[test_log::test]
fn test_optimize_drops_unreachable() {
    let (security, _) = security_with_test_handler();
    let mut original = sample_document();
    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::name("Catalog"));
    catalog.set("Names", ObjectId::new(2, 0));
    let root = original.add_object(catalog);
    original.trailer_mut().set("Root", root);

    let mut sink = DocumentSink::new();
    security
        .start_custom_encryption(&original, CustomParams::new(TEST_FILTER), &mut sink, SaveFlags::OPTIMIZE)
        .unwrap()
        .run_to_end()
        .unwrap();
    let encrypted = sink.into_document().unwrap();

    assert!(encrypted.get(ObjectId::new(1, 0)).is_none());
    assert!(encrypted.get(ObjectId::new(2, 0)).is_some());
    assert!(encrypted.get(ObjectId::new(4, 0)).is_none());
    assert!(encrypted.get(root).is_some());
}

/// Symmetric scheme whose encryption fails on object 3
fn failing_handler() -> CallbackHandler<CipherInfo, ObjectDecryptor> {
    symmetric_handler(Arc::new(AtomicUsize::new(0))).encrypt_data(|_state, id, cipher, plaintext, out| {
        if id.number == 3 {
            return Err(PDFSecurityError::crypto("injected failure"));
        }
        let encrypted = ObjectCrypt::new(cipher, id)?.encrypt(plaintext)?;
        copy_out(&encrypted, Some(out))
    })
}

#[test_log::test]
fn test_failed_pass_leaves_no_output() {
    let security = PDFSecurity::new();
    security.register_callbacks("Failing", failing_handler()).unwrap();
    let original = sample_document();

    let mut sink = DocumentSink::new();
    let mut progress = security
        .start_custom_encryption(&original, CustomParams::new("Failing"), &mut sink, SaveFlags::empty())
        .unwrap();
    assert!(matches!(progress.continue_step(), StepResult::TobeContinued));
    assert!(matches!(progress.continue_step(), StepResult::TobeContinued));
    assert!(matches!(progress.continue_step(), StepResult::Failed(PDFSecurityError::CryptoError(_))));
    assert!(matches!(progress.continue_step(), StepResult::Failed(PDFSecurityError::Unrecoverable(_))));
    assert_eq!(security.registry().open_contexts("Failing"), 0);
    drop(progress);
    assert!(sink.into_document().is_none());

    let file = tempfile::tempfile().unwrap();
    let mut progress = security
        .start_custom_encryption(&original, CustomParams::new("Failing"), PdfWriter::new(file), SaveFlags::empty())
        .unwrap();
    assert!(progress.run_to_end().is_err());
    let writer = progress.into_sink().unwrap();
    assert!(!writer.is_complete());

    let mut buffer = Vec::new();
    let mut progress = security
        .start_custom_encryption(&original, CustomParams::new("Failing"), PdfWriter::new(&mut buffer), SaveFlags::empty())
        .unwrap();
    assert!(progress.run_to_end().is_err());
    drop(progress);
    let text = String::from_utf8_lossy(&buffer);
    assert!(text.starts_with("%PDF-"));
    assert!(!text.contains("trailer"));
    assert!(!text.contains("%%EOF"));
}

#[test_log::test]
fn test_pdf_writer_output() {
    let (security, _) = security_with_test_handler();
    let original = sample_document();
    let mut buffer = Vec::new();
    security
        .start_custom_encryption(&original, CustomParams::new(TEST_FILTER), PdfWriter::new(&mut buffer), SaveFlags::empty())
        .unwrap()
        .run_to_end()
        .unwrap();

    let text = String::from_utf8_lossy(&buffer);
    assert!(text.starts_with("%PDF-1.7"));
    assert!(text.contains("/Filter /Test#2F1.0"));
    assert!(text.contains("/Encrypt 5 0 R"));
    assert!(text.trim_end().ends_with("%%EOF"));
}

struct FixedDrmProvider(FoxitDrmDecryptParams);

impl FoxitDrmProvider for FixedDrmProvider {
    fn decryption_params(&self, _document: &Document, _sub_filter: &str) -> PDFSecurityResult<FoxitDrmDecryptParams> {
        Ok(self.0.clone())
    }
}

#[test_log::test]
fn test_foxit_drm_tamper_detected() {
    let security = PDFSecurity::new();
    security.set_foxit_drm_provider(Some(Arc::new(FixedDrmProvider(FoxitDrmDecryptParams {
        is_owner: false,
        permissions: PDFPermissions::new(PDFPermissions::PRINT),
        cipher: CipherId::Aes,
        key_len: 16,
        file_id: b"file-0001".to_vec(),
        initial_key: Zeroizing::new(b"initial".to_vec()),
    }))));

    let mut original = sample_document();
    set_foxit_drm_param(&mut original, "Issuer", Some("Foxit")).unwrap();
    set_foxit_drm_param(&mut original, "User", Some("alice@example.com")).unwrap();
    let params = FoxitDrmParams::new("FoxitDRMV2")
        .with_keys(b"file-0001".to_vec(), b"initial".to_vec())
        .with_permissions(PDFPermissions::new(PDFPermissions::PRINT), false);

    let mut sink = DocumentSink::new();
    security
        .start_foxit_drm_encryption(&original, params, &mut sink, SaveFlags::empty())
        .unwrap()
        .run_to_end()
        .unwrap();
    let mut encrypted = sink.into_document().unwrap();
    assert_eq!(encrypted.encryption_type(), EncryptionType::FoxitDRM);
    assert!(verify_foxit_drm_params(&encrypted).unwrap());
    assert_same_objects(&decrypt(&security, &encrypted, Credentials::None).unwrap(), &original);

    let encrypt_ref = encrypted.encrypt_ref().unwrap();
    if let Some(Object::Dictionary(dict)) = encrypted.get_mut(encrypt_ref) {
        if let Some(Object::Dictionary(params)) = dict.get_mut("Params") {
            params.set("User", Object::string(b"mallory@example.com".to_vec()));
        }
    }
    assert!(!verify_foxit_drm_params(&encrypted).unwrap());
    assert!(matches!(
        decrypt(&security, &encrypted, Credentials::None),
        Err(PDFSecurityError::VerificationFailed)
    ));
}

#[test_log::test]
fn test_rms_requires_registered_handler() {
    let security = PDFSecurity::new();
    let original = sample_document();
    let license = encode_rms_blob(b"<XrML>license</XrML>").unwrap();

    let mut sink = DocumentSink::new();
    let result = security.start_rms_encryption(
        &original,
        RmsParams::new(license.into_bytes()),
        &mut sink,
        SaveFlags::empty(),
    );
    assert!(matches!(result, Err(PDFSecurityError::UnknownSecurityHandler(name)) if name == "MicrosoftIRMServices"));
}

#[test_log::test]
fn test_rms_through_registered_handler() {
    let security = PDFSecurity::new();
    security
        .register_callbacks("MicrosoftIRMServices", symmetric_handler(Arc::new(AtomicUsize::new(0))))
        .unwrap();
    let original = sample_document();
    let license = encode_rms_blob(b"<XrML>license</XrML>").unwrap().into_bytes();

    let mut sink = DocumentSink::new();
    security
        .start_rms_encryption(
            &original,
            RmsParams::new(license.clone()).with_server_eul(b"server".to_vec(), b"eul".to_vec()),
            &mut sink,
            SaveFlags::empty(),
        )
        .unwrap()
        .run_to_end()
        .unwrap();
    let encrypted = sink.into_document().unwrap();

    let dict = encrypted.encryption_dict().unwrap();
    assert_eq!(dict.get_string("PublishLicense"), Some(&license[..]));
    assert_eq!(encrypted.encryption_type(), EncryptionType::RMS);
    assert_same_objects(&decrypt(&security, &encrypted, Credentials::None).unwrap(), &original);
}

#[test_log::test]
fn test_registry_laws() {
    let (security, _) = security_with_test_handler();
    assert!(matches!(
        security.register_callbacks(TEST_FILTER, symmetric_handler(Arc::new(AtomicUsize::new(0)))),
        Err(PDFSecurityError::Conflict(_))
    ));
    security.unregister(TEST_FILTER).unwrap();
    assert!(security.registry().lookup(TEST_FILTER).is_none());
    assert!(matches!(security.unregister(TEST_FILTER), Err(PDFSecurityError::NotFound(_))));
}
