//! Password authentication against a Standard encryption dictionary

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};
use zeroize::Zeroizing;

use super::key_derivation::{
    compute_encryption_key, compute_u_value, owner_rc4_key, r6_hash, rc4_rounds,
};
use crate::crypto::cbc_decrypt_raw;
use crate::error::{PDFSecurityError, PDFSecurityResult};
use crate::pdf::Dictionary;

const ZERO_IV: [u8; 16] = [0u8; 16];

/// Password-related entries of a Standard encryption dictionary
#[derive(Debug, Clone)]
pub(crate) struct StandardEntries {
    pub revision: i64,
    pub key_len: usize,
    pub o: Vec<u8>,
    pub u: Vec<u8>,
    pub oe: Vec<u8>,
    pub ue: Vec<u8>,
    pub perms: Vec<u8>,
    pub p: i32,
    pub encrypt_metadata: bool,
    pub file_id: Vec<u8>,
}

impl StandardEntries {
    /// Read the entries, checking the lengths each revision relies on
    pub fn from_dict(dict: &Dictionary, file_id: &[u8], key_len: usize) -> PDFSecurityResult<Self> {
        let revision = dict
            .get_integer("R")
            .ok_or_else(|| PDFSecurityError::malformed("Standard encryption dictionary without /R"))?;
        let p = dict
            .get_integer("P")
            .ok_or_else(|| PDFSecurityError::malformed("Standard encryption dictionary without /P"))?;
        let bytes = |key: &str| dict.get_string(key).map(<[u8]>::to_vec).unwrap_or_default();

        let entries = Self {
            revision,
            key_len,
            o: bytes("O"),
            u: bytes("U"),
            oe: bytes("OE"),
            ue: bytes("UE"),
            perms: bytes("Perms"),
            p: p as i32,
            encrypt_metadata: dict.get_bool("EncryptMetadata").unwrap_or(true),
            file_id: file_id.to_vec(),
        };

        let (hash_len, wrapped) = match revision {
            2..=4 => (32, false),
            5 | 6 => (48, true),
            other => return Err(PDFSecurityError::unsupported(format!("Standard revision {}", other))),
        };
        // Revisions 2 to 4 take the file key from one MD5 digest
        if !wrapped && key_len > 16 {
            return Err(PDFSecurityError::malformed(format!(
                "{}-byte key declared for Standard revision {}",
                key_len, revision
            )));
        }
        if entries.o.len() < hash_len || entries.u.len() < hash_len {
            return Err(PDFSecurityError::malformed(format!(
                "/O or /U shorter than {} bytes",
                hash_len
            )));
        }
        if wrapped && (entries.oe.len() < 32 || entries.ue.len() < 32) {
            return Err(PDFSecurityError::malformed("/OE or /UE shorter than 32 bytes"));
        }
        Ok(entries)
    }

    fn is_aes256(&self) -> bool {
        self.revision >= 5
    }
}

/// Algorithms 6 and 11: file key when `password` is the user password
pub(crate) fn authenticate_user(
    entries: &StandardEntries,
    password: &[u8],
) -> PDFSecurityResult<Option<Zeroizing<Vec<u8>>>> {
    if entries.is_aes256() {
        let hash = r6_hash(password, &entries.u[32..40], &[], entries.revision)?;
        if !constant_time_eq(&hash, &entries.u[..32]) {
            return Ok(None);
        }
        let intermediate = r6_hash(password, &entries.u[40..48], &[], entries.revision)?;
        let key = Zeroizing::new(cbc_decrypt_raw(&intermediate, &ZERO_IV, &entries.ue[..32])?);
        check_perms(entries, &key);
        return Ok(Some(key));
    }

    let key = compute_encryption_key(
        password,
        &entries.o,
        entries.p,
        &entries.file_id,
        entries.revision,
        entries.key_len,
        entries.encrypt_metadata,
    );
    let u_value = compute_u_value(&key, &entries.file_id, entries.revision)?;
    let compared = if entries.revision == 2 { 32 } else { 16 };
    if constant_time_eq(&u_value[..compared], &entries.u[..compared]) {
        Ok(Some(key))
    } else {
        Ok(None)
    }
}

/// Algorithms 7 and 12: file key when `password` is the owner password
pub(crate) fn authenticate_owner(
    entries: &StandardEntries,
    password: &[u8],
) -> PDFSecurityResult<Option<Zeroizing<Vec<u8>>>> {
    if entries.is_aes256() {
        let user_data = &entries.u[..48];
        let hash = r6_hash(password, &entries.o[32..40], user_data, entries.revision)?;
        if !constant_time_eq(&hash, &entries.o[..32]) {
            return Ok(None);
        }
        let intermediate = r6_hash(password, &entries.o[40..48], user_data, entries.revision)?;
        let key = Zeroizing::new(cbc_decrypt_raw(&intermediate, &ZERO_IV, &entries.oe[..32])?);
        check_perms(entries, &key);
        return Ok(Some(key));
    }

    let rc4_key = owner_rc4_key(password, entries.revision, entries.key_len);
    let user_password = Zeroizing::new(rc4_rounds(&rc4_key, &entries.o[..32], entries.revision, true)?);
    authenticate_user(entries, &user_password)
}

/// Compare `/Perms` with `/P`; a mismatch is logged, not fatal
fn check_perms(entries: &StandardEntries, key: &[u8]) {
    if entries.perms.len() < 16 {
        debug!("No /Perms entry to cross-check");
        return;
    }
    match cbc_decrypt_raw(key, &ZERO_IV, &entries.perms[..16]) {
        Ok(block) if &block[9..12] == b"adb" => {
            if LittleEndian::read_u32(&block[..4]) as i32 != entries.p {
                warn!("/Perms disagrees with /P; using /P");
            }
        }
        _ => warn!("/Perms does not decrypt to a permission block"),
    }
}

/// Constant-time comparison of equal-length byte slices
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
