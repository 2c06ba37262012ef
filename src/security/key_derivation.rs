//! Key and password-entry derivation of the Standard security handler
//! (ISO 32000-2 section 7.6.4, algorithms 2 through 10 and 2.B)

use byteorder::{ByteOrder, LittleEndian};
use rand::{thread_rng, RngCore};
use sha2::{Digest, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use crate::crypto::{cbc_encrypt_raw, rc4_apply};
use crate::error::PDFSecurityResult;

/// Password padding string of the Standard handler
pub(crate) const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41,
    0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80,
    0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

const ZERO_IV: [u8; 16] = [0u8; 16];

/// Password truncated or padded to 32 bytes
pub(crate) fn pad_password(password: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut padded = Zeroizing::new([0u8; 32]);
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// RC4 key length used by the O/U algorithms of a revision
pub(crate) fn rc4_key_len(revision: i64, key_len: usize) -> usize {
    if revision == 2 {
        5
    } else {
        key_len
    }
}

/// Algorithm 2: file key of revisions 2 to 4
pub(crate) fn compute_encryption_key(
    password: &[u8],
    o_value: &[u8],
    p: i32,
    file_id: &[u8],
    revision: i64,
    key_len: usize,
    encrypt_metadata: bool,
) -> Zeroizing<Vec<u8>> {
    let key_len = rc4_key_len(revision, key_len);

    let mut input = Zeroizing::new(Vec::with_capacity(32 + 32 + 4 + file_id.len() + 4));
    input.extend_from_slice(&pad_password(password)[..]);
    input.extend_from_slice(&o_value[..o_value.len().min(32)]);
    let mut p_bytes = [0u8; 4];
    LittleEndian::write_u32(&mut p_bytes, p as u32);
    input.extend_from_slice(&p_bytes);
    input.extend_from_slice(file_id);
    if revision >= 4 && !encrypt_metadata {
        input.extend_from_slice(&[0xFF; 4]);
    }

    let mut digest = Zeroizing::new(md5::compute(&input[..]).0);
    if revision >= 3 {
        for _ in 0..50 {
            *digest = md5::compute(&digest[..key_len]).0;
        }
    }
    Zeroizing::new(digest[..key_len].to_vec())
}

/// RC4 key derived from the owner password (algorithm 3, steps a to d)
pub(crate) fn owner_rc4_key(owner_password: &[u8], revision: i64, key_len: usize) -> Zeroizing<Vec<u8>> {
    let mut digest = Zeroizing::new(md5::compute(&pad_password(owner_password)[..]).0);
    if revision >= 3 {
        for _ in 0..50 {
            *digest = md5::compute(&digest[..]).0;
        }
    }
    Zeroizing::new(digest[..rc4_key_len(revision, key_len)].to_vec())
}

/// Apply RC4 once (revision 2) or 20 times with XOR-ed keys (revision 3+)
pub(crate) fn rc4_rounds(key: &[u8], data: &[u8], revision: i64, reverse: bool) -> PDFSecurityResult<Vec<u8>> {
    if revision == 2 {
        return rc4_apply(key, data);
    }

    let mut out = data.to_vec();
    let mut round_key = Zeroizing::new(vec![0u8; key.len()]);
    for step in 0..20u8 {
        let i = if reverse { 19 - step } else { step };
        for (dst, src) in round_key.iter_mut().zip(key) {
            *dst = src ^ i;
        }
        out = rc4_apply(&round_key, &out)?;
    }
    Ok(out)
}

/// Algorithm 3: `/O` of revisions 2 to 4
pub(crate) fn compute_o_value(
    owner_password: &[u8],
    user_password: &[u8],
    revision: i64,
    key_len: usize,
) -> PDFSecurityResult<Vec<u8>> {
    let owner = if owner_password.is_empty() {
        user_password
    } else {
        owner_password
    };
    let key = owner_rc4_key(owner, revision, key_len);
    rc4_rounds(&key, &pad_password(user_password)[..], revision, false)
}

/// Algorithms 4 and 5: `/U` of revisions 2 to 4
pub(crate) fn compute_u_value(file_key: &[u8], file_id: &[u8], revision: i64) -> PDFSecurityResult<Vec<u8>> {
    if revision == 2 {
        return rc4_apply(file_key, &PADDING);
    }

    let mut input = Vec::with_capacity(32 + file_id.len());
    input.extend_from_slice(&PADDING);
    input.extend_from_slice(file_id);
    let digest = md5::compute(&input).0;

    let mut u_value = rc4_rounds(file_key, &digest, revision, false)?;
    u_value.resize(32, 0);
    Ok(u_value)
}

/// Passwords of revision 6 are limited to 127 bytes
pub(crate) fn r6_password(password: &[u8]) -> &[u8] {
    &password[..password.len().min(127)]
}

/// Algorithm 2.B hash; revision 5 uses a single SHA-256
pub(crate) fn r6_hash(password: &[u8], salt: &[u8], user_data: &[u8], revision: i64) -> PDFSecurityResult<Zeroizing<Vec<u8>>> {
    let password = r6_password(password);

    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(user_data);
    let mut k = Zeroizing::new(hasher.finalize().to_vec());
    if revision == 5 {
        return Ok(k);
    }

    let mut round: u32 = 0;
    loop {
        let mut base = Zeroizing::new(Vec::with_capacity(password.len() + k.len() + user_data.len()));
        base.extend_from_slice(password);
        base.extend_from_slice(&k);
        base.extend_from_slice(user_data);
        let k1 = Zeroizing::new(base.repeat(64));

        let e = Zeroizing::new(cbc_encrypt_raw(&k[..16], &k[16..32], &k1)?);
        // 256 is 1 mod 3, so the byte sum has the same remainder as the big-endian number
        let selector = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
        *k = match selector {
            0 => Sha256::digest(&e[..]).to_vec(),
            1 => Sha384::digest(&e[..]).to_vec(),
            _ => Sha512::digest(&e[..]).to_vec(),
        };

        round += 1;
        let last = u32::from(e[e.len() - 1]);
        if round >= 64 && last + 32 <= round {
            break;
        }
    }

    k.truncate(32);
    Ok(k)
}

fn random_salts() -> ([u8; 8], [u8; 8]) {
    let mut validation = [0u8; 8];
    let mut key = [0u8; 8];
    thread_rng().fill_bytes(&mut validation);
    thread_rng().fill_bytes(&mut key);
    (validation, key)
}

/// Algorithm 8: `/U` and `/UE` of revision 6
pub(crate) fn r6_user_values(user_password: &[u8], file_key: &[u8]) -> PDFSecurityResult<(Vec<u8>, Vec<u8>)> {
    let (validation_salt, key_salt) = random_salts();

    let mut u_value = r6_hash(user_password, &validation_salt, &[], 6)?.to_vec();
    u_value.extend_from_slice(&validation_salt);
    u_value.extend_from_slice(&key_salt);

    let intermediate = r6_hash(user_password, &key_salt, &[], 6)?;
    let ue_value = cbc_encrypt_raw(&intermediate, &ZERO_IV, file_key)?;
    Ok((u_value, ue_value))
}

/// Algorithm 9: `/O` and `/OE` of revision 6, bound to the 48-byte `/U`
pub(crate) fn r6_owner_values(
    owner_password: &[u8],
    file_key: &[u8],
    u_value: &[u8],
) -> PDFSecurityResult<(Vec<u8>, Vec<u8>)> {
    let (validation_salt, key_salt) = random_salts();
    let user_data = &u_value[..u_value.len().min(48)];

    let mut o_value = r6_hash(owner_password, &validation_salt, user_data, 6)?.to_vec();
    o_value.extend_from_slice(&validation_salt);
    o_value.extend_from_slice(&key_salt);

    let intermediate = r6_hash(owner_password, &key_salt, user_data, 6)?;
    let oe_value = cbc_encrypt_raw(&intermediate, &ZERO_IV, file_key)?;
    Ok((o_value, oe_value))
}

/// Algorithm 10: `/Perms`
pub(crate) fn r6_perms(file_key: &[u8], p: i32, encrypt_metadata: bool) -> PDFSecurityResult<Vec<u8>> {
    let mut block = Zeroizing::new([0u8; 16]);
    LittleEndian::write_u32(&mut block[..4], p as u32);
    block[4..8].copy_from_slice(&[0xFF; 4]);
    block[8] = if encrypt_metadata { b'T' } else { b'F' };
    block[9..12].copy_from_slice(b"adb");
    thread_rng().fill_bytes(&mut block[12..]);
    cbc_encrypt_raw(file_key, &ZERO_IV, &block[..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cbc_decrypt_raw;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_padding_of_empty_password() {
        assert_eq!(&pad_password(b"")[..], &PADDING[..]);
        let padded = pad_password(b"ab");
        assert_eq!(&padded[..2], b"ab");
        assert_eq!(&padded[2..], &PADDING[..30]);
    }

    #[rstest]
    #[case(2, 5, 5)]
    #[case(3, 16, 16)]
    #[case(4, 16, 16)]
    fn test_key_lengths(#[case] revision: i64, #[case] key_len: usize, #[case] expected: usize) {
        let key = compute_encryption_key(b"test", &[0u8; 32], -4, &[7u8; 16], revision, key_len, true);
        assert_eq!(key.len(), expected);
    }

    #[test]
    fn test_metadata_flag_changes_revision4_key() {
        let with = compute_encryption_key(b"pw", &[1u8; 32], -4, &[2u8; 16], 4, 16, true);
        let without = compute_encryption_key(b"pw", &[1u8; 32], -4, &[2u8; 16], 4, 16, false);
        assert_ne!(with, without);

        // Revision 3 ignores the flag
        let r3_with = compute_encryption_key(b"pw", &[1u8; 32], -4, &[2u8; 16], 3, 16, true);
        let r3_without = compute_encryption_key(b"pw", &[1u8; 32], -4, &[2u8; 16], 3, 16, false);
        assert_eq!(r3_with, r3_without);
    }

    #[test]
    fn test_o_value_recovers_padded_user_password() {
        let o_value = compute_o_value(b"owner", b"user", 3, 16).unwrap();
        assert_eq!(o_value.len(), 32);

        let key = owner_rc4_key(b"owner", 3, 16);
        let recovered = rc4_rounds(&key, &o_value, 3, true).unwrap();
        assert_eq!(&recovered[..], &pad_password(b"user")[..]);
    }

    #[test]
    fn test_u_value_layout() {
        let key = compute_encryption_key(b"user", &[0u8; 32], -4, &[9u8; 16], 3, 16, true);
        let u_value = compute_u_value(&key, &[9u8; 16], 3).unwrap();
        assert_eq!(u_value.len(), 32);
        assert_eq!(&u_value[16..], &[0u8; 16]);

        let r2 = compute_u_value(&key[..5], &[9u8; 16], 2).unwrap();
        assert_eq!(r2.len(), 32);
    }

    #[test]
    fn test_r6_values_unwrap_file_key() {
        let file_key = [0x42u8; 32];
        let (u_value, ue_value) = r6_user_values(b"user", &file_key).unwrap();
        assert_eq!(u_value.len(), 48);
        assert_eq!(ue_value.len(), 32);

        let hash = r6_hash(b"user", &u_value[32..40], &[], 6).unwrap();
        assert_eq!(&hash[..], &u_value[..32]);

        let intermediate = r6_hash(b"user", &u_value[40..48], &[], 6).unwrap();
        assert_eq!(cbc_decrypt_raw(&intermediate, &ZERO_IV, &ue_value).unwrap(), file_key);

        let (o_value, oe_value) = r6_owner_values(b"owner", &file_key, &u_value).unwrap();
        let intermediate = r6_hash(b"owner", &o_value[40..48], &u_value, 6).unwrap();
        assert_eq!(cbc_decrypt_raw(&intermediate, &ZERO_IV, &oe_value).unwrap(), file_key);
    }

    #[test]
    fn test_perms_block() {
        let file_key = [0x11u8; 32];
        let perms = r6_perms(&file_key, -3904, false).unwrap();
        let block = cbc_decrypt_raw(&file_key, &ZERO_IV, &perms).unwrap();
        assert_eq!(LittleEndian::read_u32(&block[..4]) as i32, -3904);
        assert_eq!(block[8], b'F');
        assert_eq!(&block[9..12], b"adb");
    }
}
