//! Encryption contexts, per-object sessions and Standard key algorithms

mod authentication;
mod context;
mod key_derivation;
mod object_encryption;
mod session;

pub use context::EncryptionContext;
pub use session::{DecryptSession, EncryptSession};

pub(crate) use authentication::{authenticate_owner, authenticate_user, constant_time_eq, StandardEntries};
pub(crate) use key_derivation::{
    compute_encryption_key, compute_o_value, compute_u_value, r6_owner_values, r6_perms,
    r6_user_values,
};
pub(crate) use object_encryption::{decrypt_payload, encrypt_payload, transform_strings};
