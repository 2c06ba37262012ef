//! String and stream payload traversal of indirect objects

use super::{DecryptSession, EncryptSession, EncryptionContext};
use crate::error::PDFSecurityResult;
use crate::pdf::{Object, ObjectId};

/// Apply `f` to every string nested in `object`, stream dictionaries
/// included. Stream data is left to the caller. Returns the number of
/// string bytes visited.
pub(crate) fn transform_strings<F>(object: &mut Object, f: &mut F) -> PDFSecurityResult<usize>
where
    F: FnMut(&[u8]) -> PDFSecurityResult<Vec<u8>>,
{
    match object {
        Object::String(bytes) => {
            let len = bytes.len();
            *bytes = f(bytes)?;
            Ok(len)
        }
        Object::Array(items) => {
            let mut total = 0;
            for item in items.iter_mut() {
                total += transform_strings(item, f)?;
            }
            Ok(total)
        }
        Object::Dictionary(dict) => {
            let mut total = 0;
            for value in dict.values_mut() {
                total += transform_strings(value, f)?;
            }
            Ok(total)
        }
        Object::Stream(stream) => {
            let mut total = 0;
            for value in stream.dict_mut().values_mut() {
                total += transform_strings(value, f)?;
            }
            Ok(total)
        }
        _ => Ok(0),
    }
}

/// Encrypt one payload of `id` in its own session
pub(crate) fn encrypt_payload(context: &EncryptionContext, id: ObjectId, data: &[u8]) -> PDFSecurityResult<Vec<u8>> {
    EncryptSession::with_context(context, id)?.encrypt(data)
}

/// Decrypt one whole payload of `id` in its own session
pub(crate) fn decrypt_payload(context: &mut EncryptionContext, id: ObjectId, data: &[u8]) -> PDFSecurityResult<Vec<u8>> {
    let mut session = DecryptSession::open(context, id.number, id.generation)?;
    let mut out = session.feed(data)?;
    out.extend(session.finish()?);
    Ok(out)
}
