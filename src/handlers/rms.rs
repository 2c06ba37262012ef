//! Microsoft RMS conventions over the custom handler path

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{PDFSecurityError, PDFSecurityResult};
use crate::pdf::{Dictionary, Object};

/// Parameters of an RMS encryption pass.
///
/// The license and EUL fields hold the Flate+Base64 form produced by
/// [`encode_rms_blob`].
#[derive(Debug, Clone)]
pub struct RmsParams {
    pub publish_license: Vec<u8>,
    /// `(ServerID, ServerEUL)` pairs
    pub server_eul_list: Vec<(Vec<u8>, Vec<u8>)>,
    pub irm_version: i32,
    pub encrypt_metadata: bool,
}

impl RmsParams {
    pub fn new(publish_license: impl Into<Vec<u8>>) -> Self {
        Self {
            publish_license: publish_license.into(),
            server_eul_list: Vec::new(),
            irm_version: 1,
            encrypt_metadata: true,
        }
    }

    pub fn with_server_eul(mut self, server_id: impl Into<Vec<u8>>, server_eul: impl Into<Vec<u8>>) -> Self {
        self.server_eul_list.push((server_id.into(), server_eul.into()));
        self
    }

    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    pub(crate) fn validate(&self) -> PDFSecurityResult<()> {
        if self.publish_license.is_empty() {
            return Err(PDFSecurityError::invalid_param("empty RMS publishing license"));
        }
        if self.server_eul_list.iter().any(|(id, eul)| id.is_empty() || eul.is_empty()) {
            return Err(PDFSecurityError::invalid_param("incomplete server EUL pair"));
        }
        Ok(())
    }

    /// Entries of the encryption dictionary owned by the RMS convention
    pub(crate) fn write_entries(&self, dict: &mut Dictionary) {
        dict.set("PublishLicense", Object::string(self.publish_license.clone()));
        dict.set("IRMVersion", self.irm_version);
        if !self.server_eul_list.is_empty() {
            let list: Vec<Object> = self
                .server_eul_list
                .iter()
                .map(|(id, eul)| {
                    let mut pair = Dictionary::new();
                    pair.set("ServerID", Object::string(id.clone()));
                    pair.set("ServerEUL", Object::string(eul.clone()));
                    Object::from(pair)
                })
                .collect();
            dict.set("ServerEULList", list);
        }
    }
}

/// Publishing license recorded in an RMS encryption dictionary
pub(crate) fn rms_license(dict: &Dictionary) -> Option<&[u8]> {
    dict.get_string("PublishLicense")
}

/// Flate-compress then Base64-encode a license or EUL
pub fn encode_rms_blob(raw: &[u8]) -> PDFSecurityResult<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    Ok(STANDARD.encode(encoder.finish()?))
}

/// Inverse of [`encode_rms_blob`]
pub fn decode_rms_blob(encoded: &[u8]) -> PDFSecurityResult<Vec<u8>> {
    let compressed = STANDARD.decode(encoded)?;
    let mut raw = Vec::new();
    ZlibDecoder::new(&compressed[..])
        .read_to_end(&mut raw)
        .map_err(|err| PDFSecurityError::invalid_param(format!("RMS blob: {}", err)))?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_round_trip() {
        let license = b"<XrML>publishing license</XrML>".repeat(8);
        let encoded = encode_rms_blob(&license).unwrap();
        assert!(encoded.is_ascii());
        assert_eq!(decode_rms_blob(encoded.as_bytes()).unwrap(), license);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_rms_blob(b"!!not base64"), Err(PDFSecurityError::InvalidParameter(_))));
        let not_zlib = STANDARD.encode(b"plain");
        assert!(matches!(decode_rms_blob(not_zlib.as_bytes()), Err(PDFSecurityError::InvalidParameter(_))));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(RmsParams::new(Vec::new()).validate(), Err(PDFSecurityError::InvalidParameter(_))));
        assert!(RmsParams::new(b"PL".to_vec()).validate().is_ok());
        assert!(RmsParams::new(b"PL".to_vec())
            .with_server_eul(b"id".to_vec(), Vec::new())
            .validate()
            .is_err());
    }

    #[test]
    fn test_entries() {
        let params = RmsParams::new(b"PL".to_vec()).with_server_eul(b"id".to_vec(), b"eul".to_vec());
        let mut dict = Dictionary::new();
        params.write_entries(&mut dict);

        assert_eq!(rms_license(&dict), Some(&b"PL"[..]));
        assert_eq!(dict.get_integer("IRMVersion"), Some(1));
        let list = dict.get_array("ServerEULList").unwrap();
        assert_eq!(list[0].as_dict().and_then(|d| d.get_string("ServerEUL")), Some(&b"eul"[..]));
    }
}
