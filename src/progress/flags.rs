//! Save-mode flags consumed by the progressive engine

use bitflags::bitflags;

use crate::error::{PDFSecurityError, PDFSecurityResult};

bitflags! {
    /// How the sink should lay out the transformed document
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SaveFlags: u32 {
        /// Append changes after the original data
        const INCREMENTAL = 0x01;
        /// Do not carry original data into the output
        const NO_ORIGINAL = 0x02;
        /// Drop the encryption dictionary and write plain text
        const REMOVE_SECURITY = 0x04;
        /// Compress objects into object streams
        const OBJECT_STREAM = 0x08;
        /// Drop objects unreachable from the trailer
        const OPTIMIZE = 0x10;
        /// Write only the incremental section
        const INCREMENT_ONLY = 0x20;
    }
}

impl SaveFlags {
    /// Parse raw flag bits, rejecting undefined ones
    pub fn from_raw(bits: u32) -> PDFSecurityResult<Self> {
        Self::from_bits(bits).ok_or_else(|| {
            PDFSecurityError::invalid_param(format!("unknown save flags {:#x}", bits & !Self::all().bits()))
        })
    }

    /// Check the flags against the direction of the pass.
    ///
    /// Returns the effective flags: decryption always removes security.
    pub fn validate(self, encrypting: bool) -> PDFSecurityResult<Self> {
        let unknown = self.bits() & !Self::all().bits();
        if unknown != 0 {
            return Err(PDFSecurityError::invalid_param(format!(
                "unknown save flags {:#x}",
                unknown
            )));
        }

        if encrypting {
            if self.contains(Self::REMOVE_SECURITY) {
                return Err(PDFSecurityError::invalid_param(
                    "remove-security cannot be combined with encryption",
                ));
            }
            if self.contains(Self::INCREMENT_ONLY) {
                return Err(PDFSecurityError::invalid_param(
                    "increment-only cannot be combined with encryption",
                ));
            }
            Ok(self)
        } else {
            Ok(self | Self::REMOVE_SECURITY)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SaveFlags::empty())]
    #[case(SaveFlags::INCREMENTAL)]
    #[case(SaveFlags::NO_ORIGINAL | SaveFlags::OPTIMIZE)]
    #[case(SaveFlags::OBJECT_STREAM)]
    fn test_encrypt_accepts(#[case] flags: SaveFlags) {
        assert_eq!(flags.validate(true).unwrap(), flags);
    }

    #[rstest]
    #[case(SaveFlags::REMOVE_SECURITY)]
    #[case(SaveFlags::INCREMENT_ONLY)]
    #[case(SaveFlags::REMOVE_SECURITY | SaveFlags::OPTIMIZE)]
    #[case(SaveFlags::from_bits_retain(0x100))]
    fn test_encrypt_rejects(#[case] flags: SaveFlags) {
        assert!(matches!(
            flags.validate(true),
            Err(PDFSecurityError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_decrypt_implies_remove_security() {
        let flags = SaveFlags::OPTIMIZE.validate(false).unwrap();
        assert!(flags.contains(SaveFlags::REMOVE_SECURITY | SaveFlags::OPTIMIZE));
    }

    #[test]
    fn test_from_raw() {
        assert_eq!(SaveFlags::from_raw(0x14).unwrap(), SaveFlags::REMOVE_SECURITY | SaveFlags::OPTIMIZE);
        assert!(SaveFlags::from_raw(0x40).is_err());
    }
}
