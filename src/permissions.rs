//! Document permission flags (PDF Reference Table 3.20 layout)

use std::fmt;

/// PDF permissions flags
///
/// The value held here only ever carries the eight right bits; the reserved
/// bits of the `/P` entry are applied by [`PDFPermissions::to_p_value`] and
/// stripped by [`PDFPermissions::from_p_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PDFPermissions(u32);

impl PDFPermissions {
    /// No permissions
    pub const NONE: u32 = 0;
    /// Print the document (bit 3)
    pub const PRINT: u32 = 1 << 2;
    /// Modify the document contents (bit 4)
    pub const MODIFY: u32 = 1 << 3;
    /// Copy or extract text and graphics (bit 5)
    pub const EXTRACT: u32 = 1 << 4;
    /// Add or modify annotations, fill form fields (bit 6)
    pub const ANNOT_FORM: u32 = 1 << 5;
    /// Fill existing form fields only (bit 9)
    pub const FILL_FORM: u32 = 1 << 8;
    /// Extract text and graphics for accessibility (bit 10)
    pub const EXTRACT_ACCESS: u32 = 1 << 9;
    /// Assemble the document (bit 11)
    pub const ASSEMBLE: u32 = 1 << 10;
    /// Print in high quality (bit 12)
    pub const PRINT_HIGH: u32 = 1 << 11;
    /// All permissions
    pub const ALL: u32 = 0x0F3C;

    /// Bits 7-8 and 13-32 of `/P`, always set in the file
    pub const RESERVED_SET: u32 = 0xFFFF_F0C0;

    /// Create new permissions from raw bits, dropping reserved bits
    pub fn new(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    /// Every right granted
    pub fn all() -> Self {
        Self(Self::ALL)
    }

    /// Get raw permission bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Check if specific permission is granted
    pub fn has_permission(&self, permission: u32) -> bool {
        (self.0 & permission) == permission
    }

    /// Rights granted by both masks
    pub fn intersect(self, other: PDFPermissions) -> Self {
        Self(self.0 & other.0)
    }

    /// True when no right in `self` is missing from `other`
    pub fn is_subset_of(&self, other: PDFPermissions) -> bool {
        self.0 & !other.0 == 0
    }

    /// Signed `/P` value as stored in the encryption dictionary
    pub fn to_p_value(self) -> i32 {
        (self.0 | Self::RESERVED_SET) as i32
    }

    /// Rights carried by a `/P` value
    pub fn from_p_value(p: i32) -> Self {
        Self::new(p as u32)
    }
}

impl fmt::Display for PDFPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl From<u32> for PDFPermissions {
    fn from(bits: u32) -> Self {
        Self::new(bits)
    }
}
