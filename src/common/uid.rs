//! Record and transaction identifiers.

use std::fmt;

/// Identifies a stored record by its physical location.
///
/// A `Uid` packs a page number and an in-page offset into one u64:
///
/// ```text
/// ┌──────────────┬──────────────┬──────────────┐
/// │ page_no      │ (unused)     │ offset       │
/// │ bits 32..64  │ bits 16..32  │ bits 0..16   │
/// └──────────────┴──────────────┴──────────────┘
/// ```
///
/// Page numbers are 1-based; page 1 is the metadata page and never
/// holds records, so a `Uid` with `page_no == 0` cannot be valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub u64);

impl Uid {
    /// Pack a page number and in-page offset into a `Uid`.
    #[inline]
    pub fn new(page_no: u32, offset: u16) -> Self {
        Self(((page_no as u64) << 32) | offset as u64)
    }

    /// The page number this record lives on.
    #[inline]
    pub fn page_no(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The byte offset of the record within its page.
    #[inline]
    pub fn offset(self) -> u16 {
        self.0 as u16
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({}:{})", self.page_no(), self.offset())
    }
}

/// A transaction identifier.
///
/// Xids are assigned by the transaction table, starting at 1 and
/// strictly increasing. [`SUPER_XID`] (0) is the implicit bootstrap
/// transaction: always considered committed, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Xid(pub u64);

/// The implicit always-committed transaction.
pub const SUPER_XID: Xid = Xid(0);

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
