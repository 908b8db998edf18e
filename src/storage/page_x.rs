//! Layout of record pages (page 2 onward).
//!
//! A record page is an append-only slotted page:
//!
//! ```text
//! Offset  Size          Field
//! 0       2             free-space offset (FSO), big-endian u16
//! 2       FSO-2         record data, packed back to back
//! FSO     PAGE_SIZE-FSO free space
//! ```
//!
//! Records are never moved or compacted; deletion is logical (a record
//! marks itself invalid) so offsets stay stable for the lifetime of
//! the database.

use crate::common::config::PAGE_SIZE;
use crate::storage::page::Page;

/// First usable byte, right after the FSO field.
pub const OF_DATA: u16 = 2;

/// The most free space a record page can ever report.
pub const MAX_FREE_SPACE: usize = PAGE_SIZE - OF_DATA as usize;

/// Initial image of an empty record page: FSO pointing at [`OF_DATA`].
pub fn init_raw() -> Vec<u8> {
    OF_DATA.to_be_bytes().to_vec()
}

/// Current free-space offset of the page.
pub fn fso(page: &Page) -> u16 {
    let data = page.read();
    u16::from_be_bytes([data[0], data[1]])
}

fn set_fso(data: &mut [u8], fso: u16) {
    data[0..2].copy_from_slice(&fso.to_be_bytes());
}

/// Append a record, returning its in-page offset.
///
/// The caller is responsible for checking free space first (via the
/// free-space index); this always writes.
pub fn insert(page: &Page, raw: &[u8]) -> u16 {
    page.mark_dirty();
    let mut data = page.write();
    let offset = u16::from_be_bytes([data[0], data[1]]);
    data[offset as usize..offset as usize + raw.len()].copy_from_slice(raw);
    set_fso(&mut data[..], offset + raw.len() as u16);
    offset
}

/// Bytes still free on the page.
pub fn free_space(page: &Page) -> usize {
    PAGE_SIZE - fso(page) as usize
}

/// Redo/undo an insert: write the record image at its logged offset
/// and advance the FSO if the write extends past it.
///
/// The FSO only ever moves forward here; replaying records in log
/// order leaves it at the high-water mark no matter how many records
/// on the page are replayed.
pub fn recover_insert(page: &Page, raw: &[u8], offset: u16) {
    page.mark_dirty();
    let mut data = page.write();
    data[offset as usize..offset as usize + raw.len()].copy_from_slice(raw);

    let end = offset + raw.len() as u16;
    let fso = u16::from_be_bytes([data[0], data[1]]);
    if fso < end {
        set_fso(&mut data[..], end);
    }
}

/// Redo/undo an update: write the record image in place. The FSO is
/// untouched since the record already existed.
pub fn recover_update(page: &Page, raw: &[u8], offset: u16) {
    page.mark_dirty();
    let mut data = page.write();
    data[offset as usize..offset as usize + raw.len()].copy_from_slice(raw);
}
