//! Logical log record codec.
//!
//! Two record kinds are logged, both big-endian:
//!
//! ```text
//! Insert:  ┌─────────┬──────────┬─────────────┬─────────────┬─────┐
//!          │ type=0  │ xid (u64)│ page_no(u32)│ offset (u16)│ raw │
//!          └─────────┴──────────┴─────────────┴─────────────┴─────┘
//!
//! Update:  ┌─────────┬──────────┬──────────┬─────────┬─────────┐
//!          │ type=1  │ xid (u64)│ uid (u64)│ old raw │ new raw │
//!          └─────────┴──────────┴──────────┴─────────┴─────────┘
//! ```
//!
//! An update's before and after images are the same record rewritten in
//! place, so they are always the same length: the remainder of the
//! payload splits exactly in half.

use crate::common::{Uid, Xid};

const TYPE_INSERT: u8 = 0;
const TYPE_UPDATE: u8 = 1;

/// Fixed prefix of an insert record: type + xid + page_no + offset.
const INSERT_HEADER: usize = 1 + 8 + 4 + 2;

/// Fixed prefix of an update record: type + xid + uid.
const UPDATE_HEADER: usize = 1 + 8 + 8;

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Insert {
        xid: Xid,
        page_no: u32,
        offset: u16,
        raw: Vec<u8>,
    },
    Update {
        xid: Xid,
        uid: Uid,
        old: Vec<u8>,
        new: Vec<u8>,
    },
}

impl LogRecord {
    pub fn xid(&self) -> Xid {
        match self {
            LogRecord::Insert { xid, .. } | LogRecord::Update { xid, .. } => *xid,
        }
    }

    /// The page this record touches.
    pub fn page_no(&self) -> u32 {
        match self {
            LogRecord::Insert { page_no, .. } => *page_no,
            LogRecord::Update { uid, .. } => uid.page_no(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            LogRecord::Insert {
                xid,
                page_no,
                offset,
                raw,
            } => {
                let mut buf = Vec::with_capacity(INSERT_HEADER + raw.len());
                buf.push(TYPE_INSERT);
                buf.extend_from_slice(&xid.0.to_be_bytes());
                buf.extend_from_slice(&page_no.to_be_bytes());
                buf.extend_from_slice(&offset.to_be_bytes());
                buf.extend_from_slice(raw);
                buf
            }
            LogRecord::Update { xid, uid, old, new } => {
                let mut buf = Vec::with_capacity(UPDATE_HEADER + old.len() + new.len());
                buf.push(TYPE_UPDATE);
                buf.extend_from_slice(&xid.0.to_be_bytes());
                buf.extend_from_slice(&uid.0.to_be_bytes());
                buf.extend_from_slice(old);
                buf.extend_from_slice(new);
                buf
            }
        }
    }

    /// Decode a payload, or `None` if it is malformed.
    pub fn decode(payload: &[u8]) -> Option<LogRecord> {
        match *payload.first()? {
            TYPE_INSERT => {
                if payload.len() < INSERT_HEADER {
                    return None;
                }
                let xid = Xid(u64::from_be_bytes(payload[1..9].try_into().ok()?));
                let page_no = u32::from_be_bytes(payload[9..13].try_into().ok()?);
                let offset = u16::from_be_bytes(payload[13..15].try_into().ok()?);
                Some(LogRecord::Insert {
                    xid,
                    page_no,
                    offset,
                    raw: payload[INSERT_HEADER..].to_vec(),
                })
            }
            TYPE_UPDATE => {
                if payload.len() < UPDATE_HEADER
                    || (payload.len() - UPDATE_HEADER) % 2 != 0
                {
                    return None;
                }
                let xid = Xid(u64::from_be_bytes(payload[1..9].try_into().ok()?));
                let uid = Uid(u64::from_be_bytes(payload[9..17].try_into().ok()?));
                let half = (payload.len() - UPDATE_HEADER) / 2;
                Some(LogRecord::Update {
                    xid,
                    uid,
                    old: payload[UPDATE_HEADER..UPDATE_HEADER + half].to_vec(),
                    new: payload[UPDATE_HEADER + half..].to_vec(),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_codec() {
        let rec = LogRecord::Insert {
            xid: Xid(9),
            page_no: 3,
            offset: 77,
            raw: b"payload".to_vec(),
        };
        let encoded = rec.encode();
        assert_eq!(encoded[0], TYPE_INSERT);
        assert_eq!(LogRecord::decode(&encoded), Some(rec.clone()));
        assert_eq!(rec.page_no(), 3);
        assert_eq!(rec.xid(), Xid(9));
    }

    #[test]
    fn test_update_codec() {
        let rec = LogRecord::Update {
            xid: Xid(4),
            uid: Uid::new(8, 120),
            old: b"before".to_vec(),
            new: b"after!".to_vec(),
        };
        let encoded = rec.encode();
        assert_eq!(encoded[0], TYPE_UPDATE);
        assert_eq!(LogRecord::decode(&encoded), Some(rec.clone()));
        assert_eq!(rec.page_no(), 8);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(LogRecord::decode(&[]), None);
        assert_eq!(LogRecord::decode(&[99]), None);
        // Insert header cut short.
        assert_eq!(LogRecord::decode(&[TYPE_INSERT, 0, 0]), None);
        // Update with odd image length.
        let mut buf = vec![TYPE_UPDATE];
        buf.extend_from_slice(&[0u8; 16]);
        buf.push(1);
        assert_eq!(LogRecord::decode(&buf), None);
    }

    #[test]
    fn test_empty_insert_raw() {
        let rec = LogRecord::Insert {
            xid: Xid(1),
            page_no: 2,
            offset: 2,
            raw: Vec::new(),
        };
        assert_eq!(LogRecord::decode(&rec.encode()), Some(rec));
    }
}
