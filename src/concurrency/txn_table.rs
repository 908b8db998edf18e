//! Durable transaction status table.
//!
//! # File Layout
//! ```text
//! ┌──────────────────┬──────────┬──────────┬─────┐
//! │ xid counter (u64)│ status 1 │ status 2 │ ... │
//! └──────────────────┴──────────┴──────────┴─────┘
//! ```
//!
//! The header is the number of transactions ever begun, big-endian.
//! One status byte follows per xid, in order: xid N lives at byte
//! `8 + (N-1)`. Status transitions are one-way: active → committed or
//! active → aborted, each fsynced before the call returns.
//!
//! Xid 0 ([`SUPER_XID`]) is the implicit bootstrap transaction: always
//! committed, never stored.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::common::{Error, Result, Xid, SUPER_XID};

const HEADER_LEN: u64 = 8;

const STATUS_ACTIVE: u8 = 0;
const STATUS_COMMITTED: u8 = 1;
const STATUS_ABORTED: u8 = 2;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Committed,
    Aborted,
}

struct TableFile {
    file: File,
    /// Number of transactions ever begun; next xid is `counter + 1`.
    counter: u64,
}

impl TableFile {
    fn write_status(&mut self, xid: Xid, status: u8) -> Result<()> {
        self.file.seek(SeekFrom::Start(HEADER_LEN + xid.0 - 1))?;
        self.file.write_all(&[status])?;
        self.file.sync_all()?;
        Ok(())
    }

    fn read_status(&mut self, xid: Xid) -> Result<u8> {
        self.file.seek(SeekFrom::Start(HEADER_LEN + xid.0 - 1))?;
        let mut buf = [0u8];
        self.file.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn write_counter(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.counter.to_be_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// The transaction status table.
pub struct TxnTable {
    inner: Mutex<TableFile>,
}

impl TxnTable {
    /// Create a fresh table with zero transactions.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        file.write_all(&0u64.to_be_bytes())?;
        file.sync_all()?;

        Ok(Self {
            inner: Mutex::new(TableFile { file, counter: 0 }),
        })
    }

    /// Open an existing table, validating length against the counter.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let size = file.metadata()?.len();
        if size < HEADER_LEN {
            return Err(Error::BadXidFile);
        }

        file.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let counter = u64::from_be_bytes(header);

        if size != HEADER_LEN + counter {
            return Err(Error::BadXidFile);
        }

        Ok(Self {
            inner: Mutex::new(TableFile { file, counter }),
        })
    }

    /// Begin a new transaction: durably mark it active, then bump the
    /// counter. Each write is fsynced on its own.
    pub fn begin(&self) -> Result<Xid> {
        let mut inner = self.inner.lock();
        let xid = Xid(inner.counter + 1);
        inner.write_status(xid, STATUS_ACTIVE)?;
        inner.counter += 1;
        inner.write_counter()?;
        Ok(xid)
    }

    pub fn commit(&self, xid: Xid) -> Result<()> {
        if xid == SUPER_XID {
            return Ok(());
        }
        self.inner.lock().write_status(xid, STATUS_COMMITTED)
    }

    pub fn abort(&self, xid: Xid) -> Result<()> {
        if xid == SUPER_XID {
            return Ok(());
        }
        self.inner.lock().write_status(xid, STATUS_ABORTED)
    }

    /// Current status of `xid`. [`SUPER_XID`] is always committed.
    pub fn status(&self, xid: Xid) -> Result<TxnStatus> {
        if xid == SUPER_XID {
            return Ok(TxnStatus::Committed);
        }
        match self.inner.lock().read_status(xid)? {
            STATUS_ACTIVE => Ok(TxnStatus::Active),
            STATUS_COMMITTED => Ok(TxnStatus::Committed),
            _ => Ok(TxnStatus::Aborted),
        }
    }

    pub fn is_active(&self, xid: Xid) -> Result<bool> {
        Ok(self.status(xid)? == TxnStatus::Active)
    }

    pub fn is_committed(&self, xid: Xid) -> Result<bool> {
        Ok(self.status(xid)? == TxnStatus::Committed)
    }

    pub fn is_aborted(&self, xid: Xid) -> Result<bool> {
        Ok(self.status(xid)? == TxnStatus::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_begin_assigns_increasing_xids() {
        let dir = tempdir().unwrap();
        let table = TxnTable::create(dir.path().join("test.xid")).unwrap();

        assert_eq!(table.begin().unwrap(), Xid(1));
        assert_eq!(table.begin().unwrap(), Xid(2));
        assert_eq!(table.begin().unwrap(), Xid(3));
    }

    #[test]
    fn test_status_transitions() {
        let dir = tempdir().unwrap();
        let table = TxnTable::create(dir.path().join("test.xid")).unwrap();

        let a = table.begin().unwrap();
        let b = table.begin().unwrap();
        assert!(table.is_active(a).unwrap());

        table.commit(a).unwrap();
        table.abort(b).unwrap();

        assert!(table.is_committed(a).unwrap());
        assert!(!table.is_active(a).unwrap());
        assert!(table.is_aborted(b).unwrap());
    }

    #[test]
    fn test_super_xid_always_committed() {
        let dir = tempdir().unwrap();
        let table = TxnTable::create(dir.path().join("test.xid")).unwrap();

        assert!(table.is_committed(SUPER_XID).unwrap());
        assert!(!table.is_active(SUPER_XID).unwrap());
        assert!(!table.is_aborted(SUPER_XID).unwrap());
    }

    #[test]
    fn test_status_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.xid");

        let (a, b) = {
            let table = TxnTable::create(&path).unwrap();
            let a = table.begin().unwrap();
            let b = table.begin().unwrap();
            table.commit(a).unwrap();
            (a, b)
        };

        let table = TxnTable::open(&path).unwrap();
        assert!(table.is_committed(a).unwrap());
        assert!(table.is_active(b).unwrap());
        assert_eq!(table.begin().unwrap(), Xid(3));
    }

    #[test]
    fn test_length_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.xid");

        {
            let table = TxnTable::create(&path).unwrap();
            table.begin().unwrap();
        }

        // Tack on a stray status byte the counter does not cover.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0]).unwrap();
        drop(file);

        assert!(matches!(TxnTable::open(&path), Err(Error::BadXidFile)));
    }

    #[test]
    fn test_truncated_header_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.xid");

        std::fs::write(&path, [0u8; 3]).unwrap();
        assert!(matches!(TxnTable::open(&path), Err(Error::BadXidFile)));
    }
}
