//! Append-only write-ahead log with seeded checksums.
//!
//! # File Layout
//! ```text
//! ┌────────────────┬──────────┬──────────┬─────┐
//! │ header (4B)    │ record 0 │ record 1 │ ... │
//! └────────────────┴──────────┴──────────┴─────┘
//! ```
//!
//! The header is a big-endian i32: the running checksum folded over
//! every wrapped record in the file. Each record is:
//!
//! ```text
//! ┌──────────────┬───────────────┬─────────┐
//! │ length (u32) │ checksum (i32)│ payload │
//! └──────────────┴───────────────┴─────────┘
//! ```
//!
//! where `length` counts payload bytes only and `checksum` covers the
//! payload only. Both are big-endian.
//!
//! # Torn Tails
//! Appends write the record, then the header, then fsync once — so a
//! crash can leave (a) a partial record at the tail, or (b) a complete
//! record the header does not yet cover. `open` repairs both: partial
//! tails are truncated away, and in either case the header is rewritten
//! to the checksum of the records that survived. A header mismatch that
//! neither case explains is real corruption and fails the open.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::common::{Error, Result};

/// Multiplier for the running checksum.
const SEED: i32 = 13331;

/// Size of the file header (running checksum).
const HEADER_LEN: u64 = 4;

/// Record framing: 4-byte length + 4-byte checksum.
const OF_PAYLOAD: u64 = 8;

/// Fold `bytes` into a running checksum. Bytes are sign-extended, and
/// all arithmetic wraps.
fn fold(mut checksum: i32, bytes: &[u8]) -> i32 {
    for &b in bytes {
        checksum = checksum.wrapping_mul(SEED).wrapping_add(b as i8 as i32);
    }
    checksum
}

struct WalFile {
    file: File,
    /// File size in bytes; appends go here.
    size: u64,
    /// Running checksum over all wrapped records (the header value).
    checksum: i32,
    /// Sequential read cursor for [`Wal::next`].
    pos: u64,
}

impl WalFile {
    fn write_header(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.checksum.to_be_bytes())?;
        Ok(())
    }
}

/// The write-ahead log.
///
/// One mutex serializes appends and the sequential scan; the scan
/// cursor is only used during recovery and free-space rebuild, before
/// concurrent traffic starts.
pub struct Wal {
    inner: Mutex<WalFile>,
}

impl Wal {
    /// Create a fresh, empty log file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        file.write_all(&0i32.to_be_bytes())?;
        file.sync_all()?;

        Ok(Self {
            inner: Mutex::new(WalFile {
                file,
                size: HEADER_LEN,
                checksum: 0,
                pos: HEADER_LEN,
            }),
        })
    }

    /// Open an existing log file, validating and repairing the tail.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let size = file.metadata()?.len();
        if size < HEADER_LEN {
            return Err(Error::BadLogFile);
        }

        file.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; 4];
        file.read_exact(&mut header)?;
        let header = i32::from_be_bytes(header);

        // Walk the records, verifying each one's own checksum and
        // accumulating the running value. `prev` trails by one record
        // so a single uncovered trailing append can be recognized.
        let mut checksum = 0i32;
        let mut prev = 0i32;
        let mut pos = HEADER_LEN;
        loop {
            let Some(wrapped) = read_wrapped(&mut file, pos, size)? else {
                break;
            };
            prev = checksum;
            checksum = fold(checksum, &wrapped);
            pos += wrapped.len() as u64;
        }

        let mut inner = WalFile {
            file,
            size: pos,
            checksum,
            pos: HEADER_LEN,
        };

        if pos < size {
            // Torn tail: the per-record checksums are authoritative.
            tracing::warn!(
                dropped = size - pos,
                "discarding torn tail of write-ahead log"
            );
            inner.file.set_len(pos)?;
            inner.write_header()?;
            inner.file.sync_all()?;
        } else if checksum != header {
            if prev == header {
                // Clean tail, but the final append never reached the
                // header. The record verified, so keep it.
                tracing::warn!("repairing log header after interrupted append");
                inner.write_header()?;
                inner.file.sync_all()?;
            } else {
                return Err(Error::BadLogFile);
            }
        }

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Append a payload and fsync. On return the record is durable.
    pub fn log(&self, payload: &[u8]) -> Result<()> {
        let mut wrapped = Vec::with_capacity(OF_PAYLOAD as usize + payload.len());
        wrapped.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        wrapped.extend_from_slice(&fold(0, payload).to_be_bytes());
        wrapped.extend_from_slice(payload);

        let mut inner = self.inner.lock();
        let size = inner.size;
        inner.file.seek(SeekFrom::Start(size))?;
        inner.file.write_all(&wrapped)?;
        inner.size += wrapped.len() as u64;
        inner.checksum = fold(inner.checksum, &wrapped);
        inner.write_header()?;
        inner.file.sync_all()?;
        Ok(())
    }

    /// Reset the sequential cursor to the first record.
    pub fn rewind(&self) {
        self.inner.lock().pos = HEADER_LEN;
    }

    /// Read the next record's payload, or `None` at the end of the log.
    ///
    /// A record that fails its own checksum ends the scan: everything
    /// from there on is a tail that was never durably acknowledged.
    pub fn next(&self) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let pos = inner.pos;
        let size = inner.size;
        let Some(wrapped) = read_wrapped(&mut inner.file, pos, size)? else {
            return Ok(None);
        };
        inner.pos += wrapped.len() as u64;
        Ok(Some(wrapped[OF_PAYLOAD as usize..].to_vec()))
    }
}

/// Read and verify one wrapped record at `pos`. Returns `None` when the
/// record is truncated, fails its checksum, or `pos` is at end of file.
fn read_wrapped(file: &mut File, pos: u64, size: u64) -> Result<Option<Vec<u8>>> {
    if pos + OF_PAYLOAD > size {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(pos))?;
    let mut head = [0u8; OF_PAYLOAD as usize];
    file.read_exact(&mut head)?;

    let len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as u64;
    if pos + OF_PAYLOAD + len > size {
        return Ok(None);
    }

    let mut wrapped = vec![0u8; (OF_PAYLOAD + len) as usize];
    wrapped[..OF_PAYLOAD as usize].copy_from_slice(&head);
    file.read_exact(&mut wrapped[OF_PAYLOAD as usize..])?;

    let expected = i32::from_be_bytes([head[4], head[5], head[6], head[7]]);
    if fold(0, &wrapped[OF_PAYLOAD as usize..]) != expected {
        return Ok(None);
    }

    Ok(Some(wrapped))
}
