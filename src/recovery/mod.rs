//! Write-ahead logging and crash recovery.

pub mod log_record;
pub mod recover;
pub mod wal;

pub use log_record::LogRecord;
pub use recover::recover;
pub use wal::Wal;
