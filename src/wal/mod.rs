//! Write-Ahead Log (WAL) implementation.
//!
//! The WAL ensures durability by persisting all writes before they are applied
//! to the MemTable. This allows recovery from crashes by replaying the log.
//!
//! ## Architecture
//!
//! - **Blocks**: The file is a sequence of fixed-size blocks (32KB by default)
//! - **Record Format**: Each payload fragment is a record with a CRC32 checksum
//! - **Fragmentation**: Payloads that cross a block boundary are split into
//!   First/Middle/Last records
//! - **Recovery**: On startup, the WAL is replayed to restore the MemTable
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lsmcore::config::WalOptions;
//! use lsmcore::wal::WAL;
//!
//! # fn main() -> Result<(), lsmcore::Error> {
//! let options = WalOptions::default();
//!
//! // Writing to WAL
//! let mut wal = WAL::open("data.wal", &options)?;
//! wal.append(b"key1:value1")?;
//! wal.append(b"key2:value2")?;
//! wal.flush()?;
//!
//! // Reading from WAL
//! for entry in wal.replay()? {
//!     println!("Recovered: {:?}", entry?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::WALReader;
pub use record::{BlockDecoder, Record, RecordType};
pub use writer::WALWriter;

use crate::config::WalOptions;
use crate::error::Result;
use std::fs::OpenOptions;
use std::path::Path;

/// WAL manager that coordinates reading and writing
pub struct WAL {
    writer: WALWriter,
    options: WalOptions,
    /// Length the file was cut back to when it was opened
    truncated_at: Option<u64>,
}

impl WAL {
    /// Open or create a WAL file
    ///
    /// An existing file is scanned first. If it ends in a torn or corrupt
    /// record, it is truncated to the last valid record so new appends stay
    /// reachable on replay.
    pub fn open<P: AsRef<Path>>(path: P, options: &WalOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref();
        let truncated_at = if path.exists() { repair_tail(path, options.block_size)? } else { None };

        let writer = WALWriter::new(path, options.block_size)?;
        log::info!("Opened WAL {:?} ({} bytes)", writer.path(), writer.file_size());
        Ok(Self { writer, options: *options, truncated_at })
    }

    /// Offset the file was truncated to on open, if its tail was unrecoverable
    pub fn truncated_at(&self) -> Option<u64> {
        self.truncated_at
    }

    /// Append an entry to the WAL
    ///
    /// Returns the file offset where the entry's first record begins. The entry
    /// is durable after the next [`flush`](Self::flush), or immediately when
    /// `sync_on_append` is set.
    pub fn append(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.writer.append(data)?;
        if self.options.sync_on_append {
            self.writer.sync()?;
        }
        Ok(offset)
    }

    /// Flush buffered entries and fsync the WAL to disk
    pub fn flush(&mut self) -> Result<()> {
        self.writer.sync()
    }

    /// Replay every entry from the start of the file
    ///
    /// Each call opens a fresh reader at offset 0. Buffered appends are pushed
    /// to the file first so the reader sees them.
    pub fn replay(&mut self) -> Result<WALReader> {
        self.writer.flush_buffer()?;
        WALReader::new(self.writer.path(), self.options.block_size)
    }

    /// Get the current file size
    pub fn size(&self) -> u64 {
        self.writer.file_size()
    }

    /// Get the path to the WAL file
    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    /// Close the WAL
    pub fn close(self) -> Result<()> {
        self.writer.close()
    }

    /// Recover entries from a WAL file
    pub fn recover<P: AsRef<Path>>(path: P, options: &WalOptions) -> Result<Vec<Vec<u8>>> {
        let mut reader = WALReader::new(path, options.block_size)?;
        let entries = reader.recover_all()?;
        log::info!("Recovered {} entries from WAL", entries.len());
        Ok(entries)
    }
}

/// Cut `path` back to the end of its last valid record.
fn repair_tail(path: &Path, block_size: usize) -> Result<Option<u64>> {
    let mut reader = WALReader::new(path, block_size)?;
    for payload in reader.by_ref() {
        payload?;
    }

    let Some(offset) = reader.truncated_at() else {
        return Ok(None);
    };
    log::warn!("Truncating WAL {:?} to {} bytes", path, offset);
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(offset)?;
    file.sync_all()?;
    Ok(Some(offset))
}

/// Generate a WAL filename for a given sequence number
pub fn wal_filename(seq: u64) -> String {
    format!("{:06}.log", seq)
}

/// Parse a WAL filename to extract the sequence number
pub fn parse_wal_filename(filename: &str) -> Option<u64> {
    filename.strip_suffix(".log")?.parse().ok()
}
