//! WAL writer implementation.

use super::record::{fragment, padding_len, HEADER_SIZE};
use crate::config::WalOptions;
use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// WAL writer for appending payloads to the log file
///
/// The writer is not internally synchronized; concurrent appenders must share
/// it behind a mutex.
pub struct WALWriter {
    /// Path to the WAL file
    path: PathBuf,
    /// Buffered writer for efficient I/O
    writer: BufWriter<File>,
    /// Current file size, including bytes still in the buffer
    file_size: u64,
    /// Size of one log block
    block_size: usize,
    /// Write cursor within the current block
    block_offset: usize,
}

impl WALWriter {
    /// Create a new WAL writer
    ///
    /// Opens the WAL file in append mode, creating it if it doesn't exist.
    /// When the file already holds data, the block cursor resumes where the
    /// last block left off.
    pub fn new<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        WalOptions::new().block_size(block_size).validate()?;
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let file_size = file.metadata()?.len();
        let block_offset = (file_size % block_size as u64) as usize;
        let writer = BufWriter::new(file);

        Ok(Self { path, writer, file_size, block_size, block_offset })
    }

    /// Append a payload to the WAL
    ///
    /// Returns the file offset of the payload's first record header. Payloads
    /// that do not fit the rest of the current block are split across blocks.
    /// The bytes are buffered until [`sync`](Self::sync) is called.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        let padding = padding_len(self.block_offset, self.block_size);
        if padding > 0 {
            log::trace!("Padding {} bytes at end of block in {:?}", padding, self.path);
            self.writer.write_all(&[0u8; HEADER_SIZE][..padding])?;
            self.advance(padding);
        }

        let offset = self.file_size;
        let records = fragment(payload, self.block_size - self.block_offset, self.block_size);
        if records.len() > 1 {
            log::debug!(
                "Payload of {} bytes at offset {} spans {} records",
                payload.len(),
                offset,
                records.len()
            );
        }

        for record in &records {
            let encoded = record.encode();
            self.writer.write_all(&encoded)?;
            self.advance(encoded.len());
        }

        Ok(offset)
    }

    fn advance(&mut self, written: usize) {
        self.file_size += written as u64;
        self.block_offset = (self.block_offset + written) % self.block_size;
    }

    /// Push buffered bytes to the operating system without fsync.
    pub fn flush_buffer(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Sync the WAL to disk
    ///
    /// Ensures all buffered data is written and fsync'd to persistent storage.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Get the current file size
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Get the block size this writer frames records into
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Get the write cursor within the current block
    pub fn block_offset(&self) -> usize {
        self.block_offset
    }

    /// Get the path to the WAL file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the writer, flushing all data
    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}

impl Drop for WALWriter {
    fn drop(&mut self) {
        // Best effort flush on drop
        let _ = self.writer.flush();
    }
}
