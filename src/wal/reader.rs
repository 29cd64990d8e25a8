//! WAL reader implementation for recovery.

use super::record::{BlockDecoder, Record, RecordType};
use crate::config::WalOptions;
use crate::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// WAL reader for replaying a log file from its first block
///
/// The reader is an iterator over reassembled payloads. A checksum failure, a
/// malformed header or a torn trailing record ends iteration without an error:
/// everything yielded before that point was fully and validly written, and
/// [`truncated_at`](Self::truncated_at) reports where the valid log ends. I/O
/// errors are yielded as `Err` and also end iteration.
pub struct WALReader {
    path: PathBuf,
    file: File,
    block_size: usize,
    /// Bytes of the block currently being decoded
    block: Vec<u8>,
    /// File offset of `block[0]`
    block_start: u64,
    /// Decode cursor within `block`
    block_pos: usize,
    truncated_at: Option<u64>,
    finished: bool,
}

impl WALReader {
    /// Open a WAL file for reading
    pub fn new<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        WalOptions::new().block_size(block_size).validate()?;
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        Ok(Self {
            path,
            file,
            block_size,
            block: Vec::with_capacity(block_size),
            block_start: 0,
            block_pos: 0,
            truncated_at: None,
            finished: false,
        })
    }

    /// Read the next complete payload from the WAL
    ///
    /// Returns None if EOF is reached.
    /// Handles fragmented records by reassembling them.
    pub fn read_next(&mut self) -> Result<Option<Vec<u8>>> {
        let mut assembled_data = Vec::new();
        let mut span_start: Option<u64> = None;

        loop {
            let (record, offset) = match self.read_record() {
                Ok(Some(r)) => r,
                Ok(None) => {
                    // EOF reached
                    if let Some(start) = span_start {
                        self.truncated_at = Some(start);
                        return Err(Error::corruption("EOF while expecting continuation record"));
                    }
                    return Ok(None);
                }
                Err(e) => {
                    if e.is_corruption() {
                        self.truncated_at = Some(span_start.unwrap_or_else(|| self.offset()));
                    }
                    return Err(e);
                }
            };

            let unexpected = |what: &str| {
                Err(Error::Corruption(format!("{} at offset {}", what, offset)))
            };

            match record.record_type {
                RecordType::Full => {
                    if span_start.is_some() {
                        self.truncated_at = span_start;
                        return unexpected("Unexpected Full record while expecting continuation");
                    }
                    return Ok(Some(record.payload));
                }
                RecordType::First => {
                    if span_start.is_some() {
                        self.truncated_at = span_start;
                        return unexpected("Unexpected First record while expecting continuation");
                    }
                    assembled_data = record.payload;
                    span_start = Some(offset);
                }
                RecordType::Middle => {
                    if span_start.is_none() {
                        self.truncated_at = Some(offset);
                        return unexpected("Unexpected Middle record without First");
                    }
                    assembled_data.extend_from_slice(&record.payload);
                }
                RecordType::Last => {
                    if span_start.is_none() {
                        self.truncated_at = Some(offset);
                        return unexpected("Unexpected Last record without First");
                    }
                    assembled_data.extend_from_slice(&record.payload);
                    return Ok(Some(assembled_data));
                }
            }
        }
    }

    /// Read a single record and the file offset it starts at
    fn read_record(&mut self) -> Result<Option<(Record, u64)>> {
        loop {
            if self.block_pos < self.block.len() {
                let mut decoder = BlockDecoder::with_position(&self.block, self.block_pos);
                match decoder.next() {
                    Some(Ok((record, consumed))) => {
                        let offset = self.offset();
                        self.block_pos += consumed;
                        return Ok(Some((record, offset)));
                    }
                    Some(Err(e)) => return Err(e),
                    None if self.block.len() < self.block_size => {
                        // Leftover bytes in the final, partially written block
                        return Err(Error::Corruption(format!(
                            "Truncated record at offset {}",
                            self.offset()
                        )));
                    }
                    // Padding fills the rest of this block
                    None => {}
                }
            }

            if !self.load_next_block()? {
                return Ok(None);
            }
        }
    }

    /// Replace the current block with the next one; false at EOF.
    fn load_next_block(&mut self) -> Result<bool> {
        self.block_start += self.block.len() as u64;
        self.block_pos = 0;
        self.block.clear();
        (&mut self.file).take(self.block_size as u64).read_to_end(&mut self.block)?;
        Ok(!self.block.is_empty())
    }

    /// File offset of the next record to be read
    pub fn offset(&self) -> u64 {
        self.block_start + self.block_pos as u64
    }

    /// File offset where the valid log ends, if replay stopped early.
    ///
    /// `None` until iteration hits corruption or a torn tail. Truncating the
    /// file to this length discards exactly the unrecoverable suffix.
    pub fn truncated_at(&self) -> Option<u64> {
        self.truncated_at
    }

    /// Recover all entries from the WAL
    ///
    /// Returns a vector of all valid entries. Stops on first corruption.
    pub fn recover_all(&mut self) -> Result<Vec<Vec<u8>>> {
        self.by_ref().collect()
    }
}

impl Iterator for WALReader {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next() {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) if e.is_corruption() => {
                // Recover up to the last valid payload
                log::warn!(
                    "WAL {:?} ends at offset {}: {}",
                    self.path,
                    self.truncated_at.unwrap_or_else(|| self.offset()),
                    e
                );
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
