//! WAL record and block format.
//!
//! A log file is a sequence of fixed-size blocks. Each block holds zero or
//! more records; each record consists of:
//! - Checksum (4 bytes, little-endian): CRC32 of the payload only
//! - Length (2 bytes, little-endian): Length of the payload
//! - Type (1 byte): Record type (Full, First, Middle, Last)
//! - Payload (variable): Actual user data
//!
//! A header is never split across two blocks. When fewer than
//! [`MIN_RECORD_SPACE`] bytes remain in a block, the writer zero-fills them and
//! starts the next record at the beginning of the following block.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;

/// Size of the record header (checksum + length + type)
pub const HEADER_SIZE: usize = 7;

/// Smallest tail of a block that can still start a record: a header plus one payload byte.
pub const MIN_RECORD_SPACE: usize = HEADER_SIZE + 1;

/// Record types for handling large entries that span multiple blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Complete payload contained in a single record
    Full = 1,
    /// First fragment of a multi-block payload
    First = 2,
    /// Middle fragment of a multi-block payload
    Middle = 3,
    /// Last fragment of a multi-block payload
    Last = 4,
}

impl RecordType {
    /// Convert from u8 to RecordType
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RecordType::Full),
            2 => Ok(RecordType::First),
            3 => Ok(RecordType::Middle),
            4 => Ok(RecordType::Last),
            _ => Err(Error::Corruption(format!("Invalid record type: {}", value))),
        }
    }
}

/// A WAL record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Type of the record
    pub record_type: RecordType,
    /// Payload fragment carried by this record
    pub payload: Vec<u8>,
}

impl Record {
    /// Create a new record
    pub fn new(record_type: RecordType, payload: Vec<u8>) -> Self {
        Self { record_type, payload }
    }

    /// Encode the record into bytes
    ///
    /// Format: [checksum: u32][length: u16][type: u8][payload: bytes]
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.payload.len() <= u16::MAX as usize);

        let mut buf = BytesMut::with_capacity(self.encoded_size());
        buf.put_u32_le(Self::checksum(&self.payload));
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_u8(self.record_type as u8);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Decode a record from the front of `data`.
    ///
    /// Trailing bytes after the record are ignored.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Corruption(format!("Record too short: {} bytes", data.len())));
        }

        let stored = data.get_u32_le();
        let length = data.get_u16_le() as usize;
        let record_type = RecordType::from_u8(data.get_u8())?;

        if data.len() < length {
            return Err(Error::Corruption(format!(
                "Incomplete record: expected {} bytes, got {}",
                length,
                data.len()
            )));
        }

        let payload = data[..length].to_vec();

        let actual = Self::checksum(&payload);
        if stored != actual {
            return Err(Error::ChecksumMismatch { expected: stored, actual });
        }

        Ok(Record { record_type, payload })
    }

    /// CRC32 over the payload bytes.
    pub fn checksum(payload: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(payload);
        hasher.finalize()
    }

    /// Get the total size of the encoded record
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Number of zero bytes the writer must emit before the next record.
///
/// Non-zero only when the rest of the current block cannot hold
/// [`MIN_RECORD_SPACE`] bytes.
pub fn padding_len(block_offset: usize, block_size: usize) -> usize {
    let remaining = block_size - block_offset;
    if remaining < MIN_RECORD_SPACE {
        remaining
    } else {
        0
    }
}

/// Split `payload` into records that fill `remaining` bytes of the current
/// block and then whole blocks of `block_size` bytes.
///
/// A `remaining` smaller than [`MIN_RECORD_SPACE`] is treated as the start of a
/// fresh block, since the writer pads such a tail before emitting anything.
/// An empty payload becomes a single empty `Full` record.
pub fn fragment(payload: &[u8], remaining: usize, block_size: usize) -> Vec<Record> {
    debug_assert!(block_size >= MIN_RECORD_SPACE);
    debug_assert!(remaining <= block_size);

    let mut available = if remaining < MIN_RECORD_SPACE { block_size } else { remaining };
    let mut records = Vec::with_capacity(1 + payload.len() / (block_size - HEADER_SIZE));
    let mut rest = payload;
    let mut first = true;

    loop {
        let take = rest.len().min(available - HEADER_SIZE);
        let (chunk, tail) = rest.split_at(take);
        let last = tail.is_empty();

        let record_type = match (first, last) {
            (true, true) => RecordType::Full,
            (true, false) => RecordType::First,
            (false, false) => RecordType::Middle,
            (false, true) => RecordType::Last,
        };
        records.push(Record::new(record_type, chunk.to_vec()));

        if last {
            return records;
        }
        rest = tail;
        first = false;
        available = block_size;
    }
}

/// Scans one block front to back, yielding each record with the number of
/// bytes it occupied.
///
/// Iteration ends at the end of the block, when fewer than [`HEADER_SIZE`]
/// bytes remain, or at an all-zero header in a tail shorter than
/// [`MIN_RECORD_SPACE`] (padding). An all-zero header with more room after it,
/// or a malformed or checksum-failing record, is yielded as an error and ends
/// the scan.
pub struct BlockDecoder<'a> {
    block: &'a [u8],
    position: usize,
    done: bool,
}

impl<'a> BlockDecoder<'a> {
    /// Decode `block` from its first byte.
    pub fn new(block: &'a [u8]) -> Self {
        Self::with_position(block, 0)
    }

    /// Decode `block` starting at `position`.
    pub fn with_position(block: &'a [u8], position: usize) -> Self {
        Self { block, position, done: false }
    }

    /// Offset within the block of the next record to decode.
    pub fn offset(&self) -> usize {
        self.position
    }
}

impl Iterator for BlockDecoder<'_> {
    type Item = Result<(Record, usize)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.block.len().saturating_sub(self.position) < HEADER_SIZE {
            return None;
        }

        let rest = &self.block[self.position..];
        if rest[..HEADER_SIZE].iter().all(|&b| b == 0) {
            self.done = true;
            // Writers only zero-fill a tail too short for a record
            if rest.len() < MIN_RECORD_SPACE {
                return None;
            }
            return Some(Err(Error::Corruption(format!(
                "Zeroed header with {} bytes left in block at offset {}",
                rest.len(),
                self.position
            ))));
        }

        match Record::decode(rest) {
            Ok(record) => {
                let consumed = record.encoded_size();
                self.position += consumed;
                Some(Ok((record, consumed)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 32 * 1024;

    #[test]
    fn test_record_encode_decode() {
        let data = b"hello world".to_vec();
        let record = Record::new(RecordType::Full, data.clone());

        let encoded = record.encode();
        let decoded = Record::decode(&encoded).unwrap();

        assert_eq!(decoded.record_type, RecordType::Full);
        assert_eq!(decoded.payload, data);
    }

    #[test]
    fn test_header_layout() {
        let record = Record::new(RecordType::Middle, b"abc".to_vec());
        let encoded = record.encode();

        assert_eq!(encoded.len(), HEADER_SIZE + 3);
        assert_eq!(&encoded[0..4], &Record::checksum(b"abc").to_le_bytes());
        assert_eq!(&encoded[4..6], &3u16.to_le_bytes());
        assert_eq!(encoded[6], 3);
        assert_eq!(&encoded[7..], b"abc");
    }

    #[test]
    fn test_checksum_covers_payload_only() {
        let full = Record::new(RecordType::Full, b"same".to_vec()).encode();
        let last = Record::new(RecordType::Last, b"same".to_vec()).encode();
        assert_eq!(&full[0..4], &last[0..4]);
    }

    #[test]
    fn test_checksum_validation() {
        let record = Record::new(RecordType::Full, b"test data".to_vec());
        let mut encoded = record.encode();

        // Corrupt the payload
        encoded[HEADER_SIZE] ^= 0xFF;

        match Record::decode(&encoded) {
            Err(Error::ChecksumMismatch { .. }) => {}
            other => panic!("Expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_type() {
        let mut encoded = Record::new(RecordType::Full, b"x".to_vec()).encode();
        encoded[6] = 9;
        assert!(matches!(Record::decode(&encoded), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_incomplete_record() {
        let encoded = Record::new(RecordType::Full, b"payload".to_vec()).encode();
        let result = Record::decode(&encoded[..encoded.len() - 2]);
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_empty_payload() {
        let record = Record::new(RecordType::Full, vec![]);
        let encoded = record.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        let decoded = Record::decode(&encoded).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_padding_len() {
        assert_eq!(padding_len(0, BLOCK), 0);
        assert_eq!(padding_len(BLOCK - MIN_RECORD_SPACE, BLOCK), 0);
        assert_eq!(padding_len(BLOCK - MIN_RECORD_SPACE + 1, BLOCK), HEADER_SIZE);
        assert_eq!(padding_len(BLOCK - 1, BLOCK), 1);
    }

    #[test]
    fn test_fragment_fits() {
        let records = fragment(b"small", BLOCK, BLOCK);
        assert_eq!(records, vec![Record::new(RecordType::Full, b"small".to_vec())]);
    }

    #[test]
    fn test_fragment_exactly_fills_remaining() {
        let payload = vec![7u8; 100 - HEADER_SIZE];
        let records = fragment(&payload, 100, BLOCK);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, RecordType::Full);
    }

    #[test]
    fn test_fragment_spans_from_partial_block() {
        let payload = vec![1u8; 100];
        let records = fragment(&payload, 50, BLOCK);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_type, RecordType::First);
        assert_eq!(records[0].payload.len(), 50 - HEADER_SIZE);
        assert_eq!(records[1].record_type, RecordType::Last);
        assert_eq!(records[1].payload.len(), 100 - (50 - HEADER_SIZE));
    }

    #[test]
    fn test_fragment_three_blocks() {
        let per_block = BLOCK - HEADER_SIZE;
        let payload: Vec<u8> = (0..per_block * 3).map(|i| (i % 251) as u8).collect();
        let records = fragment(&payload, BLOCK, BLOCK);

        let types: Vec<_> = records.iter().map(|r| r.record_type).collect();
        assert_eq!(types, vec![RecordType::First, RecordType::Middle, RecordType::Last]);
        for record in &records {
            assert_eq!(record.encoded_size(), BLOCK);
            assert_ne!(record.payload, payload);
        }

        let joined: Vec<u8> = records.iter().flat_map(|r| r.payload.iter().copied()).collect();
        assert_eq!(joined, payload);
    }

    #[test]
    fn test_fragment_small_tail_starts_fresh_block() {
        let records = fragment(b"abc", HEADER_SIZE, BLOCK);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, RecordType::Full);
    }

    #[test]
    fn test_block_decoder_stops_at_padding() {
        let mut block = Vec::new();
        block.extend(Record::new(RecordType::Full, b"one".to_vec()).encode());
        block.extend(Record::new(RecordType::Full, b"two".to_vec()).encode());
        block.resize(block.len() + HEADER_SIZE, 0);

        let decoded: Vec<_> = BlockDecoder::new(&block).map(|r| r.unwrap()).collect();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].0.payload, b"one");
        assert_eq!(decoded[0].1, HEADER_SIZE + 3);
        assert_eq!(decoded[1].0.payload, b"two");
    }

    #[test]
    fn test_block_decoder_rejects_zeroed_header_with_room() {
        let mut block = Record::new(RecordType::Full, b"one".to_vec()).encode();
        block.resize(block.len() + MIN_RECORD_SPACE, 0);

        let mut decoder = BlockDecoder::new(&block);
        assert!(decoder.next().unwrap().is_ok());
        let err = decoder.next().unwrap().unwrap_err();
        assert!(err.is_corruption());
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_block_decoder_short_tail() {
        let mut block = Record::new(RecordType::Full, b"x".to_vec()).encode();
        block.extend_from_slice(&[0xAB; HEADER_SIZE - 1]);

        let mut decoder = BlockDecoder::new(&block);
        assert!(decoder.next().unwrap().is_ok());
        assert!(decoder.next().is_none());
        assert_eq!(decoder.offset(), HEADER_SIZE + 1);
    }

    #[test]
    fn test_block_decoder_reports_corruption() {
        let mut block = Record::new(RecordType::Full, b"good".to_vec()).encode();
        let mut bad = Record::new(RecordType::Full, b"bad".to_vec()).encode();
        bad[HEADER_SIZE] ^= 0x01;
        block.extend(bad);
        block.extend(Record::new(RecordType::Full, b"unreached".to_vec()).encode());

        let mut decoder = BlockDecoder::new(&block);
        assert!(decoder.next().unwrap().is_ok());
        assert!(decoder.next().unwrap().unwrap_err().is_corruption());
        assert!(decoder.next().is_none());
    }
}
