//! # MemTable - In-Memory Sorted Table
//!
//! The MemTable is an in-memory data structure that stores recent writes.
//! It uses a SkipList for efficient concurrent reads and writes.
//!
//! ## Design
//!
//! - Backed by [`SkipList`], an arena-indexed skip list behind a `RwLock`
//! - Supports Put, Get and Delete; a delete unlinks the key
//! - Tracks size to determine when to flush to disk
//! - Provides an ordered snapshot of its entries
//!
//! ## Thread Safety
//!
//! MemTable can be shared across threads. Reads run in parallel; writes are
//! serialized by the skip list's lock.

mod skiplist;

pub use skiplist::{Entry, SkipList};

use crate::config::SkipListOptions;
use crate::error::Result;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-entry bookkeeping added to the approximate size.
const ENTRY_OVERHEAD: usize = 16;

/// MemTable stores recent writes in memory using a SkipList.
///
/// # Example
///
/// ```rust
/// use lsmcore::config::SkipListOptions;
/// use lsmcore::memtable::MemTable;
///
/// # fn main() -> Result<(), lsmcore::Error> {
/// let memtable = MemTable::new(SkipListOptions::default())?;
/// memtable.put(b"key1", b"value1");
/// assert_eq!(memtable.get(b"key1").as_deref(), Some(&b"value1"[..]));
/// # Ok(())
/// # }
/// ```
pub struct MemTable {
    /// The underlying SkipList storing key -> value
    data: SkipList<Bytes, Bytes>,

    /// Approximate size in bytes of everything written (keys + values)
    size: AtomicUsize,
}

/// A single entry in the MemTable.
pub type MemTableEntry = Entry<Bytes, Bytes>;

impl MemTable {
    /// Creates a new empty MemTable.
    pub fn new(options: SkipListOptions) -> Result<Self> {
        Ok(Self { data: SkipList::new(options)?, size: AtomicUsize::new(0) })
    }

    /// Inserts a key-value pair, replacing any previous value for the key.
    pub fn put(&self, key: &[u8], value: &[u8]) {
        let entry_size = key.len() + value.len() + ENTRY_OVERHEAD;
        self.data.set(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value));
        self.size.fetch_add(entry_size, Ordering::Relaxed);
    }

    /// Retrieves the value for a key.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.data.get(key).map(|entry| entry.into_parts().1)
    }

    /// Removes a key. Returns `true` if it was present.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.data.remove(key).is_some()
    }

    /// Returns the entry with the smallest key.
    pub fn first(&self) -> Option<MemTableEntry> {
        self.data.front()
    }

    /// Returns the approximate number of bytes written to the MemTable.
    ///
    /// Overwrites and deletes do not give space back, mirroring the arena
    /// slots they leave behind until reuse.
    pub fn approximate_size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Returns the number of live entries in the MemTable.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the MemTable contains no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = MemTableEntry> {
        self.data.entries().into_iter()
    }
}
