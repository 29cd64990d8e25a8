//! # lsmcore - Memtable and Write-Ahead Log for LSM-Tree Storage Engines
//!
//! lsmcore provides the write path of a Log-Structured Merge-Tree engine:
//! every mutation is appended to a write-ahead log before it becomes visible
//! in an in-memory sorted table.
//!
//! ## Architecture
//!
//! - **WAL (Write-Ahead Log)**: Block-structured, checksummed log; replayed on startup
//! - **MemTable**: In-memory sorted structure backed by a concurrent skip list
//! - **Bloom Filter**: Short-circuits lookups for keys that were never written
//! - **DB**: Ties the three together behind put/get/delete
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use lsmcore::{DB, Options};
//!
//! # fn main() -> Result<(), lsmcore::Error> {
//! // Open or create a database
//! let db = DB::open("./data", Options::default())?;
//!
//! // Write operations
//! db.put(b"key1", b"value1")?;
//! db.put(b"key2", b"value2")?;
//!
//! // Read operations
//! if let Some(value) = db.get(b"key1") {
//!     println!("Found: {:?}", value);
//! }
//!
//! // Delete operations
//! db.delete(b"key1")?;
//! db.sync()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod error;
pub mod filter;
pub mod log_entry;
pub mod memtable;
pub mod wal;

// Re-exports
pub use config::Options;
pub use error::{Error, Result};
pub use filter::{BloomFilter, MembershipFilter};
pub use log_entry::LogEntry;
pub use memtable::{MemTable, SkipList};
pub use wal::WAL;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};

/// The main database handle.
///
/// # Thread Safety
///
/// `DB` can be shared across threads using `Arc<DB>`. Writers are serialized
/// on the WAL; readers only touch the MemTable and the bloom filter.
pub struct DB {
    /// Database directory path
    path: PathBuf,

    /// Configuration options
    options: Options,

    /// In-memory sorted table holding every live key
    memtable: MemTable,

    /// Write-Ahead Log; its lock also orders MemTable updates
    wal: Mutex<WAL>,

    /// Filter over every key ever put, when enabled
    filter: Option<RwLock<BloomFilter>>,
}

/// What [`DB::open`] found in the existing log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Payloads applied to the MemTable
    pub applied: usize,
    /// Payloads that were intact but could not be decoded
    pub skipped: usize,
    /// Offset the log was cut back to, if its tail was unrecoverable
    pub truncated_at: Option<u64>,
}

impl DB {
    /// Opens a database at the specified path with the given options.
    ///
    /// If the directory holds a WAL, it is replayed into a fresh MemTable. A
    /// torn or corrupt tail is cut off so new appends follow the last valid
    /// record.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options are invalid
    /// - The path is invalid or inaccessible
    /// - Reading or truncating the log fails
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        Self::open_with_stats(path, options).map(|(db, _)| db)
    }

    /// Like [`open`](Self::open), also reporting what recovery did.
    pub fn open_with_stats<P: AsRef<Path>>(path: P, options: Options) -> Result<(Self, RecoveryStats)> {
        let path = path.as_ref().to_path_buf();

        options.validate()?;

        // Step 1: Create directory if not exists
        if !path.exists() {
            if options.create_if_missing {
                std::fs::create_dir_all(&path)?;
            } else {
                return Err(Error::InvalidState(format!(
                    "Database directory does not exist: {:?}",
                    path
                )));
            }
        } else if options.error_if_exists {
            return Err(Error::InvalidState(format!("Database already exists: {:?}", path)));
        }

        // Step 2: Find the latest WAL file
        let wal_number = latest_wal_number(&path)?.unwrap_or(1);
        let wal_path = path.join(wal::wal_filename(wal_number));

        // Step 3: Open it, cutting off a torn tail, and replay into a fresh MemTable
        let mut wal = WAL::open(&wal_path, &options.wal)?;
        let memtable = MemTable::new(options.skiplist)?;
        let stats = replay_into(&mut wal, &memtable)?;

        // Step 4: Rebuild the filter from the surviving keys
        let filter = if options.use_bloom_filter {
            let mut filter = BloomFilter::new(
                options.bloom_filter_expected_keys.max(memtable.len()),
                options.bloom_filter_fp_rate,
            );
            for entry in memtable.iter() {
                filter.add(entry.key());
            }
            Some(RwLock::new(filter))
        } else {
            None
        };

        Ok((Self { path, options, memtable, wal: Mutex::new(wal), filter }, stats))
    }

    /// Inserts a key-value pair into the database.
    ///
    /// The write is appended to the WAL before it becomes visible. It is
    /// durable once [`sync`](Self::sync) returns, or immediately when
    /// `sync_on_append` is set.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use lsmcore::{DB, Options};
    /// # fn main() -> Result<(), lsmcore::Error> {
    /// # let db = DB::open("./data", Options::default())?;
    /// db.put(b"key", b"value")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let payload = LogEntry::Put { key: key.to_vec(), value: value.to_vec() }.encode()?;

        let mut wal = self.wal.lock();
        wal.append(&payload)?;

        self.memtable.put(key, value);
        if let Some(filter) = &self.filter {
            filter.write().add(key);
        }

        if self.should_flush() {
            log::debug!(
                "MemTable is full ({} bytes >= {})",
                self.memtable.approximate_size(),
                self.options.memtable_size
            );
        }

        Ok(())
    }

    /// Retrieves the value associated with a key.
    ///
    /// Returns `None` if the key does not exist or has been deleted.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        if let Some(filter) = &self.filter {
            if !filter.read().may_contain(key) {
                return None;
            }
        }
        self.memtable.get(key)
    }

    /// Deletes a key from the database.
    ///
    /// Deleting a missing key is logged like any other write and is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let payload = LogEntry::Delete { key: key.to_vec() }.encode()?;

        let mut wal = self.wal.lock();
        wal.append(&payload)?;

        self.memtable.delete(key);
        Ok(())
    }

    /// Forces every logged write to durable storage.
    pub fn sync(&self) -> Result<()> {
        self.wal.lock().flush()
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> usize {
        self.memtable.len()
    }

    /// Returns `true` if the database holds no keys.
    pub fn is_empty(&self) -> bool {
        self.memtable.is_empty()
    }

    /// Returns `true` once the MemTable has outgrown `memtable_size`.
    pub fn should_flush(&self) -> bool {
        self.memtable.approximate_size() >= self.options.memtable_size
    }

    /// Returns the MemTable.
    pub fn memtable(&self) -> &MemTable {
        &self.memtable
    }

    /// Returns the current WAL size in bytes.
    pub fn wal_size(&self) -> u64 {
        self.wal.lock().size()
    }

    /// Returns the database directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the WAL and releases the database.
    pub fn close(self) -> Result<()> {
        self.wal.into_inner().close()
    }
}

/// Highest `NNNNNN.log` number in `dir`.
fn latest_wal_number(dir: &Path) -> Result<Option<u64>> {
    let mut latest = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(num) = entry.file_name().to_str().and_then(wal::parse_wal_filename) {
            latest = latest.max(Some(num));
        }
    }
    Ok(latest)
}

/// Applies every WAL payload to `memtable` in log order.
fn replay_into(wal: &mut WAL, memtable: &MemTable) -> Result<RecoveryStats> {
    let mut stats = RecoveryStats { truncated_at: wal.truncated_at(), ..Default::default() };

    for payload in wal.replay()? {
        match LogEntry::decode(&payload?) {
            Ok(LogEntry::Put { key, value }) => memtable.put(&key, &value),
            Ok(LogEntry::Delete { key }) => {
                memtable.delete(&key);
            }
            Err(e) => {
                log::warn!("Skipping undecodable WAL entry in {:?}: {}", wal.path(), e);
                stats.skipped += 1;
                continue;
            }
        }
        stats.applied += 1;
    }

    log::info!(
        "Recovered {} entries from {:?} ({} live keys)",
        stats.applied,
        wal.path(),
        memtable.len()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested");
        let db = DB::open(&path, Options::default()).unwrap();
        assert!(path.exists());
        assert!(db.is_empty());
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let options = Options::default().create_if_missing(false);
        assert!(matches!(
            DB::open(dir.path().join("missing"), options),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_error_if_exists() {
        let dir = TempDir::new().unwrap();
        let options = Options { error_if_exists: true, ..Default::default() };
        assert!(DB::open(dir.path(), options).is_err());
    }

    #[test]
    fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let db = DB::open(dir.path(), Options::default()).unwrap();

        db.put(b"key", b"value").unwrap();
        assert_eq!(db.get(b"key").as_deref(), Some(&b"value"[..]));

        db.delete(b"key").unwrap();
        assert_eq!(db.get(b"key"), None);
        assert!(db.delete(b"never").is_ok());
    }

    #[test]
    fn test_latest_wal_is_replayed() {
        let dir = TempDir::new().unwrap();
        {
            let mut old = WAL::open(dir.path().join(wal::wal_filename(1)), &Default::default()).unwrap();
            old.append(&LogEntry::Put { key: b"k".to_vec(), value: b"old".to_vec() }.encode().unwrap())
                .unwrap();
            old.close().unwrap();
            let mut new = WAL::open(dir.path().join(wal::wal_filename(2)), &Default::default()).unwrap();
            new.append(&LogEntry::Put { key: b"k".to_vec(), value: b"new".to_vec() }.encode().unwrap())
                .unwrap();
            new.close().unwrap();
        }

        let db = DB::open(dir.path(), Options::default()).unwrap();
        assert_eq!(db.get(b"k").as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let dir = TempDir::new().unwrap();
        let mut options = Options::default();
        options.skiplist.max_height = 0;
        assert!(matches!(DB::open(dir.path(), options), Err(Error::Configuration(_))));
    }
}
