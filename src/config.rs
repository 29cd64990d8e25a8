//! Configuration options for lsmcore.

use crate::error::{Error, Result};
use crate::wal::record::HEADER_SIZE;

/// Default maximum node height of the skip list.
pub const DEFAULT_MAX_HEIGHT: usize = 18;

/// Largest maximum height accepted at construction.
pub const MAX_HEIGHT_LIMIT: usize = 64;

/// Default probability that a node is promoted one more level.
pub const DEFAULT_PROBABILITY: f64 = 0.029;

/// Default WAL block size (32KB).
pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;

/// Options for building a [`SkipList`](crate::memtable::SkipList).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkipListOptions {
    /// Maximum height any node may reach.
    /// Default: 18
    pub max_height: usize,

    /// Per-level promotion probability.
    /// Default: 0.029
    pub probability: f64,
}

impl Default for SkipListOptions {
    fn default() -> Self {
        Self { max_height: DEFAULT_MAX_HEIGHT, probability: DEFAULT_PROBABILITY }
    }
}

impl SkipListOptions {
    /// Creates a new SkipListOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum node height.
    pub fn max_height(mut self, height: usize) -> Self {
        self.max_height = height;
        self
    }

    /// Sets the promotion probability.
    pub fn probability(mut self, p: f64) -> Self {
        self.probability = p;
        self
    }

    /// Rejects heights outside `[1, 64]` and probabilities outside `(0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if self.max_height == 0 || self.max_height > MAX_HEIGHT_LIMIT {
            return Err(Error::configuration(format!(
                "max_height must be in [1, {}], got {}",
                MAX_HEIGHT_LIMIT, self.max_height
            )));
        }
        if !(self.probability > 0.0 && self.probability < 1.0) {
            return Err(Error::configuration(format!(
                "probability must be between 0 and 1, got {}",
                self.probability
            )));
        }
        Ok(())
    }
}

/// Options for opening a [`WAL`](crate::wal::WAL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalOptions {
    /// Size of one log block in bytes. Readers must use the writer's value.
    /// Default: 32KB
    pub block_size: usize,

    /// Fsync after every append instead of waiting for an explicit flush.
    /// Default: false
    pub sync_on_append: bool,
}

impl Default for WalOptions {
    fn default() -> Self {
        Self { block_size: DEFAULT_BLOCK_SIZE, sync_on_append: false }
    }
}

impl WalOptions {
    /// Creates a new WalOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets whether every append is fsync'd.
    pub fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// A block must hold at least one header plus one payload byte, and its
    /// largest fragment must fit the 16-bit length field.
    pub fn validate(&self) -> Result<()> {
        let min = HEADER_SIZE + 1;
        let max = u16::MAX as usize + HEADER_SIZE;
        if self.block_size < min || self.block_size > max {
            return Err(Error::configuration(format!(
                "block_size must be in [{}, {}], got {}",
                min, max, self.block_size
            )));
        }
        Ok(())
    }
}

/// Configuration options for opening a database.
#[derive(Debug, Clone)]
pub struct Options {
    /// Create the database if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Error if the database already exists.
    /// Default: false
    pub error_if_exists: bool,

    /// Size threshold at which the MemTable reports it should be flushed (in bytes).
    /// Default: 4MB
    pub memtable_size: usize,

    /// Skip list parameters for the MemTable.
    pub skiplist: SkipListOptions,

    /// Write-ahead log parameters.
    pub wal: WalOptions,

    /// Consult a bloom filter before probing the MemTable.
    /// Default: true
    pub use_bloom_filter: bool,

    /// Number of keys the bloom filter is sized for.
    /// Default: 100_000
    pub bloom_filter_expected_keys: usize,

    /// Bloom filter false positive rate.
    /// Default: 0.01 (1%)
    pub bloom_filter_fp_rate: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            memtable_size: 4 * 1024 * 1024, // 4MB
            skiplist: SkipListOptions::default(),
            wal: WalOptions::default(),
            use_bloom_filter: true,
            bloom_filter_expected_keys: 100_000,
            bloom_filter_fp_rate: 0.01,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the MemTable size threshold.
    pub fn memtable_size(mut self, size: usize) -> Self {
        self.memtable_size = size;
        self
    }

    /// Sets the skip list parameters.
    pub fn skiplist(mut self, skiplist: SkipListOptions) -> Self {
        self.skiplist = skiplist;
        self
    }

    /// Sets the WAL parameters.
    pub fn wal(mut self, wal: WalOptions) -> Self {
        self.wal = wal;
        self
    }

    /// Enables or disables the bloom filter.
    pub fn use_bloom_filter(mut self, value: bool) -> Self {
        self.use_bloom_filter = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size == 0 {
            return Err(Error::configuration("memtable_size must be > 0"));
        }
        self.skiplist.validate()?;
        self.wal.validate()?;
        if self.bloom_filter_fp_rate <= 0.0 || self.bloom_filter_fp_rate >= 1.0 {
            return Err(Error::configuration("bloom_filter_fp_rate must be between 0 and 1"));
        }
        Ok(())
    }
}
