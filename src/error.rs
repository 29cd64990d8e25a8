//! Error types for lsmcore.

use std::io;
use thiserror::Error;

/// The result type used throughout lsmcore.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for lsmcore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A checksum mismatch was detected.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The checksum stored on disk.
        expected: u32,
        /// The checksum computed over the bytes actually read.
        actual: u32,
    },

    /// Construction parameters were rejected.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The database directory is missing or already exists.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Returns `true` for errors that mean the bytes on disk are not a valid log.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::ChecksumMismatch { .. })
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
