//! Mutations as they are framed into WAL payloads.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One logical write recorded in the WAL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Insert or overwrite a key.
    Put {
        /// Key to insert
        key: Vec<u8>,
        /// Value to associate with the key
        value: Vec<u8>,
    },
    /// Remove a key.
    Delete {
        /// Key to delete
        key: Vec<u8>,
    },
}

impl LogEntry {
    /// Serializes the entry into a WAL payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Parses a WAL payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(payload)?)
    }
}
