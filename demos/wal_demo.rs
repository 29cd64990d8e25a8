//! Example demonstrating WAL (Write-Ahead Log) usage.
//!
//! This example shows how to:
//! - Append entries and sync them to disk
//! - Recover entries after reopening
//! - Handle entries larger than one block
//! - Recover from a torn tail

use lsmcore::config::WalOptions;
use lsmcore::wal::{WALReader, WAL};
use std::fs::OpenOptions;
use tempfile::TempDir;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    println!("=== WAL Example ===\n");

    let dir = TempDir::new()?;
    let wal_path = dir.path().join("000001.log");
    let options = WalOptions::new().block_size(256);

    // Example 1: Basic usage
    {
        println!("1. Appending entries");
        let mut wal = WAL::open(&wal_path, &options)?;
        for entry in ["user:1:name:Alice", "user:1:email:alice@example.com", "user:2:name:Bob"] {
            let offset = wal.append(entry.as_bytes())?;
            println!("  {:>4} @ {}", entry.len(), offset);
        }

        // Example 2: An entry spread across several blocks
        let large = vec![b'x'; 1000];
        let offset = wal.append(&large)?;
        println!("  {:>4} @ {} (spans blocks)", large.len(), offset);

        wal.flush()?;
        println!("Synced {} bytes to disk\n", wal.size());
    }

    println!("2. Recovering");
    for entry in WAL::recover(&wal_path, &options)? {
        println!("  {} bytes", entry.len());
    }

    // Example 3: Crash in the middle of the last write
    println!("\n3. Torn tail");
    let len = std::fs::metadata(&wal_path)?.len();
    OpenOptions::new().write(true).open(&wal_path)?.set_len(len - 10)?;

    let mut reader = WALReader::new(&wal_path, options.block_size)?;
    let recovered = reader.recover_all()?;
    println!("  Recovered {} entries, valid log ends at {:?}", recovered.len(), reader.truncated_at());

    println!("\n=== Done ===");
    Ok(())
}
