// Crash Recovery Tests for lsmcore
// These tests verify data consistency after simulated crashes

use lsmcore::config::WalOptions;
use lsmcore::wal::wal_filename;
use lsmcore::{Options, DB};
use std::fs::{self, OpenOptions};
use std::path::Path;
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Helper function to simulate a crash by dropping DB without proper close
/// Uses mem::forget to prevent Drop from running (simulates abrupt termination)
fn simulate_crash(db: DB) {
    std::mem::forget(db);
}

fn wal_len(dir: &Path) -> u64 {
    fs::metadata(dir.join(wal_filename(1))).unwrap().len()
}

/// Test recovery after crash during write operations
#[test]
fn test_recovery_after_write_crash() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    // First session: write data, sync, and simulate crash
    {
        let db = DB::open(&path, Options::default()).unwrap();

        for i in 0..100 {
            let key = format!("key_{}", i);
            let value = format!("value_{}", i);
            db.put(key.as_bytes(), value.as_bytes()).unwrap();
        }
        db.delete(b"key_7").unwrap();
        db.sync().unwrap();

        simulate_crash(db);
    }

    // Second session: recover and verify
    {
        let (db, stats) = DB::open_with_stats(&path, Options::default()).unwrap();
        assert_eq!(stats.applied, 101);
        assert_eq!(stats.truncated_at, None);

        for i in 0..100 {
            let key = format!("key_{}", i);
            let expected = if i == 7 { None } else { Some(format!("value_{}", i).into_bytes()) };
            assert_eq!(
                db.get(key.as_bytes()).map(|v| v.to_vec()),
                expected,
                "Key {} should be recovered after crash",
                key
            );
        }
        assert_eq!(db.len(), 99);
    }
}

/// Writes logged with sync_on_append survive without an explicit sync
#[test]
fn test_sync_on_append_survives_crash() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().wal(WalOptions::new().sync_on_append(true));

    {
        let db = DB::open(dir.path(), options.clone()).unwrap();
        db.put(b"durable", b"yes").unwrap();
        simulate_crash(db);
    }

    let db = DB::open(dir.path(), options).unwrap();
    assert_eq!(db.get(b"durable").as_deref(), Some(&b"yes"[..]));
}

/// A torn final record is discarded and the log is cut back before new appends
#[test]
fn test_recovery_truncates_torn_tail() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    {
        let db = DB::open(&path, Options::default()).unwrap();
        for i in 0..10 {
            db.put(format!("key_{}", i).as_bytes(), b"value").unwrap();
        }
        db.close().unwrap();
    }

    let intact_len = wal_len(&path);
    {
        // Append a record that never finished writing
        let db = DB::open(&path, Options::default()).unwrap();
        db.put(b"torn", &[9u8; 200]).unwrap();
        db.close().unwrap();
        let file = OpenOptions::new().write(true).open(path.join(wal_filename(1))).unwrap();
        file.set_len(intact_len + 20).unwrap();
    }

    {
        let (db, stats) = DB::open_with_stats(&path, Options::default()).unwrap();
        assert_eq!(stats.applied, 10);
        assert_eq!(stats.truncated_at, Some(intact_len));
        assert_eq!(wal_len(&path), intact_len);
        assert_eq!(db.get(b"torn"), None);

        db.put(b"after", b"recovery").unwrap();
        db.close().unwrap();
    }

    let db = DB::open(&path, Options::default()).unwrap();
    assert_eq!(db.len(), 11);
    assert_eq!(db.get(b"after").as_deref(), Some(&b"recovery"[..]));
    assert_eq!(db.get(b"key_9").as_deref(), Some(&b"value"[..]));
}

/// Values larger than a block are reassembled on recovery
#[test]
fn test_recovery_of_multi_block_values() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().wal(WalOptions::new().block_size(128));
    let big: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

    {
        let db = DB::open(dir.path(), options.clone()).unwrap();
        db.put(b"big", &big).unwrap();
        db.put(b"small", b"v").unwrap();
        db.close().unwrap();
    }

    let db = DB::open(dir.path(), options).unwrap();
    assert_eq!(db.get(b"big").map(|v| v.to_vec()), Some(big));
    assert_eq!(db.get(b"small").as_deref(), Some(&b"v"[..]));
}

/// Multiple open/close cycles accumulate state
#[test]
fn test_repeated_reopen() {
    let dir = TempDir::new().unwrap();

    for round in 0..5 {
        let db = DB::open(dir.path(), Options::default()).unwrap();
        assert_eq!(db.len(), round);
        db.put(format!("round_{}", round).as_bytes(), b"x").unwrap();
        db.close().unwrap();
    }

    let db = DB::open(dir.path(), Options::default()).unwrap();
    assert_eq!(db.len(), 5);
}
