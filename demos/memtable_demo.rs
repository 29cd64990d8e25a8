//! Example demonstrating the skip list, the MemTable and the DB on top of them.

use lsmcore::config::SkipListOptions;
use lsmcore::{MemTable, Options, SkipList, DB};
use tempfile::TempDir;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    println!("=== MemTable Example ===\n");

    // Skip list keyed by integers, with reproducible heights
    let list = SkipList::with_seed(SkipListOptions::new().max_height(12).probability(0.25), 7)?;
    for (key, value) in [(30, "thirty"), (10, "ten"), (20, "twenty")] {
        list.set(key, value);
    }
    list.remove(&20);
    let keys: Vec<i32> = list.entries().iter().map(|e| *e.key()).collect();
    println!("Skip list keys: {:?}", keys);

    // MemTable over byte strings
    let memtable = MemTable::new(SkipListOptions::default())?;
    memtable.put(b"banana", b"yellow");
    memtable.put(b"apple", b"red");
    memtable.put(b"cherry", b"dark red");
    for entry in memtable.iter() {
        println!(
            "  {} => {}",
            String::from_utf8_lossy(entry.key()),
            String::from_utf8_lossy(entry.value())
        );
    }
    println!("Approximate size: {} bytes\n", memtable.approximate_size());

    // DB: writes survive a reopen
    let dir = TempDir::new()?;
    {
        let db = DB::open(dir.path(), Options::default())?;
        db.put(b"greeting", b"hello")?;
        db.put(b"farewell", b"bye")?;
        db.delete(b"farewell")?;
        db.close()?;
    }
    let db = DB::open(dir.path(), Options::default())?;
    println!("After reopen: {} key(s), greeting = {:?}", db.len(), db.get(b"greeting"));

    println!("\n=== Done ===");
    Ok(())
}
