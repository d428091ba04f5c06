//! Common helpers for local store integration tests

use chunk_core::Chunk;
use crossbeam_channel::{unbounded, Receiver};
use localstore::{Options, PassHook, DB};
use rand::RngCore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How long to wait for a collection pass
pub const PASS_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait before concluding no further pass is coming
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Random chunks of 64 bytes each
pub fn random_chunks(count: usize) -> Vec<Chunk> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut data = vec![0u8; 64];
            rng.fill_bytes(&mut data);
            Chunk::new(data).unwrap()
        })
        .collect()
}

/// Hook forwarding collected counts to a channel
pub fn pass_channel() -> (PassHook, Receiver<i64>) {
    let (tx, rx) = unbounded();
    let hook: PassHook = Arc::new(move |collected| {
        let _ = tx.send(collected);
    });
    (hook, rx)
}

/// Temporary store reporting passes on the returned channel
pub fn temporary_db(options: Options) -> (DB, Receiver<i64>) {
    let (hook, rx) = pass_channel();
    let db = DB::temporary(options, Some(hook)).unwrap();
    (db, rx)
}

/// On-disk store reporting passes on the returned channel
pub fn open_db(path: &Path, options: Options) -> (DB, Receiver<i64>) {
    let (hook, rx) = pass_channel();
    let db = DB::open_with_hook(path, options, hook).unwrap();
    (db, rx)
}

/// Collect pass results until the collector goes quiet
pub fn drain_passes(rx: &Receiver<i64>) -> Vec<i64> {
    let mut passes = Vec::new();
    while let Ok(collected) = rx.recv_timeout(QUIET_PERIOD) {
        passes.push(collected);
    }
    passes
}

/// Assert that every index agrees with the accountant
pub fn assert_consistent(db: &DB) {
    let size = db.gc_size() as usize;
    assert_eq!(db.gc_index_count().unwrap(), size, "gc index");
    assert_eq!(db.retrieval_count().unwrap(), size, "retrieval index");
    assert_eq!(db.pull_index_count().unwrap(), size, "pull index");
}
