//! Store random chunks

use crate::util::StoreArgs;
use anyhow::Result;
use chunk_core::{Chunk, CHUNK_SIZE};
use owo_colors::OwoColorize;
use rand::RngCore;

/// Chunks admitted per batch
const FILL_BATCH: usize = 1000;

pub fn run(store: &StoreArgs, count: usize, size: usize) -> Result<()> {
    if size == 0 || size > CHUNK_SIZE {
        anyhow::bail!("Chunk size must be between 1 and {} bytes", CHUNK_SIZE);
    }

    let db = store.open()?;
    let mut rng = rand::thread_rng();

    let mut remaining = count;
    let mut admitted = 0;
    while remaining > 0 {
        let n = remaining.min(FILL_BATCH);
        let chunks = (0..n)
            .map(|_| {
                let mut data = vec![0u8; size];
                rng.fill_bytes(&mut data);
                Chunk::new(data)
            })
            .collect::<chunk_core::Result<Vec<_>>>()?;
        admitted += db.put_many(&chunks)?;
        remaining -= n;
    }

    println!(
        "{} {} random chunks (collectible now: {})",
        "Stored".green(),
        admitted.to_string().yellow(),
        db.gc_size()
    );

    db.close()?;
    Ok(())
}
