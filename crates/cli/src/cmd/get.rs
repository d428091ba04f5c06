//! Read a chunk by address

use crate::util::StoreArgs;
use anyhow::{Context, Result};
use chunk_core::Address;
use std::io::Write;
use std::path::Path;

pub fn run(store: &StoreArgs, address: &str, output: Option<&Path>, as_hex: bool) -> Result<()> {
    let address: Address = address
        .parse()
        .with_context(|| format!("Invalid chunk address '{}'", address))?;

    let db = store.open()?;
    let chunk = db.get(&address)?;
    db.close()?;

    let bytes = if as_hex {
        let mut encoded = hex::encode(chunk.data()).into_bytes();
        encoded.push(b'\n');
        encoded
    } else {
        chunk.into_data()
    };

    match output {
        Some(path) => std::fs::write(path, &bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
