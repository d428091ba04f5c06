//! Import files as chunks

use crate::util::{self, StoreArgs};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub fn run(store: &StoreArgs, files: &[PathBuf]) -> Result<()> {
    let db = store.open()?;

    let mut total_chunks = 0;
    let mut total_new = 0;
    for path in files {
        let data = util::read_file(path)?;
        let chunks = chunk_core::split(&data);
        let admitted = db.put_many(&chunks)?;

        println!(
            "{} {} ({}, {} chunks, {} new)",
            "Stored".green(),
            path.display(),
            util::format_size(data.len() as u64),
            chunks.len(),
            admitted
        );
        for chunk in &chunks {
            println!("  {}", chunk.address().to_string().dimmed());
        }

        total_chunks += chunks.len();
        total_new += admitted;
    }

    if files.len() > 1 {
        println!();
        println!(
            "{} chunks from {} files, {} new",
            total_chunks.to_string().yellow(),
            files.len(),
            total_new.to_string().yellow()
        );
    }

    db.close()?;
    Ok(())
}
