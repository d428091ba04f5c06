//! Show store statistics

use crate::util::StoreArgs;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(store: &StoreArgs) -> Result<()> {
    let options = store.options()?;
    let db = store.open()?;
    // opening a store over capacity starts a pass; read everything at once
    let snapshot = db.snapshot()?;

    println!("{}", "Store Statistics".bold());
    println!("{}: {}\n", "Location".dimmed(), store.data_dir.display().dimmed());

    let size = snapshot.gc_size;
    let usage = if options.capacity > 0 {
        size as f64 / options.capacity as f64 * 100.0
    } else {
        0.0
    };
    let size_text = size.to_string();
    println!(
        "  {:<22} {} {}",
        "collectible chunks".cyan(),
        if size >= options.capacity {
            size_text.red().to_string()
        } else {
            size_text.green().to_string()
        },
        format!("({:.1}% of capacity)", usage).dimmed()
    );
    println!("  {:<22} {}", "capacity".cyan(), options.capacity);
    println!("  {:<22} {}", "gc target".cyan(), db.gc_target());
    println!("  {:<22} {}", "gc batch size".cyan(), options.gc_batch_size);
    println!("  {:<22} {:?}", "eviction order".cyan(), options.eviction_order);
    println!(
        "  {:<22} {}",
        "retrieval layout".cyan(),
        if options.retrieval_composite_index {
            "composite"
        } else {
            "split"
        }
    );

    println!("\n{}", "Indexes".yellow());
    println!("  {:<22} {}", "retrieval".cyan(), snapshot.retrieval);
    println!("  {:<22} {}", "pull".cyan(), snapshot.pull_index);
    println!("  {:<22} {}", "gc".cyan(), snapshot.gc_index);

    db.close()?;
    Ok(())
}
