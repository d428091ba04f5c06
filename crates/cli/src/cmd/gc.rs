//! Run a collection pass and wait for it

use crate::util::StoreArgs;
use anyhow::{Context, Result};
use localstore::PassHook;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;

/// How long to wait for a follow-up pass after a capped one
const FOLLOW_UP_WAIT: Duration = Duration::from_millis(500);

pub fn run(store: &StoreArgs, timeout_secs: u64) -> Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let hook: PassHook = Arc::new(move |collected| {
        let _ = tx.send(collected);
    });
    let db = store.open_with_hook(hook)?;

    let before = db.gc_size();
    println!("{}", "Running Garbage Collection...".bold());
    db.request_collection();

    let mut passes = vec![rx
        .recv_timeout(Duration::from_secs(timeout_secs))
        .context("Timed out waiting for the collection pass")?];
    // capped passes re-arm themselves
    while let Ok(collected) = rx.recv_timeout(FOLLOW_UP_WAIT) {
        passes.push(collected);
    }
    let collected: i64 = passes.iter().sum();

    println!("{}", "GC Complete".green().bold());
    println!();
    if collected == 0 {
        println!(
            "{}",
            format!("Nothing to collect ({} of {} target)", before, db.gc_target()).dimmed()
        );
    } else {
        println!("Passes:          {}", passes.len().to_string().yellow());
        println!("Chunks removed:  {}", collected.to_string().yellow());
        println!("Chunks kept:     {}", db.gc_size().to_string().green());
    }

    let stats = db.gc_stats();
    if stats.commit_failures > 0 || stats.iteration_failures > 0 || stats.sync_failures > 0 {
        println!(
            "{}",
            format!(
                "{} commit failures, {} iteration failures, {} flush failures (see logs)",
                stats.commit_failures, stats.iteration_failures, stats.sync_failures
            )
            .red()
        );
    }

    db.close()?;
    Ok(())
}
