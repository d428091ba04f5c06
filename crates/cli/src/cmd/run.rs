//! Keep the store open in the foreground

use crate::util::StoreArgs;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::time::Duration;
use tracing::info;

/// Interval between size reports
const REPORT_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(store: &StoreArgs) -> Result<()> {
    let db = store.open()?;

    println!(
        "{} {} ({} collectible chunks)",
        "Store open at".green(),
        store.data_dir.display(),
        db.gc_size()
    );
    println!("{}", "Press Ctrl-C to stop".dimmed());

    let mut report = tokio::time::interval(REPORT_INTERVAL);
    report.tick().await;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = report.tick() => {
                let stats = db.gc_stats();
                info!(
                    "Store holds {} collectible chunks ({} passes, {} collected)",
                    db.gc_size(),
                    stats.passes,
                    stats.collected
                );
            }
        }
    }

    println!("{}", "Shutting down...".dimmed());
    db.close()?;
    Ok(())
}
