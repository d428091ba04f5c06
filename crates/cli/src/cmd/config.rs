//! Configuration command

use crate::util::StoreArgs;
use anyhow::Result;
use localstore::Options;
use owo_colors::OwoColorize;

/// Print a commented example configuration
pub fn run_example() -> Result<()> {
    print!("{}", Options::example());
    Ok(())
}

/// Print the configuration the store would open with
pub fn run_show(store: &StoreArgs) -> Result<()> {
    let options = store.options()?;
    options.validate()?;

    match &store.config {
        Some(path) => println!("{}: {}\n", "Location".dimmed(), path.display().dimmed()),
        None => println!("{}\n", "Using defaults (no --config given)".dimmed()),
    }
    print!("{}", options.to_toml()?);
    Ok(())
}
