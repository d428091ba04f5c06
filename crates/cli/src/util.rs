//! Shared helpers for CLI commands

use anyhow::{Context, Result};
use localstore::{Options, PassHook, DB};
use std::path::{Path, PathBuf};

/// Where the store lives and how it is configured
pub struct StoreArgs {
    pub config: Option<PathBuf>,
    pub data_dir: PathBuf,
}

impl StoreArgs {
    /// Options from `--config`, or defaults when no file is given
    pub fn options(&self) -> Result<Options> {
        match &self.config {
            Some(path) => Options::load(path)
                .with_context(|| format!("Failed to load config {}", path.display())),
            None => Ok(Options::default()),
        }
    }

    pub fn open(&self) -> Result<DB> {
        let options = self.options()?;
        DB::open(&self.data_dir, options)
            .with_context(|| format!("Failed to open store at {}", self.data_dir.display()))
    }

    pub fn open_with_hook(&self, hook: PassHook) -> Result<DB> {
        let options = self.options()?;
        DB::open_with_hook(&self.data_dir, options, hook)
            .with_context(|| format!("Failed to open store at {}", self.data_dir.display()))
    }
}

/// Format byte size as human-readable string
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Read a whole file, naming it in the error
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}
