//! Store configuration
//!
//! Options are plain serde structs so they can be embedded in a TOML file.
//! Every field has a default, so an empty file is a valid configuration.

use crate::error::{Error, Result};
use chunk_core::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of collectible chunks kept before collection starts
pub const DEFAULT_CAPACITY: i64 = 5_000_000;

/// Default fraction of capacity a pass drains down to
pub const DEFAULT_GC_TARGET_RATIO: f64 = 0.9;

/// Default maximum number of chunks removed in a single batch
pub const DEFAULT_GC_BATCH_SIZE: i64 = 1000;

/// Which timestamp leads the gc index key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionOrder {
    /// Least recently accessed first; reads move a chunk to the back
    #[default]
    Access,
    /// Oldest stored first; reads do not change the order
    Insertion,
}

/// Local store options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Number of collectible chunks the store may hold
    pub capacity: i64,
    /// Collection drains to `floor(capacity * gc_target_ratio)`; range (0, 1]
    pub gc_target_ratio: f64,
    /// Maximum chunks removed per pass
    pub gc_batch_size: i64,
    /// Keep data and access time in one retrieval index instead of two
    pub retrieval_composite_index: bool,
    /// Eviction priority policy
    pub eviction_order: EvictionOrder,
    /// Hex address that pull index bins are measured against
    pub base_key: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            gc_target_ratio: DEFAULT_GC_TARGET_RATIO,
            gc_batch_size: DEFAULT_GC_BATCH_SIZE,
            retrieval_composite_index: false,
            eviction_order: EvictionOrder::default(),
            base_key: None,
        }
    }
}

impl Options {
    /// Options with the given capacity and defaults elsewhere
    pub fn with_capacity(capacity: i64) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Load and validate options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate options from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let options: Options = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Render options as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check option ranges
    pub fn validate(&self) -> Result<()> {
        if self.capacity <= 0 {
            return Err(Error::InvalidConfig(format!(
                "capacity must be positive, got {}",
                self.capacity
            )));
        }
        if !(self.gc_target_ratio > 0.0 && self.gc_target_ratio <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "gc_target_ratio must be in (0, 1], got {}",
                self.gc_target_ratio
            )));
        }
        if self.gc_batch_size <= 0 {
            return Err(Error::InvalidConfig(format!(
                "gc_batch_size must be positive, got {}",
                self.gc_batch_size
            )));
        }
        self.base_key()?;
        Ok(())
    }

    /// Parsed base key, zero address when unset
    pub fn base_key(&self) -> Result<Address> {
        match &self.base_key {
            Some(hex) => Address::from_hex(hex)
                .map_err(|e| Error::InvalidConfig(format!("base_key: {}", e))),
            None => Ok(Address::ZERO),
        }
    }

    /// Number of chunks a pass leaves in the store
    pub fn gc_target(&self) -> i64 {
        (self.capacity as f64 * self.gc_target_ratio).floor() as i64
    }

    /// Commented example configuration file
    pub fn example() -> &'static str {
        r#"# Local chunk store configuration

# Number of collectible chunks kept before garbage collection starts.
capacity = 5000000

# Collection drains the store to floor(capacity * gc_target_ratio).
# Must be in (0, 1]; lower values collect less often but evict more.
gc_target_ratio = 0.9

# Maximum number of chunks removed in one atomic batch.
gc_batch_size = 1000

# Store chunk data and access time in a single retrieval index.
retrieval_composite_index = false

# "access" evicts least recently read chunks first,
# "insertion" evicts the oldest stored chunks first.
eviction_order = "access"

# Hex address used to bin chunks in the pull index (defaults to zero).
# base_key = "0000000000000000000000000000000000000000000000000000000000000000"
"#
    }
}
