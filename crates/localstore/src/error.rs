//! Error types for the local chunk store

use chunk_core::Address;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the local store and its collector
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying sled failure
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Index value could not be encoded or decoded
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// A key under an index prefix had an unexpected layout
    #[error("corrupt key in {index} index ({len} bytes)")]
    CorruptKey { index: &'static str, len: usize },

    /// Requested chunk is not stored
    #[error("chunk not found: {0}")]
    NotFound(Address),

    /// Stored data no longer hashes to its address
    #[error("corrupt chunk: {0}")]
    CorruptChunk(Address),

    /// Options failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file could not be read
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::Options`]
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Options could not be rendered as TOML
    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// The collector thread could not be started
    #[error("failed to start garbage collector: {0}")]
    Spawn(#[source] std::io::Error),

    /// Reading the gc index failed part way through a pass
    #[error("gc index iteration failed: {0}")]
    Iteration(#[source] Box<Error>),

    /// Writing the eviction batch failed; nothing was removed
    #[error("gc batch commit failed: {0}")]
    Commit(#[source] Box<Error>),
}

/// Result type for local store operations
pub type Result<T> = std::result::Result<T, Error>;
