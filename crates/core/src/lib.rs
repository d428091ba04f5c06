//! Content-addressed chunk primitives
//!
//! This crate provides:
//! - BLAKE3 chunk addresses
//! - Proximity order between addresses
//! - Chunk construction and splitting

pub mod address;
pub mod chunk;

// Re-export main types for convenience
pub use address::{hash_bytes, proximity, Address, ADDRESS_LEN, MAX_PO};
pub use chunk::{split, Chunk, CHUNK_SIZE};

/// Common result type used throughout chunk-core
pub type Result<T> = anyhow::Result<T>;
