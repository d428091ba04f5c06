//! Content-addressed chunks

use crate::address::{hash_bytes, Address};
use anyhow::Result;

/// Maximum payload of a single chunk in bytes
pub const CHUNK_SIZE: usize = 4096;

/// A chunk of data together with its content address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    address: Address,
    data: Vec<u8>,
}

impl Chunk {
    /// Create a chunk, computing its address
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() > CHUNK_SIZE {
            anyhow::bail!(
                "Chunk too large: {} bytes (max {})",
                data.len(),
                CHUNK_SIZE
            );
        }
        Ok(Self {
            address: hash_bytes(&data),
            data,
        })
    }

    /// Rebuild a chunk read back from storage
    ///
    /// The address is trusted; use [`Chunk::verify`] to check it.
    pub fn with_address(address: Address, data: Vec<u8>) -> Self {
        Self { address, data }
    }

    /// Content address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the chunk, returning its payload
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Check that the address matches the payload
    pub fn verify(&self) -> bool {
        hash_bytes(&self.data) == self.address
    }
}

/// Split a byte stream into chunks of at most [`CHUNK_SIZE`] bytes
///
/// Empty input yields no chunks.
pub fn split(data: &[u8]) -> Vec<Chunk> {
    data.chunks(CHUNK_SIZE)
        .map(|piece| Chunk {
            address: hash_bytes(piece),
            data: piece.to_vec(),
        })
        .collect()
}
