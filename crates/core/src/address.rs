//! BLAKE3 chunk addresses and proximity order

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of an address in bytes
pub const ADDRESS_LEN: usize = 32;

/// Highest proximity order tracked by the pull index
pub const MAX_PO: u8 = 16;

/// Content address of a chunk (BLAKE3 of its data)
#[derive(Copy, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero address
    pub const ZERO: Address = Address([0; ADDRESS_LEN]);

    /// Create a new Address from bytes
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an address from a slice, failing on wrong length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            anyhow::anyhow!(
                "Invalid address length: expected {} bytes, got {}",
                ADDRESS_LEN,
                bytes.len()
            )
        })?;
        Ok(Self(array))
    }

    /// Get the address as a byte slice
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string
    pub fn from_hex(text: &str) -> Result<Self> {
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(text, &mut bytes)
            .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", text, e))?;
        Ok(Self(bytes))
    }

    /// First four bytes in hex, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address").field(&format_args!("{}", self)).finish()
    }
}

/// BLAKE3 content address of `data`
pub fn hash_bytes(data: &[u8]) -> Address {
    Address(blake3::hash(data).into())
}

/// Proximity order of two addresses
///
/// Number of leading bits `a` and `b` share, capped at [`MAX_PO`].
pub fn proximity(a: &Address, b: &Address) -> u8 {
    let mut po = 0u32;
    for (x, y) in a.0.iter().zip(b.0.iter()) {
        let diff = x ^ y;
        if diff != 0 {
            po += diff.leading_zeros();
            break;
        }
        po += 8;
        if po >= MAX_PO as u32 {
            break;
        }
    }
    po.min(MAX_PO as u32) as u8
}
