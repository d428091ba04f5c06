//! Typed indexes over a single sled tree
//!
//! Every index owns a one-byte key prefix inside the same tree. Because all
//! indexes share that tree, a [`Batch`] touching any number of them is
//! applied atomically by sled.

use crate::error::{Error, Result};
use chunk_core::Address;
use sled::{Db, Tree};
use std::path::Path;

/// Name of the sled tree holding every index
const INDEX_TREE: &str = "indexes";

/// A chunk as seen by an index
///
/// Indexes only encode the fields they care about; the rest stay at their
/// defaults when an item is decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexItem {
    pub address: Address,
    pub data: Vec<u8>,
    /// Logical time the chunk was admitted
    pub stored_at: u64,
    /// Logical time the chunk was last read
    pub accessed_at: u64,
    /// Proximity bin relative to the store's base key
    pub bin: u8,
}

impl IndexItem {
    /// Item carrying only an address, used as a lookup key
    pub fn with_address(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Fill fields that are unset in `self` from `other`
    pub fn merge(mut self, other: IndexItem) -> Self {
        if self.address == Address::ZERO {
            self.address = other.address;
        }
        if self.data.is_empty() {
            self.data = other.data;
        }
        if self.stored_at == 0 {
            self.stored_at = other.stored_at;
        }
        if self.accessed_at == 0 {
            self.accessed_at = other.accessed_at;
        }
        if self.bin == 0 {
            self.bin = other.bin;
        }
        self
    }
}

/// Key and value encoding for one index
#[derive(Clone, Copy)]
pub struct IndexCodec {
    pub encode_key: fn(&IndexItem) -> Vec<u8>,
    pub decode_key: fn(&[u8]) -> Option<IndexItem>,
    pub encode_value: fn(&IndexItem) -> Result<Vec<u8>>,
    pub decode_value: fn(&[u8]) -> Result<IndexItem>,
}

/// Pending writes across indexes
#[derive(Default)]
pub struct Batch {
    inner: sled::Batch,
    ops: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued puts and deletes
    pub fn len(&self) -> usize {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops == 0
    }
}

/// Handle to the sled database backing all indexes
pub struct Shed {
    db: Db,
    tree: Tree,
}

impl Shed {
    /// Open or create the database under `path`
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path.join("localstore.db"))?;
        Self::from_db(db)
    }

    /// Database in a temporary directory, removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let tree = db.open_tree(INDEX_TREE)?;
        Ok(Self { db, tree })
    }

    /// Index stored under `prefix`
    ///
    /// Callers are responsible for prefixes being unique.
    pub fn index(&self, name: &'static str, prefix: u8, codec: IndexCodec) -> Index {
        Index {
            name,
            prefix,
            codec,
            tree: self.tree.clone(),
        }
    }

    /// Apply a batch atomically
    pub fn write_batch(&self, batch: Batch) -> Result<()> {
        self.tree.apply_batch(batch.inner)?;
        Ok(())
    }

    /// Flush dirty pages to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// One prefixed index
#[derive(Clone)]
pub struct Index {
    name: &'static str,
    prefix: u8,
    codec: IndexCodec,
    tree: Tree,
}

impl Index {
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn full_key(&self, item: &IndexItem) -> Vec<u8> {
        let key = (self.codec.encode_key)(item);
        let mut full = Vec::with_capacity(key.len() + 1);
        full.push(self.prefix);
        full.extend_from_slice(&key);
        full
    }

    fn decode(&self, full_key: &[u8], value: &[u8]) -> Result<IndexItem> {
        let key_item = (self.codec.decode_key)(&full_key[1..]).ok_or(Error::CorruptKey {
            index: self.name,
            len: full_key.len() - 1,
        })?;
        let value_item = (self.codec.decode_value)(value)?;
        Ok(key_item.merge(value_item))
    }

    /// Look up the entry for the key fields of `item`
    pub fn get(&self, item: &IndexItem) -> Result<Option<IndexItem>> {
        let key = self.full_key(item);
        match self.tree.get(&key)? {
            Some(value) => Ok(Some(self.decode(&key, &value)?)),
            None => Ok(None),
        }
    }

    pub fn has(&self, item: &IndexItem) -> Result<bool> {
        Ok(self.tree.contains_key(self.full_key(item))?)
    }

    pub fn put_in_batch(&self, batch: &mut Batch, item: &IndexItem) -> Result<()> {
        let value = (self.codec.encode_value)(item)?;
        batch.inner.insert(self.full_key(item), value);
        batch.ops += 1;
        Ok(())
    }

    pub fn delete_in_batch(&self, batch: &mut Batch, item: &IndexItem) {
        batch.inner.remove(self.full_key(item));
        batch.ops += 1;
    }

    /// Number of entries, by full scan
    pub fn count(&self) -> Result<usize> {
        let mut count = 0;
        for entry in self.tree.scan_prefix([self.prefix]) {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Entry with the greatest key
    pub fn last(&self) -> Result<Option<IndexItem>> {
        match self.tree.scan_prefix([self.prefix]).next_back() {
            Some(entry) => {
                let (key, value) = entry?;
                Ok(Some(self.decode(&key, &value)?))
            }
            None => Ok(None),
        }
    }

    /// Visit every entry in ascending key order until `visit` returns true
    pub fn iterate_all<F>(&self, visit: F) -> Result<()>
    where
        F: FnMut(IndexItem) -> Result<bool>,
    {
        self.iterate_prefix(&[], visit)
    }

    /// Visit entries whose encoded key starts with `sub_prefix`
    pub fn iterate_prefix<F>(&self, sub_prefix: &[u8], mut visit: F) -> Result<()>
    where
        F: FnMut(IndexItem) -> Result<bool>,
    {
        let mut prefix = Vec::with_capacity(sub_prefix.len() + 1);
        prefix.push(self.prefix);
        prefix.extend_from_slice(sub_prefix);

        for entry in self.tree.scan_prefix(prefix) {
            let (key, value) = entry?;
            if visit(self.decode(&key, &value)?)? {
                break;
            }
        }
        Ok(())
    }

    /// Visit entries starting at the key of `start` (inclusive)
    pub fn iterate_from<F>(&self, start: &IndexItem, mut visit: F) -> Result<()>
    where
        F: FnMut(IndexItem) -> Result<bool>,
    {
        for entry in self.tree.range(self.full_key(start)..) {
            let (key, value) = entry?;
            if key.first() != Some(&self.prefix) {
                break;
            }
            if visit(self.decode(&key, &value)?)? {
                break;
            }
        }
        Ok(())
    }
}
