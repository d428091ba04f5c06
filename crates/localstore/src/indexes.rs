//! Index schema of the local store
//!
//! | prefix | index                 | key                                  | value                        |
//! |--------|-----------------------|--------------------------------------|------------------------------|
//! | 1      | retrieval data        | address                              | stored_at, data              |
//! | 2      | retrieval access      | address                              | accessed_at                  |
//! | 3      | retrieval composite   | address                              | stored_at, accessed_at, data |
//! | 4      | pull                  | bin, stored_at, address              | -                            |
//! | 5      | gc                    | accessed_at, stored_at, address      | -                            |
//!
//! Keys are fixed width big-endian so sled's byte order is the index order.
//! A store uses either the data + access pair or the composite index, never
//! both.

use crate::error::{Error, Result};
use crate::shed::{Batch, Index, IndexCodec, IndexItem, Shed};
use chunk_core::{proximity, Address, ADDRESS_LEN};
use serde::{Deserialize, Serialize};

const PREFIX_RETRIEVAL_DATA: u8 = 1;
const PREFIX_RETRIEVAL_ACCESS: u8 = 2;
const PREFIX_RETRIEVAL_COMPOSITE: u8 = 3;
const PREFIX_PULL: u8 = 4;
const PREFIX_GC: u8 = 5;

#[derive(Serialize, Deserialize)]
struct DataValue {
    stored_at: u64,
    data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct AccessValue {
    accessed_at: u64,
}

#[derive(Serialize, Deserialize)]
struct CompositeValue {
    stored_at: u64,
    accessed_at: u64,
    data: Vec<u8>,
}

fn read_u64(bytes: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}

fn read_address(bytes: &[u8]) -> Option<Address> {
    Address::from_slice(bytes).ok()
}

fn address_key(item: &IndexItem) -> Vec<u8> {
    item.address.as_bytes().to_vec()
}

fn decode_address_key(key: &[u8]) -> Option<IndexItem> {
    Some(IndexItem::with_address(read_address(key)?))
}

fn empty_value(_: &IndexItem) -> Result<Vec<u8>> {
    Ok(Vec::new())
}

fn decode_empty_value(_: &[u8]) -> Result<IndexItem> {
    Ok(IndexItem::default())
}

fn retrieval_data_codec() -> IndexCodec {
    IndexCodec {
        encode_key: address_key,
        decode_key: decode_address_key,
        encode_value: |item| {
            Ok(bincode::serialize(&DataValue {
                stored_at: item.stored_at,
                data: item.data.clone(),
            })?)
        },
        decode_value: |value| {
            let value: DataValue = bincode::deserialize(value)?;
            Ok(IndexItem {
                stored_at: value.stored_at,
                data: value.data,
                ..IndexItem::default()
            })
        },
    }
}

fn retrieval_access_codec() -> IndexCodec {
    IndexCodec {
        encode_key: address_key,
        decode_key: decode_address_key,
        encode_value: |item| {
            Ok(bincode::serialize(&AccessValue {
                accessed_at: item.accessed_at,
            })?)
        },
        decode_value: |value| {
            let value: AccessValue = bincode::deserialize(value)?;
            Ok(IndexItem {
                accessed_at: value.accessed_at,
                ..IndexItem::default()
            })
        },
    }
}

fn retrieval_composite_codec() -> IndexCodec {
    IndexCodec {
        encode_key: address_key,
        decode_key: decode_address_key,
        encode_value: |item| {
            Ok(bincode::serialize(&CompositeValue {
                stored_at: item.stored_at,
                accessed_at: item.accessed_at,
                data: item.data.clone(),
            })?)
        },
        decode_value: |value| {
            let value: CompositeValue = bincode::deserialize(value)?;
            Ok(IndexItem {
                stored_at: value.stored_at,
                accessed_at: value.accessed_at,
                data: value.data,
                ..IndexItem::default()
            })
        },
    }
}

fn pull_codec() -> IndexCodec {
    IndexCodec {
        encode_key: |item| {
            let mut key = Vec::with_capacity(1 + 8 + ADDRESS_LEN);
            key.push(item.bin);
            key.extend_from_slice(&item.stored_at.to_be_bytes());
            key.extend_from_slice(item.address.as_bytes());
            key
        },
        decode_key: |key| {
            if key.len() != 1 + 8 + ADDRESS_LEN {
                return None;
            }
            Some(IndexItem {
                bin: key[0],
                stored_at: read_u64(&key[1..9])?,
                address: read_address(&key[9..])?,
                ..IndexItem::default()
            })
        },
        encode_value: empty_value,
        decode_value: decode_empty_value,
    }
}

fn gc_codec() -> IndexCodec {
    IndexCodec {
        encode_key: |item| {
            let mut key = Vec::with_capacity(8 + 8 + ADDRESS_LEN);
            key.extend_from_slice(&item.accessed_at.to_be_bytes());
            key.extend_from_slice(&item.stored_at.to_be_bytes());
            key.extend_from_slice(item.address.as_bytes());
            key
        },
        decode_key: |key| {
            if key.len() != 8 + 8 + ADDRESS_LEN {
                return None;
            }
            Some(IndexItem {
                accessed_at: read_u64(&key[..8])?,
                stored_at: read_u64(&key[8..16])?,
                address: read_address(&key[16..])?,
                ..IndexItem::default()
            })
        },
        encode_value: empty_value,
        decode_value: decode_empty_value,
    }
}

/// Where chunk data and access times live
enum Retrieval {
    Split { data: Index, access: Index },
    Composite(Index),
}

/// All indexes of one store
pub struct Indexes {
    retrieval: Retrieval,
    pull: Index,
    gc: Index,
    base_key: Address,
}

impl Indexes {
    pub fn new(shed: &Shed, composite: bool, base_key: Address) -> Self {
        let retrieval = if composite {
            Retrieval::Composite(shed.index(
                "retrieval composite",
                PREFIX_RETRIEVAL_COMPOSITE,
                retrieval_composite_codec(),
            ))
        } else {
            Retrieval::Split {
                data: shed.index("retrieval data", PREFIX_RETRIEVAL_DATA, retrieval_data_codec()),
                access: shed.index(
                    "retrieval access",
                    PREFIX_RETRIEVAL_ACCESS,
                    retrieval_access_codec(),
                ),
            }
        };

        Self {
            retrieval,
            pull: shed.index("pull", PREFIX_PULL, pull_codec()),
            gc: shed.index("gc", PREFIX_GC, gc_codec()),
            base_key,
        }
    }

    /// Refuse to open a store written with the other retrieval layout
    pub fn check_layout(&self, shed: &Shed) -> Result<()> {
        let other = match &self.retrieval {
            Retrieval::Split { .. } => shed.index(
                "retrieval composite",
                PREFIX_RETRIEVAL_COMPOSITE,
                retrieval_composite_codec(),
            ),
            Retrieval::Composite(_) => {
                shed.index("retrieval data", PREFIX_RETRIEVAL_DATA, retrieval_data_codec())
            }
        };
        if other.last()?.is_some() {
            return Err(Error::InvalidConfig(format!(
                "store already holds a {} index; retrieval_composite_index cannot change",
                other.name()
            )));
        }
        Ok(())
    }

    pub fn gc(&self) -> &Index {
        &self.gc
    }

    pub fn pull(&self) -> &Index {
        &self.pull
    }

    fn retrieval_data(&self) -> &Index {
        match &self.retrieval {
            Retrieval::Split { data, .. } => data,
            Retrieval::Composite(index) => index,
        }
    }

    /// Proximity bin of `address` in the pull index
    pub fn bin(&self, address: &Address) -> u8 {
        proximity(&self.base_key, address)
    }

    /// Full item for a stored chunk
    pub fn retrieve(&self, address: &Address) -> Result<Option<IndexItem>> {
        let key = IndexItem::with_address(*address);
        let item = match &self.retrieval {
            Retrieval::Composite(index) => index.get(&key)?,
            Retrieval::Split { data, access } => match data.get(&key)? {
                Some(item) => {
                    let accessed_at = access
                        .get(&key)?
                        .map(|a| a.accessed_at)
                        .unwrap_or(item.stored_at);
                    Some(IndexItem {
                        accessed_at,
                        ..item
                    })
                }
                None => None,
            },
        };
        Ok(item.map(|item| IndexItem {
            bin: self.bin(&item.address),
            ..item
        }))
    }

    pub fn has(&self, address: &Address) -> Result<bool> {
        self.retrieval_data().has(&IndexItem::with_address(*address))
    }

    /// Number of chunks in the retrieval index
    pub fn retrieval_count(&self) -> Result<usize> {
        self.retrieval_data().count()
    }

    /// Queue a new chunk into every index
    pub fn put_chunk_in_batch(&self, batch: &mut Batch, item: &IndexItem) -> Result<()> {
        let item = IndexItem {
            bin: self.bin(&item.address),
            ..item.clone()
        };
        match &self.retrieval {
            Retrieval::Composite(index) => index.put_in_batch(batch, &item)?,
            Retrieval::Split { data, access } => {
                data.put_in_batch(batch, &item)?;
                access.put_in_batch(batch, &item)?;
            }
        }
        self.pull.put_in_batch(batch, &item)?;
        self.gc.put_in_batch(batch, &item)?;
        Ok(())
    }

    /// Queue a new access time, moving the chunk within the gc index
    pub fn update_access_in_batch(
        &self,
        batch: &mut Batch,
        current: &IndexItem,
        accessed_at: u64,
    ) -> Result<()> {
        self.gc.delete_in_batch(batch, current);
        let updated = IndexItem {
            accessed_at,
            ..current.clone()
        };
        match &self.retrieval {
            Retrieval::Composite(index) => index.put_in_batch(batch, &updated)?,
            Retrieval::Split { access, .. } => access.put_in_batch(batch, &updated)?,
        }
        self.gc.put_in_batch(batch, &updated)?;
        Ok(())
    }

    /// Queue removal of a chunk from every index
    ///
    /// `item` must carry the gc key fields (address and both timestamps).
    pub fn delete_chunk_in_batch(&self, batch: &mut Batch, item: &IndexItem) {
        let item = IndexItem {
            bin: self.bin(&item.address),
            ..item.clone()
        };
        match &self.retrieval {
            Retrieval::Composite(index) => index.delete_in_batch(batch, &item),
            Retrieval::Split { data, access } => {
                data.delete_in_batch(batch, &item);
                access.delete_in_batch(batch, &item);
            }
        }
        self.pull.delete_in_batch(batch, &item);
        self.gc.delete_in_batch(batch, &item);
    }
}
