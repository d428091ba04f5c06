//! Local chunk store with background garbage collection

use crate::clock::Clock;
use crate::config::{EvictionOrder, Options};
use crate::error::{Error, Result};
use crate::gc::{
    CollectorHandle, CollectorState, GarbageCollector, GcStats, GcStatsSnapshot, GcStore,
    PassHook,
};
use crate::indexes::Indexes;
use crate::shed::{Batch, IndexItem, Shed};
use crate::size::SizeAccountant;
use crate::trigger::Trigger;
use chunk_core::{Address, Chunk};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State shared by foreground calls and the collector thread
struct Inner {
    shed: Shed,
    indexes: Indexes,
    /// Serializes multi-index batches
    batch_mu: Mutex<()>,
    accountant: Arc<SizeAccountant>,
    clock: Clock,
    eviction_order: EvictionOrder,
}

impl GcStore for Inner {
    type Batch = Batch;

    fn iterate_gc_order(
        &self,
        visit: &mut dyn FnMut(&IndexItem) -> Result<bool>,
    ) -> Result<()> {
        self.indexes.gc().iterate_all(|item| visit(&item))
    }

    fn delete_in_batch(&self, batch: &mut Batch, item: &IndexItem) -> Result<()> {
        self.indexes.delete_chunk_in_batch(batch, item);
        Ok(())
    }

    fn commit(&self, batch: Batch) -> Result<()> {
        self.shed.write_batch(batch)
    }

    fn sync(&self) -> Result<()> {
        self.shed.flush()
    }

    fn lock_batches(&self) -> MutexGuard<'_, ()> {
        self.batch_mu.lock()
    }
}

/// Point-in-time sizes of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub gc_size: i64,
    pub gc_index: usize,
    pub pull_index: usize,
    pub retrieval: usize,
}

/// Capacity-bounded local chunk store
///
/// Every admitted chunk is eligible for collection. Once the number of
/// stored chunks reaches `capacity`, the background collector removes the
/// lowest-priority chunks until `floor(capacity * gc_target_ratio)` remain.
pub struct DB {
    collector: CollectorHandle,
    inner: Arc<Inner>,
    stats: Arc<GcStats>,
    gc_target: i64,
}

impl DB {
    /// Open or create a store under `path`
    pub fn open(path: &Path, options: Options) -> Result<Self> {
        Self::start(Shed::open(path)?, options, None)
    }

    /// Like [`DB::open`], calling `hook` after every collection pass
    pub fn open_with_hook(path: &Path, options: Options, hook: PassHook) -> Result<Self> {
        Self::start(Shed::open(path)?, options, Some(hook))
    }

    /// Store backed by a temporary database
    pub fn temporary(options: Options, hook: Option<PassHook>) -> Result<Self> {
        Self::start(Shed::temporary()?, options, hook)
    }

    fn start(shed: Shed, options: Options, hook: Option<PassHook>) -> Result<Self> {
        options.validate()?;

        let indexes = Indexes::new(&shed, options.retrieval_composite_index, options.base_key()?);
        indexes.check_layout(&shed)?;

        // the accountant is not persisted; rebuild it from the gc index
        let gc_size = indexes.gc().count()? as i64;
        let floor = indexes
            .gc()
            .last()?
            .map(|item| item.accessed_at.max(item.stored_at))
            .unwrap_or(0);

        let accountant = Arc::new(SizeAccountant::new(gc_size, options.capacity, Trigger::new()));
        let inner = Arc::new(Inner {
            shed,
            indexes,
            batch_mu: Mutex::new(()),
            accountant: accountant.clone(),
            clock: Clock::new(floor),
            eviction_order: options.eviction_order,
        });

        let mut gc = GarbageCollector::new(inner.clone(), accountant.clone(), &options);
        if let Some(hook) = hook {
            gc = gc.with_hook(hook);
        }
        let stats = gc.stats();
        let gc_target = gc.target();
        let collector = gc.spawn()?;

        info!(
            "Opened local store with {} collectible chunks (capacity {}, eviction order {:?})",
            gc_size, options.capacity, options.eviction_order
        );
        if gc_size >= options.capacity {
            accountant.trigger().request();
        }

        Ok(Self {
            collector,
            inner,
            stats,
            gc_target,
        })
    }

    /// Store a chunk
    ///
    /// Returns false if the chunk was already present.
    pub fn put(&self, chunk: &Chunk) -> Result<bool> {
        Ok(self.put_many(std::slice::from_ref(chunk))? == 1)
    }

    /// Store several chunks in one batch, returning how many were new
    pub fn put_many(&self, chunks: &[Chunk]) -> Result<usize> {
        let inner = &self.inner;
        let _guard = inner.batch_mu.lock();

        let mut batch = Batch::new();
        let mut seen = HashSet::new();
        let mut admitted = 0usize;
        for chunk in chunks {
            let address = *chunk.address();
            if !seen.insert(address) || inner.indexes.has(&address)? {
                continue;
            }
            let now = inner.clock.now();
            let item = IndexItem {
                address,
                data: chunk.data().to_vec(),
                stored_at: now,
                accessed_at: now,
                bin: 0,
            };
            inner.indexes.put_chunk_in_batch(&mut batch, &item)?;
            admitted += 1;
        }

        if admitted == 0 {
            return Ok(0);
        }
        inner.shed.write_batch(batch)?;
        inner.accountant.on_admit(admitted as i64);
        debug!("Admitted {} chunks", admitted);
        Ok(admitted)
    }

    /// Read a chunk
    ///
    /// With [`EvictionOrder::Access`] this also moves the chunk to the back
    /// of the eviction order.
    pub fn get(&self, address: &Address) -> Result<Chunk> {
        let item = match self.inner.eviction_order {
            EvictionOrder::Insertion => self.inner.indexes.retrieve(address)?,
            EvictionOrder::Access => {
                let _guard = self.inner.batch_mu.lock();
                let item = self.inner.indexes.retrieve(address)?;
                if let Some(current) = &item {
                    let mut batch = Batch::new();
                    let now = self.inner.clock.now();
                    self.inner
                        .indexes
                        .update_access_in_batch(&mut batch, current, now)?;
                    self.inner.shed.write_batch(batch)?;
                    debug!("Moved chunk {} to the back of the gc order", address.short());
                }
                item
            }
        };

        let item = item.ok_or(Error::NotFound(*address))?;
        let chunk = Chunk::with_address(item.address, item.data);
        if !chunk.verify() {
            warn!("Stored data of chunk {} does not match its address", address.short());
            return Err(Error::CorruptChunk(*address));
        }
        Ok(chunk)
    }

    pub fn has(&self, address: &Address) -> Result<bool> {
        self.inner.indexes.has(address)
    }

    /// Visit pull index entries of `bin` stored at or after `since`
    pub fn iterate_pull<F>(&self, bin: u8, since: u64, mut visit: F) -> Result<()>
    where
        F: FnMut(&IndexItem) -> Result<bool>,
    {
        let start = IndexItem {
            bin,
            stored_at: since,
            ..IndexItem::default()
        };
        self.inner.indexes.pull().iterate_from(&start, |item| {
            if item.bin != bin {
                return Ok(true);
            }
            visit(&item)
        })
    }

    /// Record chunks admitted outside [`DB::put`]
    pub fn on_admit(&self, count: i64) -> i64 {
        self.inner.accountant.on_admit(count)
    }

    /// Record chunks removed outside the collector
    pub fn on_evicted(&self, count: i64) -> i64 {
        self.inner.accountant.on_evicted(count)
    }

    /// Ask the collector for a pass; coalesces with any pending request
    pub fn request_collection(&self) -> bool {
        self.inner.accountant.trigger().request()
    }

    /// Current accountant value
    pub fn gc_size(&self) -> i64 {
        self.inner.accountant.value()
    }

    /// Number of chunks a pass drains down to
    pub fn gc_target(&self) -> i64 {
        self.gc_target
    }

    /// Accountant and index counts read together
    ///
    /// Taken under the batch lock, so a collection pass or admission is
    /// never half visible.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        let _guard = self.inner.batch_mu.lock();
        Ok(StoreSnapshot {
            gc_size: self.inner.accountant.value(),
            gc_index: self.inner.indexes.gc().count()?,
            pull_index: self.inner.indexes.pull().count()?,
            retrieval: self.inner.indexes.retrieval_count()?,
        })
    }

    /// Entries in the gc index, by full scan
    pub fn gc_index_count(&self) -> Result<usize> {
        self.inner.indexes.gc().count()
    }

    /// Entries in the pull index, by full scan
    pub fn pull_index_count(&self) -> Result<usize> {
        self.inner.indexes.pull().count()
    }

    /// Chunks in the retrieval index, by full scan
    pub fn retrieval_count(&self) -> Result<usize> {
        self.inner.indexes.retrieval_count()
    }

    pub fn collector_state(&self) -> CollectorState {
        self.collector.state()
    }

    pub fn gc_stats(&self) -> GcStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the collector and flush to disk
    pub fn close(mut self) -> Result<()> {
        self.collector.shutdown();
        self.inner.shed.flush()?;
        info!("Closed local store ({} collectible chunks)", self.gc_size());
        Ok(())
    }
}
