//! Capacity-bounded garbage collection
//!
//! A single background thread waits for the [`Trigger`] and runs one pass
//! per request. A pass walks the gc index from the lowest priority key,
//! queues the removal of each chunk from every index into one batch, and
//! stops when the store is back at `floor(capacity * gc_target_ratio)` or
//! when `gc_batch_size` chunks are queued. Only a committed batch is
//! subtracted from the [`SizeAccountant`]. A capped pass re-arms the trigger
//! so the next one starts straight away.

use crate::config::Options;
use crate::error::{Error, Result};
use crate::shed::IndexItem;
use crate::size::SizeAccountant;
use crate::trigger::Trigger;
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use parking_lot::MutexGuard;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Called after every pass with the number of chunks it collected
pub type PassHook = Arc<dyn Fn(i64) + Send + Sync>;

/// Index access the collector needs from a store
pub trait GcStore: Send + Sync + 'static {
    /// Pending deletes, applied all at once by [`GcStore::commit`]
    type Batch: Default;

    /// Visit gc index entries in ascending priority until `visit` returns true
    fn iterate_gc_order(
        &self,
        visit: &mut dyn FnMut(&IndexItem) -> Result<bool>,
    ) -> Result<()>;

    /// Queue removal of `item` from every index
    fn delete_in_batch(&self, batch: &mut Self::Batch, item: &IndexItem) -> Result<()>;

    /// Write the batch atomically
    fn commit(&self, batch: Self::Batch) -> Result<()>;

    /// Make committed batches durable
    ///
    /// Runs after the accountant has been updated; a failure here does not
    /// undo the commit.
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    /// Exclude foreground batch writers for the duration of a pass
    fn lock_batches(&self) -> MutexGuard<'_, ()>;
}

/// Collector loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Collecting,
    Closed,
}

impl CollectorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Collecting,
            _ => Self::Closed,
        }
    }
}

#[derive(Default)]
struct StateCell(AtomicU8);

impl StateCell {
    fn set(&self, state: CollectorState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> CollectorState {
        CollectorState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Outcome of a single pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// Chunks queued for removal
    pub collected: i64,
    /// The pass stopped at `gc_batch_size`
    pub capped: bool,
    /// The batch was written
    pub committed: bool,
}

/// Running totals across passes
#[derive(Default)]
pub struct GcStats {
    passes: AtomicU64,
    collected: AtomicU64,
    capped_passes: AtomicU64,
    iteration_failures: AtomicU64,
    commit_failures: AtomicU64,
    sync_failures: AtomicU64,
}

/// Point-in-time copy of [`GcStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStatsSnapshot {
    pub passes: u64,
    /// Chunks removed by committed batches
    pub collected: u64,
    pub capped_passes: u64,
    pub iteration_failures: u64,
    pub commit_failures: u64,
    /// Committed batches that could not be flushed to disk
    pub sync_failures: u64,
}

impl GcStats {
    pub fn snapshot(&self) -> GcStatsSnapshot {
        GcStatsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            collected: self.collected.load(Ordering::Relaxed),
            capped_passes: self.capped_passes.load(Ordering::Relaxed),
            iteration_failures: self.iteration_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            sync_failures: self.sync_failures.load(Ordering::Relaxed),
        }
    }
}

/// Garbage collector bound to one store
pub struct GarbageCollector<S: GcStore> {
    store: Arc<S>,
    accountant: Arc<SizeAccountant>,
    target: i64,
    batch_size: i64,
    hook: Option<PassHook>,
    stats: Arc<GcStats>,
}

impl<S: GcStore> GarbageCollector<S> {
    pub fn new(store: Arc<S>, accountant: Arc<SizeAccountant>, options: &Options) -> Self {
        Self {
            store,
            accountant,
            target: options.gc_target(),
            batch_size: options.gc_batch_size,
            hook: None,
            stats: Arc::new(GcStats::default()),
        }
    }

    /// Install a hook run after every pass
    pub fn with_hook(mut self, hook: PassHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn stats(&self) -> Arc<GcStats> {
        self.stats.clone()
    }

    /// Number of chunks a pass drains down to
    pub fn target(&self) -> i64 {
        self.target
    }

    fn trigger(&self) -> &Trigger {
        self.accountant.trigger()
    }

    /// Run one pass
    ///
    /// Failures are logged and reflected in the report; they never
    /// propagate, so the loop always returns to idle.
    pub fn collect_once(&self) -> PassReport {
        let guard = self.store.lock_batches();

        let mut batch = S::Batch::default();
        let mut collected: i64 = 0;
        let mut capped = false;

        let iterated = self.store.iterate_gc_order(&mut |item| {
            if self.accountant.value() - collected <= self.target {
                return Ok(true);
            }
            self.store.delete_in_batch(&mut batch, item)?;
            collected += 1;
            if collected >= self.batch_size {
                capped = true;
                return Ok(true);
            }
            Ok(false)
        });
        if let Err(e) = iterated {
            self.stats.iteration_failures.fetch_add(1, Ordering::Relaxed);
            let err = Error::Iteration(Box::new(e));
            error!("localstore collect garbage: {}", err);
        }

        let committed = match self.store.commit(batch) {
            Ok(()) => {
                let size = self.accountant.on_evicted(collected);
                self.stats.collected.fetch_add(collected as u64, Ordering::Relaxed);
                if capped {
                    self.stats.capped_passes.fetch_add(1, Ordering::Relaxed);
                    self.trigger().request();
                }
                debug!(
                    "Collected {} chunks (size now {}, target {}, capped: {})",
                    collected, size, self.target, capped
                );
                if let Err(e) = self.store.sync() {
                    self.stats.sync_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("localstore collect garbage flush: {}", e);
                }
                true
            }
            Err(e) => {
                self.stats.commit_failures.fetch_add(1, Ordering::Relaxed);
                let err = Error::Commit(Box::new(e));
                error!("localstore collect garbage write batch: {}", err);
                false
            }
        };
        drop(guard);

        self.stats.passes.fetch_add(1, Ordering::Relaxed);
        if let Some(hook) = &self.hook {
            hook(collected);
        }

        PassReport {
            collected,
            capped,
            committed,
        }
    }

    /// Start the collector thread
    pub fn spawn(self) -> Result<CollectorHandle> {
        let (close_tx, close_rx) = bounded::<()>(0);
        let state = Arc::new(StateCell::default());
        let loop_state = state.clone();

        let handle = std::thread::Builder::new()
            .name("localstore-gc".to_string())
            .spawn(move || self.run(close_rx, &loop_state))
            .map_err(Error::Spawn)?;

        Ok(CollectorHandle {
            close_tx: Some(close_tx),
            handle: Some(handle),
            state,
        })
    }

    fn run(self, close: Receiver<()>, state: &StateCell) {
        info!(
            "Garbage collector started (capacity {}, target {}, batch size {})",
            self.accountant.capacity(),
            self.target,
            self.batch_size
        );
        let requests = self.trigger().receiver().clone();

        loop {
            select! {
                recv(requests) -> msg => {
                    if msg.is_err() {
                        break;
                    }
                    // shutdown wins over a request that raced with it
                    if let Err(TryRecvError::Disconnected) = close.try_recv() {
                        break;
                    }
                    state.set(CollectorState::Collecting);
                    self.collect_once();
                    state.set(CollectorState::Idle);
                },
                recv(close) -> _ => break,
            }
        }

        state.set(CollectorState::Closed);
        info!("Garbage collector stopped");
    }
}

/// Owner of a running collector thread
///
/// Dropping the handle shuts the collector down.
pub struct CollectorHandle {
    close_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    state: Arc<StateCell>,
}

impl CollectorHandle {
    pub fn state(&self) -> CollectorState {
        self.state.get()
    }

    /// Stop the loop and wait for it to exit
    ///
    /// A pass already running is finished first.
    pub fn shutdown(&mut self) {
        // disconnecting the close channel wakes the loop
        self.close_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Garbage collector thread panicked");
            }
        }
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_core::Address;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// In-memory gc index keyed by priority
    #[derive(Default)]
    struct MemStore {
        entries: Mutex<BTreeMap<u64, IndexItem>>,
        batch_mu: Mutex<()>,
        fail_commit: AtomicBool,
        fail_sync: AtomicBool,
        fail_iteration_after: Mutex<Option<usize>>,
        removed: Mutex<Vec<u64>>,
    }

    impl MemStore {
        fn with_items(count: u64) -> Arc<Self> {
            let store = Self::default();
            {
                let mut entries = store.entries.lock();
                for seq in 1..=count {
                    entries.insert(seq, item(seq));
                }
            }
            Arc::new(store)
        }

        fn len(&self) -> usize {
            self.entries.lock().len()
        }

        fn priorities(&self) -> Vec<u64> {
            self.entries.lock().keys().copied().collect()
        }
    }

    fn item(seq: u64) -> IndexItem {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&seq.to_be_bytes());
        IndexItem {
            address: Address::from_bytes(bytes),
            stored_at: seq,
            accessed_at: seq,
            ..IndexItem::default()
        }
    }

    fn injected() -> Error {
        Error::Storage(sled::Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "injected failure",
        )))
    }

    impl GcStore for MemStore {
        type Batch = Vec<IndexItem>;

        fn iterate_gc_order(
            &self,
            visit: &mut dyn FnMut(&IndexItem) -> Result<bool>,
        ) -> Result<()> {
            let snapshot: Vec<IndexItem> = self.entries.lock().values().cloned().collect();
            let fail_after = *self.fail_iteration_after.lock();
            for (i, item) in snapshot.iter().enumerate() {
                if fail_after == Some(i) {
                    return Err(injected());
                }
                if visit(item)? {
                    break;
                }
            }
            Ok(())
        }

        fn delete_in_batch(&self, batch: &mut Self::Batch, item: &IndexItem) -> Result<()> {
            batch.push(item.clone());
            Ok(())
        }

        fn commit(&self, batch: Self::Batch) -> Result<()> {
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(injected());
            }
            let mut entries = self.entries.lock();
            let mut removed = self.removed.lock();
            for item in batch {
                entries.remove(&item.accessed_at);
                removed.push(item.accessed_at);
            }
            Ok(())
        }

        fn sync(&self) -> Result<()> {
            if self.fail_sync.load(Ordering::SeqCst) {
                return Err(injected());
            }
            Ok(())
        }

        fn lock_batches(&self) -> MutexGuard<'_, ()> {
            self.batch_mu.lock()
        }
    }

    fn wait_for_idle(handle: &CollectorHandle) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while handle.state() != CollectorState::Idle {
            assert!(std::time::Instant::now() < deadline, "collector never went idle");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn options(capacity: i64, batch_size: i64) -> Options {
        Options {
            gc_batch_size: batch_size,
            ..Options::with_capacity(capacity)
        }
    }

    fn collector(
        store: &Arc<MemStore>,
        options: &Options,
    ) -> (GarbageCollector<MemStore>, Arc<SizeAccountant>) {
        let accountant = Arc::new(SizeAccountant::new(0, options.capacity, Trigger::new()));
        let gc = GarbageCollector::new(store.clone(), accountant.clone(), options);
        (gc, accountant)
    }

    #[test]
    fn test_single_pass_drains_to_target() {
        let store = MemStore::with_items(150);
        let (gc, accountant) = collector(&store, &options(100, 1000));

        accountant.on_admit(150);
        assert!(accountant.trigger().try_consume());

        let report = gc.collect_once();
        assert_eq!(
            report,
            PassReport {
                collected: 60,
                capped: false,
                committed: true
            }
        );
        assert_eq!(accountant.value(), 90);
        assert_eq!(store.len(), 90);
        assert!(!accountant.trigger().is_pending());
    }

    #[test]
    fn test_removes_lowest_priority_first() {
        let store = MemStore::with_items(150);
        let (gc, accountant) = collector(&store, &options(100, 1000));
        accountant.on_admit(150);

        gc.collect_once();

        let removed = store.removed.lock().clone();
        assert_eq!(removed, (1..=60).collect::<Vec<u64>>());
        assert_eq!(store.priorities().first(), Some(&61));
    }

    #[test]
    fn test_capped_passes_rearm_until_target() {
        let store = MemStore::with_items(200);
        let (gc, accountant) = collector(&store, &options(100, 50));
        accountant.on_admit(200);
        assert!(accountant.trigger().try_consume());

        let first = gc.collect_once();
        assert_eq!((first.collected, first.capped), (50, true));
        assert_eq!(accountant.value(), 150);
        assert!(accountant.trigger().try_consume());

        let second = gc.collect_once();
        assert_eq!((second.collected, second.capped), (50, true));
        assert_eq!(accountant.value(), 100);
        assert!(accountant.trigger().try_consume());

        let third = gc.collect_once();
        assert_eq!((third.collected, third.capped), (10, false));
        assert_eq!(accountant.value(), 90);
        assert!(!accountant.trigger().is_pending());
        assert_eq!(store.len(), 90);

        let stats = gc.stats().snapshot();
        assert_eq!(stats.passes, 3);
        assert_eq!(stats.collected, 110);
        assert_eq!(stats.capped_passes, 2);
    }

    #[test]
    fn test_under_target_collects_nothing() {
        let store = MemStore::with_items(50);
        let (gc, accountant) = collector(&store, &options(100, 1000));
        accountant.on_admit(50);

        let report = gc.collect_once();
        assert_eq!(report.collected, 0);
        assert!(report.committed);
        assert_eq!(accountant.value(), 50);
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn test_commit_failure_leaves_state_untouched() {
        let store = MemStore::with_items(120);
        let (gc, accountant) = collector(&store, &options(100, 1000));
        accountant.on_admit(120);
        store.fail_commit.store(true, Ordering::SeqCst);

        let report = gc.collect_once();
        assert_eq!(report.collected, 30);
        assert!(!report.committed);
        assert_eq!(accountant.value(), 120);
        assert_eq!(store.len(), 120);
        assert_eq!(gc.stats().snapshot().commit_failures, 1);

        // the same 30 chunks are picked up once the store recovers
        store.fail_commit.store(false, Ordering::SeqCst);
        let report = gc.collect_once();
        assert_eq!(report.collected, 30);
        assert!(report.committed);
        assert_eq!(accountant.value(), 90);
        assert_eq!(*store.removed.lock(), (1..=30).collect::<Vec<u64>>());
    }

    #[test]
    fn test_sync_failure_keeps_committed_removal() {
        let store = MemStore::with_items(150);
        let (gc, accountant) = collector(&store, &options(100, 1000));
        accountant.on_admit(150);
        store.fail_sync.store(true, Ordering::SeqCst);

        let report = gc.collect_once();
        assert_eq!(report.collected, 60);
        assert!(report.committed);
        // the batch is applied, so the accountant must follow it
        assert_eq!(store.len(), 90);
        assert_eq!(accountant.value(), 90);

        let stats = gc.stats().snapshot();
        assert_eq!(stats.sync_failures, 1);
        assert_eq!(stats.commit_failures, 0);
        assert_eq!(stats.collected, 60);
    }

    #[test]
    fn test_commit_failure_in_background_loop() {
        let store = MemStore::with_items(120);
        let (tx, rx) = crossbeam_channel::unbounded();
        let (gc, accountant) = collector(&store, &options(100, 1000));
        let gc = gc.with_hook(Arc::new(move |count| {
            let _ = tx.send(count);
        }));
        store.fail_commit.store(true, Ordering::SeqCst);
        let mut handle = gc.spawn().unwrap();

        accountant.on_admit(120);

        let timeout = Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), 30);
        wait_for_idle(&handle);
        assert_eq!(accountant.value(), 120);
        assert_eq!(store.len(), 120);
        assert_eq!(store.priorities().first(), Some(&1));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        store.fail_commit.store(false, Ordering::SeqCst);
        assert!(accountant.trigger().request());

        assert_eq!(rx.recv_timeout(timeout).unwrap(), 30);
        wait_for_idle(&handle);
        assert_eq!(accountant.value(), 90);
        assert_eq!(store.len(), 90);
        assert_eq!(*store.removed.lock(), (1..=30).collect::<Vec<u64>>());

        handle.shutdown();
        assert_eq!(handle.state(), CollectorState::Closed);
    }

    #[test]
    fn test_iteration_failure_commits_partial_batch() {
        let store = MemStore::with_items(150);
        let (gc, accountant) = collector(&store, &options(100, 1000));
        accountant.on_admit(150);
        *store.fail_iteration_after.lock() = Some(20);

        let report = gc.collect_once();
        assert_eq!(report.collected, 20);
        assert!(report.committed);
        assert_eq!(accountant.value(), 130);
        assert_eq!(store.len(), 130);
        assert_eq!(gc.stats().snapshot().iteration_failures, 1);
    }

    #[test]
    fn test_hook_sees_every_pass() {
        let store = MemStore::with_items(120);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = seen.clone();
        let (gc, accountant) = collector(&store, &options(100, 1000));
        let gc = gc.with_hook(Arc::new(move |count| hook_seen.lock().push(count)));
        accountant.on_admit(120);

        store.fail_commit.store(true, Ordering::SeqCst);
        gc.collect_once();
        store.fail_commit.store(false, Ordering::SeqCst);
        gc.collect_once();
        gc.collect_once();

        assert_eq!(*seen.lock(), vec![30, 30, 0]);
    }

    #[test]
    fn test_background_loop_converges() {
        let store = MemStore::with_items(200);
        let (tx, rx) = crossbeam_channel::unbounded();
        let (gc, accountant) = collector(&store, &options(100, 50));
        let gc = gc.with_hook(Arc::new(move |count| {
            let _ = tx.send(count);
        }));
        let mut handle = gc.spawn().unwrap();

        accountant.on_admit(200);

        let timeout = Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), 50);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), 50);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), 10);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(accountant.value(), 90);
        assert_eq!(handle.state(), CollectorState::Idle);

        handle.shutdown();
        assert_eq!(handle.state(), CollectorState::Closed);
    }

    #[test]
    fn test_coalesced_requests_run_one_pass() {
        let store = MemStore::with_items(10);
        let (tx, rx) = crossbeam_channel::unbounded();
        let (gc, accountant) = collector(&store, &options(100, 1000));
        let gc = gc.with_hook(Arc::new(move |count| {
            let _ = tx.send(count);
        }));

        // queue the requests before the loop is running
        for _ in 0..5 {
            accountant.trigger().request();
        }
        let _handle = gc.spawn().unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_shutdown_from_idle() {
        let store = MemStore::with_items(0);
        let (gc, _accountant) = collector(&store, &options(100, 1000));
        let mut handle = gc.spawn().unwrap();
        handle.shutdown();
        assert_eq!(handle.state(), CollectorState::Closed);
        // second shutdown is a no-op
        handle.shutdown();
    }
}
