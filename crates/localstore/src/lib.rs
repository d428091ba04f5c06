//! Capacity-bounded local chunk store
//!
//! This crate provides:
//! - Prefixed indexes over a single sled tree (atomic multi-index batches)
//! - Retrieval, pull and gc indexes for content-addressed chunks
//! - A lock-free size accountant with a coalescing collection trigger
//! - A background garbage collector draining the store below capacity

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod gc;
pub mod indexes;
pub mod shed;
pub mod size;
pub mod trigger;

// Re-exports
pub use config::{EvictionOrder, Options};
pub use db::{StoreSnapshot, DB};
pub use error::{Error, Result};
pub use gc::{
    CollectorHandle, CollectorState, GarbageCollector, GcStatsSnapshot, GcStore, PassHook,
    PassReport,
};
pub use shed::{Batch, IndexItem};
pub use size::SizeAccountant;
pub use trigger::Trigger;
