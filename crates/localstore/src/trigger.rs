//! Coalescing wake-up signal for the garbage collector

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Single-slot collection request
///
/// At most one request is ever pending; requesting while one is queued is a
/// no-op. Clones share the same slot.
#[derive(Clone)]
pub struct Trigger {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Trigger {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Ask for a collection pass without blocking
    ///
    /// Returns true if this call armed the slot, false if a request was
    /// already pending.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => false,
            // we hold a receiver ourselves, so the channel stays connected
            Err(TrySendError::Disconnected(())) => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Drain the pending request, if any
    pub fn try_consume(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Receiving end for the collector loop
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}
