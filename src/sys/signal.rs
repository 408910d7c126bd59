//! Closing notifications between structural parents and children.
//!
//! Environments, transactions and cursors form a tree. A child subscribes
//! to its parent's [`ClosingSignal`] with a weak reference to itself, and
//! the parent notifies every live subscriber before it releases its native
//! handle. Parents never own their children.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Implemented by handles that must tear down when their parent closes.
pub(crate) trait CloseListener: Send + Sync {
    /// Called once when the parent closes. Must not fail.
    fn on_close(&self);
}

#[derive(Default)]
struct Listeners {
    fired: bool,
    entries: SmallVec<[(u64, Weak<dyn CloseListener>); 4]>,
}

/// A one-shot broadcast to subscribed children.
#[derive(Default)]
pub(crate) struct ClosingSignal {
    listeners: Mutex<Listeners>,
}

impl ClosingSignal {
    /// Creates a new signal.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `listener`.
    ///
    /// Returns `None` if the signal has already fired; the caller must
    /// treat its parent as closed.
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        listener: Weak<dyn CloseListener>,
    ) -> Option<Subscription> {
        let mut listeners = self.listeners.lock();
        if listeners.fired {
            return None;
        }
        let id = NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed);
        listeners.entries.push((id, listener));
        Some(Subscription { signal: Arc::downgrade(self), id })
    }

    /// Fires the signal, notifying live listeners newest first.
    ///
    /// The listener list is taken out before any listener runs, so a
    /// listener may unsubscribe or subscribe elsewhere without
    /// deadlocking. Later calls are no-ops.
    pub(crate) fn notify(&self) {
        let entries = {
            let mut listeners = self.listeners.lock();
            listeners.fired = true;
            std::mem::take(&mut listeners.entries)
        };
        for (_, listener) in entries.into_iter().rev() {
            if let Some(listener) = listener.upgrade() {
                listener.on_close();
            }
        }
    }

    /// Returns `true` once the signal has fired.
    #[cfg(test)]
    pub(crate) fn has_fired(&self) -> bool {
        self.listeners.lock().fired
    }

    /// Number of registered listeners.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().entries.len()
    }

    fn unsubscribe(&self, id: u64) {
        self.listeners.lock().entries.retain(|(entry, _)| *entry != id);
    }
}

impl std::fmt::Debug for ClosingSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.lock();
        f.debug_struct("ClosingSignal")
            .field("fired", &listeners.fired)
            .field("listeners", &listeners.entries.len())
            .finish()
    }
}

/// Removes its listener from the signal when dropped.
#[derive(Debug)]
pub(crate) struct Subscription {
    signal: Weak<ClosingSignal>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.unsubscribe(self.id);
        }
    }
}
