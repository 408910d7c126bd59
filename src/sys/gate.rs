use crate::{LmdbError, LmdbResult};
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// How long a waiter blocks before logging that it is stalled.
const STALL_WARN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct GateState {
    owner: Option<u64>,
    /// The owner keeps the gate until it releases it explicitly, rather
    /// than for the length of one call.
    pinned: bool,
    closed: bool,
}

/// An owner-tagged admission gate.
///
/// At most one owner holds the gate at a time. The owner may re-acquire
/// it freely; other callers block until it is released or the gate is
/// closed. Used for the single root writer of an environment and for
/// LMDB's rule that only one transaction at a time may hold unpublished
/// database handles.
///
/// An owner may [`pin`](Self::pin) the gate to hold it past the current
/// call. [`acquire_unless_pinned`](Self::acquire_unless_pinned) fails
/// instead of waiting on a pinned holder, which may be the caller's own
/// thread.
#[derive(Debug)]
pub(crate) struct Gate {
    what: &'static str,
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    /// Creates an open gate. `what` names the guarded resource in logs.
    pub(crate) const fn new(what: &'static str) -> Self {
        Self {
            what,
            state: Mutex::new(GateState { owner: None, pinned: false, closed: false }),
            changed: Condvar::new(),
        }
    }

    /// Blocks until `owner` holds the gate.
    ///
    /// Returns `true` if this call took the gate and `false` if `owner`
    /// already held it. Fails with [`LmdbError::EnvironmentClosed`] once
    /// the gate is closed.
    pub(crate) fn acquire(&self, owner: u64) -> LmdbResult<bool> {
        self.acquire_inner(owner, false)
    }

    /// Like [`acquire`](Self::acquire), but fails with
    /// [`LmdbError::HandleOpenBusy`] while another owner has the gate
    /// pinned. Unpinned holders are waited for.
    pub(crate) fn acquire_unless_pinned(&self, owner: u64) -> LmdbResult<bool> {
        self.acquire_inner(owner, true)
    }

    fn acquire_inner(&self, owner: u64, fail_if_pinned: bool) -> LmdbResult<bool> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(LmdbError::EnvironmentClosed);
            }
            match state.owner {
                None => {
                    state.owner = Some(owner);
                    return Ok(true);
                }
                Some(current) if current == owner => return Ok(false),
                Some(current) if fail_if_pinned && state.pinned => {
                    tracing::debug!(
                        target: "lmdb",
                        waiting = owner,
                        holder = current,
                        "{} pinned by another owner",
                        self.what
                    );
                    return Err(LmdbError::HandleOpenBusy);
                }
                Some(current) => {
                    if self.changed.wait_for(&mut state, STALL_WARN_INTERVAL).timed_out() {
                        tracing::warn!(
                            target: "lmdb",
                            waiting = owner,
                            holder = current,
                            "Process stalled, awaiting {}.",
                            self.what
                        );
                    }
                }
            }
        }
    }

    /// Keeps the gate held by `owner` until it is released. Does nothing
    /// if `owner` does not hold it.
    pub(crate) fn pin(&self, owner: u64) {
        let mut state = self.state.lock();
        if state.owner == Some(owner) && !state.pinned {
            state.pinned = true;
            drop(state);
            // wake waiters that give up on a pinned gate
            self.changed.notify_all();
        }
    }

    /// Releases the gate if `owner` holds it. Returns whether it did.
    pub(crate) fn release(&self, owner: u64) -> bool {
        let mut state = self.state.lock();
        if state.owner != Some(owner) {
            return false;
        }
        state.owner = None;
        state.pinned = false;
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Closes the gate, failing every current and future waiter.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_all();
    }

    /// The current owner, if any.
    #[cfg(test)]
    pub(crate) fn owner(&self) -> Option<u64> {
        self.state.lock().owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn owner_reenters() {
        let gate = Gate::new("test gate");
        assert!(gate.acquire(1).unwrap());
        assert!(!gate.acquire(1).unwrap());
        assert_eq!(gate.owner(), Some(1));
        assert!(!gate.release(2));
        assert!(gate.release(1));
        assert_eq!(gate.owner(), None);
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let gate = Arc::new(Gate::new("test gate"));
        gate.acquire(1).unwrap();

        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.acquire(2))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(gate.owner(), Some(1));
        gate.release(1);

        assert!(waiter.join().unwrap().unwrap());
        assert_eq!(gate.owner(), Some(2));
    }

    #[test]
    fn close_fails_waiters() {
        let gate = Arc::new(Gate::new("test gate"));
        gate.acquire(1).unwrap();

        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.acquire(2))
        };
        thread::sleep(Duration::from_millis(50));
        gate.close();

        assert_eq!(waiter.join().unwrap(), Err(LmdbError::EnvironmentClosed));
        assert_eq!(gate.acquire(1), Err(LmdbError::EnvironmentClosed));
    }

    #[test]
    fn pinned_holder_fails_fast() {
        let gate = Gate::new("test gate");
        assert!(gate.acquire_unless_pinned(1).unwrap());
        gate.pin(1);
        assert_eq!(gate.acquire_unless_pinned(2), Err(LmdbError::HandleOpenBusy));
        // the holder itself re-enters
        assert!(!gate.acquire_unless_pinned(1).unwrap());

        assert!(gate.release(1));
        assert!(gate.acquire_unless_pinned(2).unwrap());
        assert_eq!(gate.owner(), Some(2));
    }

    #[test]
    fn unpinned_holder_is_waited_for() {
        let gate = Arc::new(Gate::new("test gate"));
        gate.acquire_unless_pinned(1).unwrap();

        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.acquire_unless_pinned(2))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(gate.owner(), Some(1));
        gate.release(1);
        assert_eq!(waiter.join().unwrap(), Ok(true));
    }

    #[test]
    fn pin_needs_ownership() {
        let gate = Gate::new("test gate");
        gate.pin(1);
        assert!(gate.acquire_unless_pinned(2).unwrap());
        gate.pin(1);
        assert!(gate.release(2));
    }
}
