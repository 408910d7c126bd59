//! Environment-wide cache of named database handles.
//!
//! LMDB database handles belong to the environment, not to the transaction
//! that opened them, but they only become usable by other transactions once
//! the opener commits. Until then they are tracked as pending, owned by the
//! opener's lineage (its root transaction and every nested child).
//!
//! LMDB also requires that only one transaction at a time holds unpublished
//! handle opens, and that a transaction never opens a handle after another
//! one was published, since it would reuse the published slot. The cache
//! enforces both: native opens happen behind a gate owned by one lineage,
//! and every transaction records the publication sequence it began at.
//!
//! Most opens never leave anything pending. Existing databases are opened
//! in a scratch read-only transaction that commits at once, publishing the
//! handle, and the gate is held only for that call. A lineage keeps the
//! gate pinned only while it holds pending handles, and other lineages
//! fail with [`LmdbError::HandleOpenBusy`] rather than wait for it.

use crate::{
    Database, LmdbError, LmdbResult,
    flags::DatabaseFlags,
    sys::{EnvPtr, gate::Gate},
};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// The identity a transaction presents to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Viewer {
    /// The transaction itself.
    pub(crate) id: u64,
    /// Root of its lineage.
    pub(crate) root: u64,
    /// Publication sequence observed before the root began.
    pub(crate) begin_seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    opener: u64,
    lineage: u64,
}

/// Cached database entry.
#[derive(Debug, Clone)]
struct CachedDb {
    name: Box<str>,
    dbi: ffi::MDB_dbi,
    /// Flags stored for the database.
    flags: DatabaseFlags,
    /// Flags of the open that created the entry.
    requested: DatabaseFlags,
    generation: u64,
    pending: Option<Pending>,
    published_at: u64,
}

impl CachedDb {
    fn visible_to(&self, viewer: Viewer) -> bool {
        match self.pending {
            Some(pending) => pending.lineage == viewer.root,
            None => self.published_at <= viewer.begin_seq,
        }
    }

    const fn handle(&self) -> Handle {
        Handle { dbi: self.dbi, flags: self.flags, generation: self.generation }
    }
}

/// The parts of a cached entry a transaction needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Handle {
    pub(crate) dbi: ffi::MDB_dbi,
    pub(crate) flags: DatabaseFlags,
    pub(crate) generation: u64,
}

/// Result of looking a name up for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    Visible(Handle),
    /// Published after the transaction began.
    Hidden,
    /// Pending in another lineage.
    Pending,
    Absent,
}

/// Cache of named database handles, shared by every transaction of one
/// environment.
///
/// Uses inline storage for the common case (most apps use < 16 databases).
#[derive(Debug)]
pub(crate) struct DbCache {
    entries: RwLock<SmallVec<[CachedDb; 16]>>,
    gate: Gate,
    publish_seq: AtomicU64,
}

impl DbCache {
    /// Creates a new empty cache.
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(SmallVec::new()),
            gate: Gate::new("database handle opens"),
            publish_seq: AtomicU64::new(0),
        }
    }

    /// The current publication sequence. Load it before beginning a root
    /// transaction.
    pub(crate) fn publish_seq(&self) -> u64 {
        self.publish_seq.load(Ordering::Acquire)
    }

    /// Look up `name` on behalf of `viewer`.
    pub(crate) fn lookup(&self, name: &str, viewer: Viewer) -> Lookup {
        let entries = self.entries.read();
        match entries.iter().find(|entry| &*entry.name == name) {
            Some(entry) if entry.visible_to(viewer) => Lookup::Visible(entry.handle()),
            Some(entry) if entry.pending.is_some() => Lookup::Pending,
            Some(_) => Lookup::Hidden,
            None => Lookup::Absent,
        }
    }

    /// Checks that `db` is still cached and visible to `viewer`.
    pub(crate) fn check(&self, db: &Database, viewer: Viewer) -> LmdbResult<()> {
        if db.is_main() {
            return Ok(());
        }
        let entries = self.entries.read();
        match entries.iter().find(|entry| entry.generation == db.generation()) {
            Some(entry) if entry.visible_to(viewer) => Ok(()),
            Some(_) => Err(LmdbError::HandleNotVisible),
            None => Err(LmdbError::StaleDatabase),
        }
    }

    /// Takes the open gate for `viewer`'s lineage. Returns `true` if this
    /// call took it.
    ///
    /// Waits for an open in progress elsewhere, but fails with
    /// [`LmdbError::HandleOpenBusy`] if another lineage holds pending
    /// handles.
    pub(crate) fn acquire_gate(&self, viewer: Viewer) -> LmdbResult<bool> {
        self.gate.acquire_unless_pinned(viewer.root)
    }

    /// Settles the gate after a native open or drop by the lineage rooted
    /// at `root`: pinned while the lineage holds pending handles, released
    /// otherwise if `acquired` says this call took it.
    pub(crate) fn settle_gate(&self, root: u64, acquired: bool) {
        if self.has_pending(root) {
            self.gate.pin(root);
        } else if acquired {
            self.gate.release(root);
        }
    }

    /// Keeps the gate with the lineage rooted at `root` until it ends.
    pub(crate) fn pin_gate(&self, root: u64) {
        self.gate.pin(root);
    }

    fn has_pending(&self, root: u64) -> bool {
        self.entries.read().iter().any(|entry| entry.pending.is_some_and(|p| p.lineage == root))
    }

    /// Releases the open gate held by the lineage rooted at `root`.
    pub(crate) fn release_gate(&self, root: u64) {
        self.gate.release(root);
    }

    /// Fails every current and future gate waiter.
    pub(crate) fn close_gate(&self) {
        self.gate.close();
    }

    /// Records a handle just opened natively by `viewer`.
    ///
    /// If the name is already cached the existing entry wins and its handle
    /// is returned.
    pub(crate) fn insert(
        &self,
        name: &str,
        dbi: ffi::MDB_dbi,
        flags: DatabaseFlags,
        requested: DatabaseFlags,
        viewer: Viewer,
    ) -> Handle {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter().find(|entry| &*entry.name == name) {
            // Another lineage cannot hold the gate, so this is our own entry.
            return entry.handle();
        }
        let entry = CachedDb {
            name: name.into(),
            dbi,
            flags,
            requested,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            pending: Some(Pending { opener: viewer.id, lineage: viewer.root }),
            published_at: 0,
        };
        let handle = entry.handle();
        entries.push(entry);
        handle
    }

    /// Records a handle opened and committed by a scratch transaction. It
    /// is published at once, at a new sequence.
    ///
    /// If the name is already cached the existing entry wins and its handle
    /// is returned.
    pub(crate) fn insert_published(
        &self,
        name: &str,
        dbi: ffi::MDB_dbi,
        flags: DatabaseFlags,
    ) -> Handle {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter().find(|entry| &*entry.name == name) {
            return entry.handle();
        }
        let seq = self.publish_seq.load(Ordering::Acquire) + 1;
        let entry = CachedDb {
            name: name.into(),
            dbi,
            flags,
            requested: DatabaseFlags::empty(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            pending: None,
            published_at: seq,
        };
        let handle = entry.handle();
        entries.push(entry);
        self.publish_seq.store(seq, Ordering::Release);
        tracing::trace!(target: "lmdb", name, dbi, seq, "database handle published");
        handle
    }

    /// Refreshes the stored flags of an entry.
    pub(crate) fn set_flags(&self, generation: u64, flags: DatabaseFlags) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|entry| entry.generation == generation) {
            entry.flags = flags;
        }
    }

    /// Publishes every handle pending in the lineage rooted at `root`.
    ///
    /// Called after the root's native commit.
    pub(crate) fn publish(&self, root: u64) {
        let mut entries = self.entries.write();
        let seq = self.publish_seq.load(Ordering::Acquire) + 1;
        let mut published = 0usize;
        for entry in entries.iter_mut() {
            if entry.pending.is_some_and(|p| p.lineage == root) {
                entry.pending = None;
                entry.published_at = seq;
                published += 1;
            }
        }
        if published > 0 {
            self.publish_seq.store(seq, Ordering::Release);
            tracing::trace!(target: "lmdb", root, published, seq, "database handles published");
        }
    }

    /// Hands the pending handles of a committed nested transaction to its
    /// parent.
    pub(crate) fn adopt(&self, child: u64, parent: u64) {
        let mut entries = self.entries.write();
        for entry in entries.iter_mut() {
            if let Some(pending) = entry.pending.as_mut().filter(|p| p.opener == child) {
                pending.opener = parent;
            }
        }
    }

    /// Forgets the handles `opener` opened. LMDB closes them when the
    /// opener aborts or resets.
    pub(crate) fn evict_opened_by(&self, opener: u64) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.pending.is_none_or(|p| p.opener != opener));
        if entries.len() != before {
            tracing::trace!(
                target: "lmdb",
                opener,
                evicted = before - entries.len(),
                "pending database handles evicted"
            );
        }
    }

    /// Forgets one handle, after it was dropped.
    pub(crate) fn evict(&self, generation: u64) {
        self.entries.write().retain(|entry| entry.generation != generation);
    }

    /// Closes every published handle. Only called while closing the
    /// environment, after every transaction ended.
    pub(crate) fn close_all(&self, env: EnvPtr) {
        let mut entries = self.entries.write();
        for entry in entries.drain(..) {
            if entry.pending.is_none() {
                unsafe { ffi::mdb_dbi_close(env.0, entry.dbi) };
            } else {
                tracing::debug!(
                    target: "lmdb",
                    name = %entry.name,
                    requested = ?entry.requested,
                    "pending database handle survived its transaction"
                );
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl Default for DbCache {
    fn default() -> Self {
        Self::new()
    }
}
