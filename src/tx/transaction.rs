use crate::{
    Cursor, Database, Environment, LmdbError, LmdbResult, Stat, TransactionState, ValueView,
    entries::val::PinnedVal,
    error::lmdb_result,
    flags::{DatabaseFlags, TransactionFlags, WriteFlags},
    sys::{
        signal::{CloseListener, ClosingSignal, Subscription},
        txn_manager::{LifecycleHandle, RawTxPtr},
    },
    tx::{
        assertions,
        cache::{Handle, Lookup, Viewer},
        new_span, next_txn_id, ops,
    },
};
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use std::{
    ffi::{CStr, c_uint},
    fmt, mem, ptr, slice,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::instrument;

/// Everything needed to assemble a [`Transaction`] around a native handle
/// that was just begun.
pub(crate) struct TxParts<'a> {
    pub(crate) env: Environment,
    pub(crate) parent: Option<Arc<TxInner>>,
    pub(crate) ptr: *mut ffi::MDB_txn,
    pub(crate) flags: TransactionFlags,
    pub(crate) id: u64,
    pub(crate) root: u64,
    pub(crate) read_only: bool,
    pub(crate) begin_seq: u64,
    pub(crate) lifecycle: Option<LifecycleHandle>,
    pub(crate) signal: &'a Arc<ClosingSignal>,
    pub(crate) span: tracing::Span,
}

/// How a transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndMode {
    Commit,
    Abort,
    Reset,
    /// Aborted because the parent or the environment is closing. The
    /// parent is already locked by the caller.
    Cascade,
}

/// The mutable part of a transaction, guarded by its lock.
#[derive(Debug)]
pub(crate) struct TxCore {
    pub(crate) ptr: *mut ffi::MDB_txn,
    pub(crate) state: TransactionState,
    /// Bumped by every write and every state change. Views created under
    /// an older epoch are stale.
    pub(crate) epoch: u64,
    /// Bumped by every renew. Cursors renew themselves when it changes.
    pub(crate) incarnation: u64,
    /// Set by the first operation that goes through the native
    /// transaction. Until then a root may move to a newer snapshot.
    pub(crate) used: bool,
}

// SAFETY: the pointer is only dereferenced under the transaction lock, and
// environments are opened with NO_TLS so native transactions are not bound
// to a thread.
unsafe impl Send for TxCore {}

/// Internals of a transaction, shared with its views, cursors and nested
/// children.
pub(crate) struct TxInner {
    id: u64,
    root: u64,
    read_only: bool,
    flags: TransactionFlags,
    begin_seq: AtomicU64,
    env: Environment,
    parent: Option<Arc<TxInner>>,
    lifecycle: Option<LifecycleHandle>,
    core: Mutex<TxCore>,
    /// Fired when the transaction ends, closing cursors and children.
    signal: Arc<ClosingSignal>,
    /// Our registration with the parent's or the environment's signal.
    subscription: Mutex<Option<Subscription>>,
    span: tracing::Span,
}

impl TxInner {
    /// Acquires the transaction lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, TxCore> {
        if let Some(lock) = self.core.try_lock() {
            lock
        } else {
            tracing::trace!(
                target: "lmdb",
                txn_id = self.id,
                backtrace = %std::backtrace::Backtrace::capture(),
                "Transaction lock is already acquired, blocking...
                To display the full backtrace, run with `RUST_BACKTRACE=full` env variable."
            );
            self.core.lock()
        }
    }

    pub(crate) fn viewer(&self) -> Viewer {
        Viewer { id: self.id, root: self.root, begin_seq: self.begin_seq.load(Ordering::Acquire) }
    }

    pub(crate) const fn signal(&self) -> &Arc<ClosingSignal> {
        &self.signal
    }

    /// Runs `f` with the core locked, failing unless the transaction is
    /// active. Fatal errors returned by `f` poison the environment.
    pub(crate) fn with_active<T>(
        &self,
        f: impl FnOnce(&mut TxCore) -> LmdbResult<T>,
    ) -> LmdbResult<T> {
        let mut core = self.lock();
        if core.state != TransactionState::Active {
            return Err(LmdbError::TxnNotActive(core.state));
        }
        core.used = true;
        f(&mut core).inspect_err(|err| self.env.latch(*err))
    }

    /// Like [`with_active`](Self::with_active), for reads that do not
    /// depend on the snapshot. The transaction stays unused.
    fn peek_active<T>(&self, f: impl FnOnce(&mut TxCore) -> LmdbResult<T>) -> LmdbResult<T> {
        let mut core = self.lock();
        if core.state != TransactionState::Active {
            return Err(LmdbError::TxnNotActive(core.state));
        }
        f(&mut core).inspect_err(|err| self.env.latch(*err))
    }

    /// Returns `true` if a view taken at `epoch` can still be read.
    pub(crate) fn view_epoch_matches(&self, epoch: u64) -> bool {
        let core = self.lock();
        core.state == TransactionState::Active && core.epoch == epoch
    }

    /// Runs `f` with the core locked if a view taken at `epoch` is still
    /// valid.
    pub(crate) fn with_view<R>(&self, epoch: u64, f: impl FnOnce() -> R) -> LmdbResult<R> {
        let core = self.lock();
        if core.state != TransactionState::Active || core.epoch != epoch {
            return Err(LmdbError::StaleView);
        }
        Ok(f())
    }

    fn end(&self, mode: EndMode) -> LmdbResult<()> {
        {
            let core = self.lock();
            if core.state.is_terminal() {
                return match mode {
                    EndMode::Commit | EndMode::Reset => Err(LmdbError::TxnNotActive(core.state)),
                    EndMode::Abort | EndMode::Cascade => Ok(()),
                };
            }
        }

        // Lock order is parent before child. A cascade runs under the
        // parent's lock already.
        let mut parent_core = match (&self.parent, mode) {
            (Some(parent), EndMode::Commit | EndMode::Abort) => Some(parent.lock()),
            _ => None,
        };
        let mut core = self.lock();

        match (mode, core.state) {
            (EndMode::Commit | EndMode::Reset, TransactionState::Active) => {}
            (EndMode::Commit | EndMode::Reset, state) => {
                return Err(LmdbError::TxnNotActive(state));
            }
            (EndMode::Abort | EndMode::Cascade, TransactionState::Active)
            | (EndMode::Abort | EndMode::Cascade, TransactionState::Reset) => {}
            (EndMode::Abort | EndMode::Cascade, _) => return Ok(()),
        }

        if mode != EndMode::Reset {
            self.signal.notify();
        }

        let res = self.end_native(mode, core.ptr);

        core.epoch += 1;
        core.state = match (mode, &res) {
            (EndMode::Reset, _) => TransactionState::Reset,
            (EndMode::Commit, Ok(())) => TransactionState::Committed,
            _ => TransactionState::Aborted,
        };
        if mode != EndMode::Reset {
            core.ptr = ptr::null_mut();
        }
        if let Some(parent_core) = parent_core.as_mut() {
            parent_core.epoch += 1;
        }

        let dbs = self.env.dbs();
        match (core.state, &self.parent) {
            (TransactionState::Committed, Some(parent)) => dbs.adopt(self.id, parent.id),
            (TransactionState::Committed, None) => dbs.publish(self.root),
            _ => dbs.evict_opened_by(self.id),
        }
        if self.parent.is_none() {
            if !self.read_only && mode != EndMode::Reset {
                self.env.release_writer(self.id);
            }
            dbs.release_gate(self.id);
        }
        if mode != EndMode::Reset {
            self.subscription.lock().take();
        }

        match &res {
            Ok(()) => tracing::debug!(
                target: "lmdb",
                parent: &self.span,
                state = %core.state,
                "transaction ended"
            ),
            Err(err) => {
                self.env.latch(*err);
                tracing::debug!(
                    target: "lmdb",
                    parent: &self.span,
                    state = %core.state,
                    %err,
                    "transaction ended with error"
                );
            }
        }
        res
    }

    fn end_native(&self, mode: EndMode, txn: *mut ffi::MDB_txn) -> LmdbResult<()> {
        if txn.is_null() {
            // lost while moving to a newer snapshot
            return Ok(());
        }
        if self.read_only {
            // SAFETY: `txn` is live, or reset when aborting. The caller
            // holds the lock.
            return match mode {
                EndMode::Commit => lmdb_result(unsafe { ffi::mdb_txn_commit(txn) }),
                EndMode::Reset => {
                    unsafe { ffi::mdb_txn_reset(txn) };
                    Ok(())
                }
                EndMode::Abort | EndMode::Cascade => {
                    unsafe { ffi::mdb_txn_abort(txn) };
                    Ok(())
                }
            };
        }
        let lifecycle = self.lifecycle.as_ref().ok_or(LmdbError::EnvironmentClosed)?;
        match mode {
            EndMode::Commit => lifecycle.commit(RawTxPtr(txn), self.span.clone()),
            EndMode::Abort | EndMode::Cascade => lifecycle.abort(RawTxPtr(txn), self.span.clone()),
            EndMode::Reset => Err(LmdbError::ReadOnlyRequired),
        }
    }
}

impl CloseListener for TxInner {
    fn on_close(&self) {
        if let Err(err) = self.end(EndMode::Cascade) {
            tracing::debug!(target: "lmdb", parent: &self.span, %err, "cascading abort failed");
        }
    }
}

impl fmt::Debug for TxInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxInner")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

/// An LMDB transaction.
///
/// All database operations require a transaction. A transaction is either
/// read-only, working on a snapshot, or read-write. There is at most one
/// live root read-write transaction per environment; read-write
/// transactions may be nested with [`Transaction::begin_nested_txn`].
///
/// Ending a transaction ends its cursors and nested children first. Its
/// environment closing ends it too. Dropping a transaction that is still
/// live aborts it.
pub struct Transaction {
    inner: Arc<TxInner>,
}

impl Transaction {
    pub(crate) fn from_parts(parts: TxParts<'_>) -> LmdbResult<Self> {
        let TxParts {
            env,
            parent,
            ptr,
            flags,
            id,
            root,
            read_only,
            begin_seq,
            lifecycle,
            signal,
            span,
        } = parts;

        let mut subscribed = false;
        let inner = Arc::new_cyclic(|weak: &Weak<TxInner>| {
            let listener: Weak<dyn CloseListener> = weak.clone();
            let subscription = signal.subscribe(listener);
            subscribed = subscription.is_some();
            TxInner {
                id,
                root,
                read_only,
                flags,
                begin_seq: AtomicU64::new(begin_seq),
                env,
                parent,
                lifecycle,
                core: Mutex::new(TxCore {
                    ptr,
                    state: TransactionState::Active,
                    epoch: 0,
                    incarnation: 0,
                    used: false,
                }),
                signal: ClosingSignal::new(),
                subscription: Mutex::new(subscription),
                span,
            }
        });
        let txn = Self { inner };

        if !subscribed {
            // The parent closed while we were beginning.
            txn.inner.end(EndMode::Cascade)?;
            return Err(LmdbError::EnvironmentClosed);
        }
        tracing::debug!(target: "lmdb", parent: &txn.inner.span, "transaction began");
        Ok(txn)
    }

    pub(crate) fn inner(&self) -> &TxInner {
        &self.inner
    }

    #[inline]
    fn txn_execute<T>(&self, f: impl FnOnce(&mut TxCore) -> LmdbResult<T>) -> LmdbResult<T> {
        self.inner.with_active(f)
    }

    fn require_rw(&self) -> LmdbResult<()> {
        if self.inner.read_only { Err(LmdbError::ReadWriteRequired) } else { Ok(()) }
    }

    /// Checks that `db` belongs to this environment and is visible here.
    ///
    /// An unused root moves to a newer snapshot to see a handle published
    /// after it began.
    pub(crate) fn check_db(&self, db: &Database) -> LmdbResult<()> {
        if db.env_id() != self.inner.env.id() {
            return Err(LmdbError::EnvironmentMismatch);
        }
        let dbs = self.inner.env.dbs();
        match dbs.check(db, self.inner.viewer()) {
            Err(LmdbError::HandleNotVisible) if self.refresh_snapshot()? => {
                dbs.check(db, self.inner.viewer())
            }
            res => res,
        }
    }

    /// Moves a root transaction that has not been used yet to the newest
    /// snapshot, so that it sees every handle published since it began.
    ///
    /// Returns `false`, changing nothing, for nested or used transactions.
    /// A read-only transaction is reset and renewed in place; a read-write
    /// one is aborted and begun again, keeping the writer slot. If the
    /// read-write one cannot be begun again it ends aborted.
    fn refresh_snapshot(&self) -> LmdbResult<bool> {
        if self.inner.parent.is_some() {
            return Ok(false);
        }
        let mut core = self.inner.lock();
        if core.state != TransactionState::Active {
            return Err(LmdbError::TxnNotActive(core.state));
        }
        if core.used {
            return Ok(false);
        }

        let seq = self.inner.env.dbs().publish_seq();
        if self.inner.read_only {
            // SAFETY: the transaction is live and we hold its lock.
            unsafe { ffi::mdb_txn_reset(core.ptr) };
            if let Err(err) = lmdb_result(unsafe { ffi::mdb_txn_renew(core.ptr) }) {
                core.state = TransactionState::Reset;
                core.epoch += 1;
                self.inner.env.latch(err);
                return Err(err);
            }
        } else {
            let lifecycle = self.inner.lifecycle.clone().ok_or(LmdbError::EnvironmentClosed)?;
            let span = self.inner.span.clone();
            let stale = mem::replace(&mut core.ptr, ptr::null_mut());
            let begun = lifecycle.abort(RawTxPtr(stale), span.clone()).and_then(|()| {
                lifecycle.begin(RawTxPtr(ptr::null_mut()), self.inner.flags.bits(), span)
            });
            match begun {
                Ok(fresh) => core.ptr = fresh.0,
                Err(err) => {
                    drop(core);
                    self.inner.env.latch(err);
                    self.inner.end(EndMode::Abort)?;
                    return Err(err);
                }
            }
        }
        self.inner.begin_seq.store(seq, Ordering::Release);
        core.epoch += 1;
        core.incarnation += 1;
        tracing::trace!(target: "lmdb", parent: &self.inner.span, seq, "moved to newer snapshot");
        Ok(true)
    }

    /// Returns the environment that owns this transaction.
    pub fn env(&self) -> &Environment {
        &self.inner.env
    }

    /// Returns the process-unique transaction id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns the id of the parent transaction, if nested.
    pub fn parent_id(&self) -> Option<u64> {
        self.inner.parent.as_ref().map(|parent| parent.id)
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    /// Returns `true` for read-only transactions.
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    /// Commits the transaction.
    ///
    /// Children and cursors are ended first. If the native commit fails,
    /// the transaction is aborted and the error returned.
    #[instrument(skip(self), parent = &self.inner.span, level = "debug", target = "lmdb")]
    pub fn commit(self) -> LmdbResult<()> {
        self.inner.end(EndMode::Commit)
    }

    /// Aborts the transaction, discarding its writes. Does nothing if it
    /// has already ended.
    #[instrument(skip(self), parent = &self.inner.span, level = "debug", target = "lmdb")]
    pub fn abort(self) {
        if let Err(err) = self.inner.end(EndMode::Abort) {
            tracing::debug!(target: "lmdb", %err, "abort failed");
        }
    }

    /// Releases the snapshot of a read-only transaction, keeping its reader
    /// slot and cursors for a later [`renew`](Self::renew).
    ///
    /// Views taken before the reset become stale.
    pub fn reset(&self) -> LmdbResult<()> {
        if !self.inner.read_only {
            return Err(LmdbError::ReadOnlyRequired);
        }
        self.inner.end(EndMode::Reset)
    }

    /// Acquires a fresh snapshot for a reset read-only transaction.
    ///
    /// Cursors of the transaction renew themselves on their next use.
    pub fn renew(&self) -> LmdbResult<()> {
        let mut core = self.inner.lock();
        if core.state != TransactionState::Reset {
            return Err(LmdbError::NotReset);
        }
        let seq = self.inner.env.dbs().publish_seq();
        lmdb_result(unsafe { ffi::mdb_txn_renew(core.ptr) })
            .inspect_err(|err| self.inner.env.latch(*err))?;
        self.inner.begin_seq.store(seq, Ordering::Release);
        core.state = TransactionState::Active;
        core.epoch += 1;
        core.incarnation += 1;
        core.used = false;
        Ok(())
    }

    /// Begins a new nested transaction inside of this transaction.
    ///
    /// The parent cannot be used until the child ends. Committing the child
    /// merges its writes into the parent; aborting it discards them.
    pub fn begin_nested_txn(&self) -> LmdbResult<Self> {
        self.require_rw()?;
        if self.inner.env.is_write_map() {
            return Err(LmdbError::NestedTransactionsUnsupportedWithWriteMap);
        }
        let lifecycle = self.inner.lifecycle.clone().ok_or(LmdbError::EnvironmentClosed)?;
        let id = next_txn_id();
        let span = new_span(false, id);

        self.txn_execute(|core| {
            let ptr = lifecycle.begin(RawTxPtr(core.ptr), 0, span.clone())?;
            core.epoch += 1;
            Self::from_parts(TxParts {
                env: self.inner.env.clone(),
                parent: Some(Arc::clone(&self.inner)),
                ptr: ptr.0,
                flags: TransactionFlags::empty(),
                id,
                root: self.inner.root,
                read_only: false,
                begin_seq: self.inner.begin_seq.load(Ordering::Acquire),
                lifecycle: Some(lifecycle.clone()),
                signal: &self.inner.signal,
                span,
            })
        })
    }

    /// Opens a handle to a database.
    ///
    /// If `name` is `None`, then the returned handle will be for the default
    /// database.
    ///
    /// If `name` is not `None`, then the returned handle will be for a named
    /// database. In this case the environment must be configured to allow
    /// named databases through
    /// [`EnvironmentBuilder::set_max_dbs()`](crate::EnvironmentBuilder::set_max_dbs).
    ///
    /// Handles are cached per environment: opening the same name again, in
    /// this or any later transaction, returns the same handle.
    ///
    /// A root transaction that has not read or written yet opens existing
    /// databases in a scratch transaction that commits at once, so the
    /// handle is shared right away. The root then moves to the newest
    /// snapshot before its first read. Once a transaction has been used,
    /// it opens handles itself, and they stay private to its lineage until
    /// the root commits. Meanwhile other transactions cannot open uncached
    /// names and fail with [`LmdbError::HandleOpenBusy`].
    ///
    /// The database name MAY NOT contain the null character.
    pub fn open_db(&self, name: Option<&str>) -> LmdbResult<Database> {
        self.open_db_with_flags(name, DatabaseFlags::empty())
    }

    /// Opens a handle to a database, requiring the database to carry the
    /// persistent bits of `flags`.
    ///
    /// Fails with [`LmdbError::IncompatibleFlags`] when the stored flags do
    /// not include them.
    pub fn open_db_with_flags(
        &self,
        name: Option<&str>,
        flags: DatabaseFlags,
    ) -> LmdbResult<Database> {
        if flags.contains(DatabaseFlags::CREATE) {
            self.require_rw()?;
        }
        let Some(name) = name else {
            return self.open_main(flags);
        };

        let requested = flags.persistent();
        if let Some(db) = self.open_cached(name, requested)? {
            return Ok(db);
        }

        let mut c_name_buf = SmallVec::<[u8; 32]>::new();
        c_name_buf.extend_from_slice(name.as_bytes());
        c_name_buf.push(0);
        let c_name =
            CStr::from_bytes_with_nul(&c_name_buf).map_err(|_| LmdbError::InvalidParameter)?;

        if self.is_unused_root() {
            match self.open_published(name, c_name) {
                Ok(()) => {
                    return self.open_cached(name, requested)?.ok_or(LmdbError::NotFound);
                }
                Err(LmdbError::NotFound) if flags.contains(DatabaseFlags::CREATE) => {}
                Err(err) => return Err(err),
            }
        }
        self.open_pending(name, c_name, flags)
    }

    /// Opens a handle to a database, creating the database if necessary.
    ///
    /// Only valid in read-write transactions. An existing database keeps
    /// its flags, and the open fails if they do not include the requested
    /// ones.
    pub fn create_db(&self, name: Option<&str>, flags: DatabaseFlags) -> LmdbResult<Database> {
        self.require_rw()?;
        self.open_db_with_flags(name, flags | DatabaseFlags::CREATE)
    }

    fn open_main(&self, flags: DatabaseFlags) -> LmdbResult<Database> {
        let requested = flags.persistent();
        let env_id = self.inner.env.id();
        let open = |core: &mut TxCore| -> LmdbResult<Database> {
            let open_flags = if self.inner.read_only { DatabaseFlags::empty() } else { flags };
            let dbi = unsafe { ops::dbi_open(core.ptr, None, open_flags) }?;
            let actual = unsafe { ops::dbi_flags(core.ptr, dbi) }?;
            if !actual.contains(requested) {
                return Err(LmdbError::IncompatibleFlags {
                    requested: requested.bits(),
                    actual: actual.bits(),
                });
            }
            Ok(Database::new(dbi, actual, Database::MAIN_GENERATION, env_id))
        };
        // a read-write open may store new flags for the main database
        if self.inner.read_only { self.inner.peek_active(open) } else { self.txn_execute(open) }
    }

    /// Resolves `name` from the cache. `None` if it is not cached.
    ///
    /// A handle published after this transaction began is only usable once
    /// an unused root moved to a newer snapshot.
    fn open_cached(&self, name: &str, requested: DatabaseFlags) -> LmdbResult<Option<Database>> {
        let dbs = self.inner.env.dbs();
        let handle = match dbs.lookup(name, self.inner.viewer()) {
            Lookup::Visible(handle) => handle,
            Lookup::Hidden if self.refresh_snapshot()? => {
                match dbs.lookup(name, self.inner.viewer()) {
                    Lookup::Visible(handle) => handle,
                    Lookup::Absent => return Ok(None),
                    Lookup::Hidden | Lookup::Pending => return Err(LmdbError::HandleNotVisible),
                }
            }
            Lookup::Hidden | Lookup::Pending => return Err(LmdbError::HandleNotVisible),
            Lookup::Absent => return Ok(None),
        };
        self.reconcile(handle, requested).map(Some)
    }

    fn is_unused_root(&self) -> bool {
        if self.inner.parent.is_some() {
            return false;
        }
        let core = self.inner.lock();
        core.state == TransactionState::Active && !core.used
    }

    /// Opens an existing database in a scratch read-only transaction and
    /// publishes the handle. The open gate is held only for the native
    /// call.
    fn open_published(&self, name: &str, c_name: &CStr) -> LmdbResult<()> {
        let dbs = self.inner.env.dbs();
        let viewer = self.inner.viewer();
        let acquired = dbs.acquire_gate(viewer)?;

        // Another thread may have opened it while we waited.
        let res = if dbs.lookup(name, viewer) == Lookup::Absent {
            self.inner
                .env
                .with_scratch_txn(|txn| {
                    let dbi = unsafe { ops::dbi_open(txn, Some(c_name), DatabaseFlags::empty()) }?;
                    let flags = unsafe { ops::dbi_flags(txn, dbi) }?;
                    Ok((dbi, flags))
                })
                .map(|(dbi, flags)| {
                    let handle = dbs.insert_published(name, dbi, flags);
                    tracing::trace!(
                        target: "lmdb",
                        parent: &self.inner.span,
                        name,
                        dbi = handle.dbi,
                        "database handle opened and published"
                    );
                })
        } else {
            Ok(())
        };
        dbs.settle_gate(viewer.root, acquired);
        res
    }

    /// Opens a handle in this transaction. It stays pending in the lineage,
    /// which keeps the open gate until the root ends.
    fn open_pending(
        &self,
        name: &str,
        c_name: &CStr,
        flags: DatabaseFlags,
    ) -> LmdbResult<Database> {
        let requested = flags.persistent();
        let viewer = self.inner.viewer();
        let dbs = self.inner.env.dbs();
        let acquired = self.acquire_open_gate(viewer)?;

        let res = (|| {
            // Another lineage may have published or evicted while we waited.
            if let Some(db) = self.open_cached(name, requested)? {
                return Ok(db);
            }
            // A newer handle may occupy the slot LMDB would pick for us.
            if dbs.publish_seq() != self.inner.viewer().begin_seq && !self.refresh_snapshot()? {
                return Err(LmdbError::HandleNotVisible);
            }
            let handle = self.txn_execute(|core| {
                let dbi = unsafe { ops::dbi_open(core.ptr, Some(c_name), flags) }?;
                let actual = unsafe { ops::dbi_flags(core.ptr, dbi) }?;
                Ok(dbs.insert(name, dbi, actual, requested, viewer))
            })?;
            tracing::trace!(
                target: "lmdb",
                parent: &self.inner.span,
                name,
                dbi = handle.dbi,
                "database handle opened"
            );
            self.reconcile(handle, requested)
        })();
        dbs.settle_gate(viewer.root, acquired);
        res
    }

    /// Turns a cached handle into a [`Database`], checking the requested
    /// flags against the stored ones.
    fn reconcile(&self, handle: Handle, requested: DatabaseFlags) -> LmdbResult<Database> {
        let env_id = self.inner.env.id();
        if handle.flags.contains(requested) {
            return Ok(Database::new(handle.dbi, handle.flags, handle.generation, env_id));
        }
        let actual =
            self.inner.peek_active(|core| unsafe { ops::dbi_flags(core.ptr, handle.dbi) })?;
        if actual != handle.flags {
            self.inner.env.dbs().set_flags(handle.generation, actual);
        }
        if actual.contains(requested) {
            Ok(Database::new(handle.dbi, actual, handle.generation, env_id))
        } else {
            Err(LmdbError::IncompatibleFlags { requested: requested.bits(), actual: actual.bits() })
        }
    }

    /// Takes the handle-open gate for this transaction's lineage, returning
    /// `true` if this call took it. A gate taken by a transaction that is
    /// no longer active is given back, since nothing would release it.
    fn acquire_open_gate(&self, viewer: Viewer) -> LmdbResult<bool> {
        let dbs = self.inner.env.dbs();
        let acquired = dbs.acquire_gate(viewer)?;
        let state = self.inner.lock().state;
        if state != TransactionState::Active {
            if acquired {
                dbs.release_gate(viewer.root);
            }
            return Err(LmdbError::TxnNotActive(state));
        }
        Ok(acquired)
    }

    /// Gets an item from a database.
    ///
    /// This function retrieves the data associated with the given key in the
    /// database. If the database supports duplicate keys
    /// ([`DatabaseFlags::DUP_SORT`]) then the first data item for the key will be
    /// returned. Retrieval of other items requires the use of
    /// [Cursor]. If the item is not in the database, then
    /// [None] will be returned.
    ///
    /// The value is a view into the memory map; it goes stale when this
    /// transaction writes or ends.
    pub fn get(&self, db: Database, key: &[u8]) -> LmdbResult<Option<ValueView<'_>>> {
        self.check_db(&db)?;
        assertions::debug_assert_integer_key(db.flags(), key);
        let inner: &TxInner = &self.inner;
        self.txn_execute(|core| {
            let mut data = PinnedVal::empty();
            if !unsafe { ops::get(core.ptr, db.dbi(), key, &mut data) }? {
                return Ok(None);
            }
            // SAFETY: the data lives in the map until the epoch changes.
            Ok(Some(unsafe { ValueView::from_val(&data, inner, core.epoch) }))
        })
    }

    /// Gets an item from a database, copied out of the memory map.
    pub fn get_owned(&self, db: Database, key: &[u8]) -> LmdbResult<Option<Vec<u8>>> {
        self.check_db(&db)?;
        assertions::debug_assert_integer_key(db.flags(), key);
        self.txn_execute(|core| {
            let mut data = PinnedVal::empty();
            if !unsafe { ops::get(core.ptr, db.dbi(), key, &mut data) }? {
                return Ok(None);
            }
            Ok(Some(unsafe { data.as_slice() }.to_vec()))
        })
    }

    /// Returns `true` if `key` is present in the database.
    pub fn contains_key(&self, db: Database, key: &[u8]) -> LmdbResult<bool> {
        self.check_db(&db)?;
        self.txn_execute(|core| {
            let mut data = PinnedVal::empty();
            unsafe { ops::get(core.ptr, db.dbi(), key, &mut data) }
        })
    }

    /// Stores an item into a database.
    ///
    /// This function stores key/data pairs in the database. The default
    /// behavior is to enter the new key/data pair, replacing any previously
    /// existing key if duplicates are disallowed, or adding a duplicate data
    /// item if duplicates are allowed ([`DatabaseFlags::DUP_SORT`]).
    pub fn put(
        &self,
        db: Database,
        key: impl AsRef<[u8]>,
        data: impl AsRef<[u8]>,
        flags: WriteFlags,
    ) -> LmdbResult<()> {
        self.require_rw()?;
        self.check_db(&db)?;
        let (key, data) = (key.as_ref(), data.as_ref());
        assertions::debug_assert_put(db.flags(), key, data);
        self.txn_execute(|core| {
            core.epoch += 1;
            let mut data = PinnedVal::new(data);
            unsafe { ops::put(core.ptr, db.dbi(), key, &mut data, flags.bits()) }
        })
    }

    /// Reserves space for a value of the given length at the given key, and
    /// calls the given closure with a mutable slice to write into.
    ///
    /// The buffer must be completely filled by the closure. Not supported
    /// on [`DatabaseFlags::DUP_SORT`] databases.
    pub fn with_reservation(
        &self,
        db: Database,
        key: impl AsRef<[u8]>,
        len: usize,
        flags: WriteFlags,
        f: impl FnOnce(&mut [u8]),
    ) -> LmdbResult<()> {
        self.require_rw()?;
        self.check_db(&db)?;
        if db.flags().contains(DatabaseFlags::DUP_SORT) {
            return Err(LmdbError::InvalidParameter);
        }
        let key = key.as_ref();
        assertions::debug_assert_integer_key(db.flags(), key);
        self.txn_execute(|core| {
            core.epoch += 1;
            let mut data = PinnedVal::reserve(len);
            let flags = flags.bits() | ffi::MDB_RESERVE as c_uint;
            unsafe { ops::put(core.ptr, db.dbi(), key, &mut data, flags) }?;
            if data.len() > 0 {
                // SAFETY: LMDB reserved `len` writable bytes in a dirty page
                // that stays put while the lock is held.
                f(unsafe { slice::from_raw_parts_mut(data.data() as *mut u8, data.len()) });
            } else {
                f(&mut []);
            }
            Ok(())
        })
    }

    /// Delete items from a database.
    ///
    /// If `data` is [Some] only the matching data item is deleted.
    /// Otherwise every value for the key is deleted.
    ///
    /// Returns `true` if the key/value pair was present.
    pub fn del(
        &self,
        db: Database,
        key: impl AsRef<[u8]>,
        data: Option<&[u8]>,
    ) -> LmdbResult<bool> {
        self.require_rw()?;
        self.check_db(&db)?;
        let key = key.as_ref();
        self.txn_execute(|core| {
            core.epoch += 1;
            unsafe { ops::del(core.ptr, db.dbi(), key, data) }
        })
    }

    /// Retrieves database statistics.
    pub fn db_stat(&self, db: Database) -> LmdbResult<Stat> {
        self.check_db(&db)?;
        self.txn_execute(|core| unsafe { ops::stat(core.ptr, db.dbi()) })
    }

    /// Number of items in the database.
    pub fn entries(&self, db: Database) -> LmdbResult<usize> {
        self.db_stat(db).map(|stat| stat.entries)
    }

    /// Gets the stored flags for the given database in the transaction.
    pub fn db_flags(&self, db: Database) -> LmdbResult<DatabaseFlags> {
        self.check_db(&db)?;
        self.txn_execute(|core| unsafe { ops::dbi_flags(core.ptr, db.dbi()) })
    }

    /// Empties the given database. All items will be removed, the handle
    /// stays valid.
    pub fn truncate_db(&self, db: Database) -> LmdbResult<()> {
        self.require_rw()?;
        self.check_db(&db)?;
        self.txn_execute(|core| {
            core.epoch += 1;
            unsafe { ops::drop_db(core.ptr, db.dbi(), false) }
        })
    }

    /// Deletes the database from the environment and closes its handle.
    ///
    /// Every copy of `db` becomes stale, in every transaction. The unnamed
    /// database cannot be deleted; dropping it only empties it.
    pub fn drop_db(&self, db: Database) -> LmdbResult<()> {
        self.require_rw()?;
        self.check_db(&db)?;
        if db.is_main() {
            return self.truncate_db(db);
        }
        let viewer = self.inner.viewer();
        let dbs = self.inner.env.dbs();
        let acquired = self.acquire_open_gate(viewer)?;
        let res = self.txn_execute(|core| {
            core.epoch += 1;
            unsafe { ops::drop_db(core.ptr, db.dbi(), true) }?;
            dbs.evict(db.generation());
            Ok(())
        });
        // The freed slot must not be reused until this lineage ends.
        if res.is_ok() {
            dbs.pin_gate(viewer.root);
        } else {
            dbs.settle_gate(viewer.root, acquired);
        }
        res
    }

    /// Open a new cursor on the given database.
    pub fn cursor(&self, db: Database) -> LmdbResult<Cursor<'_>> {
        Cursor::new(self, db)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Err(err) = self.inner.end(EndMode::Abort) {
            tracing::debug!(target: "lmdb", parent: &self.inner.span, %err, "abort on drop failed");
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("read_only", &self.inner.read_only)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
