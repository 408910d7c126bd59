use crate::{
    LmdbError,
    error::{LmdbResult, lmdb_result},
    sys::EnvPtr,
};
use std::{
    os::raw::c_uint,
    ptr,
    sync::mpsc::{Receiver, SyncSender, sync_channel},
};

#[derive(Copy, Clone, Debug)]
pub(crate) struct RawTxPtr(pub(crate) *mut ffi::MDB_txn);

unsafe impl Send for RawTxPtr {}
unsafe impl Sync for RawTxPtr {}

/// Begin transaction request
pub(crate) struct Begin {
    pub(crate) parent: RawTxPtr,
    pub(crate) flags: c_uint,
    pub(crate) sender: SyncSender<LmdbResult<RawTxPtr>>,
    pub(crate) span: tracing::Span,
}

/// Abort transaction request
pub(crate) struct Abort {
    pub(crate) tx: RawTxPtr,
    pub(crate) sender: SyncSender<()>,
    pub(crate) span: tracing::Span,
}

/// Commit transaction request
pub(crate) struct Commit {
    pub(crate) tx: RawTxPtr,
    pub(crate) sender: SyncSender<LmdbResult<()>>,
    pub(crate) span: tracing::Span,
}

/// Messages sent to the [`LifecycleHandle`].
pub(crate) enum LifecycleEvent {
    Begin(Begin),
    Abort(Abort),
    Commit(Commit),
}

impl From<Begin> for LifecycleEvent {
    fn from(begin: Begin) -> Self {
        LifecycleEvent::Begin(begin)
    }
}

impl From<Abort> for LifecycleEvent {
    fn from(abort: Abort) -> Self {
        LifecycleEvent::Abort(abort)
    }
}

impl From<Commit> for LifecycleEvent {
    fn from(commit: Commit) -> Self {
        LifecycleEvent::Commit(commit)
    }
}

/// Handle to communicate with the transaction manager.
///
/// Dropping the last handle stops the manager thread.
#[derive(Debug, Clone)]
pub(crate) struct LifecycleHandle {
    sender: SyncSender<LifecycleEvent>,
}

impl LifecycleHandle {
    /// Sends a message to the transaction manager.
    #[inline(always)]
    fn send<T: Into<LifecycleEvent>>(&self, msg: T) -> LmdbResult<()> {
        self.sender.send(msg.into()).map_err(|_| LmdbError::EnvironmentClosed)
    }

    /// Begins a read-write transaction on the manager thread.
    pub(crate) fn begin(
        &self,
        parent: RawTxPtr,
        flags: c_uint,
        span: tracing::Span,
    ) -> LmdbResult<RawTxPtr> {
        let (sender, rx) = sync_channel(0);
        self.send(Begin { parent, flags, sender, span })?;
        rx.recv().map_err(|_| LmdbError::EnvironmentClosed)?
    }

    /// Commits a read-write transaction on the manager thread.
    pub(crate) fn commit(&self, tx: RawTxPtr, span: tracing::Span) -> LmdbResult<()> {
        let (sender, rx) = sync_channel(0);
        self.send(Commit { tx, sender, span })?;
        rx.recv().map_err(|_| LmdbError::EnvironmentClosed)?
    }

    /// Aborts a read-write transaction on the manager thread.
    pub(crate) fn abort(&self, tx: RawTxPtr, span: tracing::Span) -> LmdbResult<()> {
        let (sender, rx) = sync_channel(0);
        self.send(Abort { tx, sender, span })?;
        rx.recv().map_err(|_| LmdbError::EnvironmentClosed)
    }
}

impl From<SyncSender<LifecycleEvent>> for LifecycleHandle {
    fn from(sender: SyncSender<LifecycleEvent>) -> Self {
        Self { sender }
    }
}

/// Manages RW transactions in a background thread.
///
/// LMDB takes a process mutex when a write transaction begins and releases
/// it on commit or abort, so both must happen on the same thread. This
/// struct spawns one thread per environment that begins, commits and
/// aborts every read-write transaction, letting the transaction itself be
/// used from any thread.
#[derive(Debug)]
pub(crate) struct RwSyncLifecycle {
    env: EnvPtr,
    rx: Receiver<LifecycleEvent>,
}

impl RwSyncLifecycle {
    /// Creates a new [`LifecycleHandle`], spawns a background task, returns
    /// a sender to communicate with it.
    pub(crate) fn spawn(env: EnvPtr) -> LmdbResult<LifecycleHandle> {
        let (tx, rx) = sync_channel(0);
        let txn_manager = Self { env, rx };

        txn_manager.start_message_listener()?;

        Ok(tx.into())
    }

    /// Begin a RW transaction.
    fn handle_begin(&self, Begin { parent, flags, sender, span }: Begin) {
        let _guard = span.entered();
        let mut txn: *mut ffi::MDB_txn = ptr::null_mut();
        let res =
            lmdb_result(unsafe { ffi::mdb_txn_begin(self.env.0, parent.0, flags, &mut txn) })
                .map(|_| RawTxPtr(txn));
        if sender.send(res).is_err() && !txn.is_null() {
            // The requester is gone; don't leak the write lock.
            unsafe { ffi::mdb_txn_abort(txn) };
        }
    }

    // Abort a transaction.
    fn handle_abort(&self, Abort { tx, sender, span }: Abort) {
        let _guard = span.entered();
        unsafe { ffi::mdb_txn_abort(tx.0) };
        let _ = sender.send(());
    }

    /// Commit a transaction.
    fn handle_commit(&self, Commit { tx, sender, span }: Commit) {
        let _guard = span.entered();
        let _ = sender.send(lmdb_result(unsafe { ffi::mdb_txn_commit(tx.0) }));
    }

    /// Spawns a new [`std::thread`] that listens to incoming [`LifecycleEvent`] messages,
    /// executes an FFI function, and returns the result on the provided channel.
    ///
    /// - [`LifecycleEvent::Begin`] opens a new transaction with [`ffi::mdb_txn_begin`]
    /// - [`LifecycleEvent::Abort`] aborts a transaction with [`ffi::mdb_txn_abort`]
    /// - [`LifecycleEvent::Commit`] commits a transaction with [`ffi::mdb_txn_commit`]
    fn start_message_listener(self) -> LmdbResult<()> {
        let task = move || {
            while let Ok(msg) = self.rx.recv() {
                match msg {
                    LifecycleEvent::Begin(begin) => self.handle_begin(begin),
                    LifecycleEvent::Abort(abort) => self.handle_abort(abort),
                    LifecycleEvent::Commit(commit) => self.handle_commit(commit),
                }
            }
            tracing::trace!(target: "lmdb", "transaction manager stopped");
        };
        std::thread::Builder::new().name("lmdb-txn-manager".to_string()).spawn(task)?;
        Ok(())
    }
}
