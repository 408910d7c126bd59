use crate::{
    LmdbError, LmdbResult,
    error::lmdb_result,
    flags::{EnvironmentFlags, TransactionFlags},
    sys::{
        gate::Gate,
        signal::ClosingSignal,
        txn_manager::{LifecycleHandle, RawTxPtr, RwSyncLifecycle},
    },
    tx::{Transaction, TxParts, cache::DbCache, new_span, next_txn_id},
};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::{
    ffi::{CStr, CString, c_int},
    fmt,
    mem::MaybeUninit,
    path::{Path, PathBuf},
    ptr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

static NEXT_ENV_ID: AtomicU64 = AtomicU64::new(1);

/// Default unix permissions for files created by [`Environment::open`].
pub const DEFAULT_MODE: u32 = 0o644;

/// A raw environment pointer that may cross threads.
#[derive(Copy, Clone, Debug)]
pub(crate) struct EnvPtr(pub(crate) *mut ffi::MDB_env);

// SAFETY: LMDB environments are thread-safe once opened. Pre-open
// configuration is serialized by the environment's state lock.
unsafe impl Send for EnvPtr {}
unsafe impl Sync for EnvPtr {}

/// Lifecycle of an [`Environment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnvStatus {
    Created,
    Open,
    Closing,
    Closed,
}

/// Pre-open settings, remembered so they can be re-applied to a fresh
/// native handle after a failed open.
#[derive(Debug, Clone, Copy, Default)]
struct EnvConfig {
    map_size: Option<usize>,
    max_readers: Option<u32>,
    max_dbs: Option<u32>,
}

impl EnvConfig {
    fn apply(&self, env: EnvPtr) -> LmdbResult<()> {
        unsafe {
            if let Some(size) = self.map_size {
                lmdb_result(ffi::mdb_env_set_mapsize(env.0, size as _))?;
            }
            if let Some(readers) = self.max_readers {
                lmdb_result(ffi::mdb_env_set_maxreaders(env.0, readers as _))?;
            }
            if let Some(dbs) = self.max_dbs {
                lmdb_result(ffi::mdb_env_set_maxdbs(env.0, dbs as _))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct EnvState {
    status: EnvStatus,
    ptr: EnvPtr,
    config: EnvConfig,
    flags: EnvironmentFlags,
    lifecycle: Option<LifecycleHandle>,
}

impl EnvState {
    const fn require_open(&self) -> LmdbResult<EnvPtr> {
        match self.status {
            EnvStatus::Open => Ok(self.ptr),
            EnvStatus::Created => Err(LmdbError::EnvironmentNotOpen),
            EnvStatus::Closing | EnvStatus::Closed => Err(LmdbError::EnvironmentClosed),
        }
    }

    fn require_created(&self) -> LmdbResult<EnvPtr> {
        match self.status {
            EnvStatus::Created if self.ptr.0.is_null() => Err(LmdbError::EnvironmentClosed),
            EnvStatus::Created => Ok(self.ptr),
            EnvStatus::Open => Err(LmdbError::EnvironmentAlreadyOpen),
            EnvStatus::Closing | EnvStatus::Closed => Err(LmdbError::EnvironmentClosed),
        }
    }

    /// Discards the native handle after a failed open and allocates a new
    /// one carrying the same configuration.
    ///
    /// If no new handle can be allocated the environment is left closed.
    fn recreate(&mut self) -> LmdbResult<()> {
        unsafe { ffi::mdb_env_close(self.ptr.0) };
        self.ptr = EnvPtr(ptr::null_mut());
        let mut env: *mut ffi::MDB_env = ptr::null_mut();
        if let Err(err) = lmdb_result(unsafe { ffi::mdb_env_create(&mut env) }) {
            self.status = EnvStatus::Closed;
            return Err(err);
        }
        self.ptr = EnvPtr(env);
        self.config.apply(self.ptr)
    }
}

pub(crate) struct EnvInner {
    id: u64,
    path: PathBuf,
    state: RwLock<EnvState>,
    signal: Arc<ClosingSignal>,
    write_gate: Gate,
    dbs: DbCache,
    fatal: Mutex<Option<LmdbError>>,
}

impl EnvInner {
    fn close(&self) {
        let mut state = self.state.write();
        match state.status {
            EnvStatus::Closing | EnvStatus::Closed => return,
            EnvStatus::Created => {
                if !state.ptr.0.is_null() {
                    unsafe { ffi::mdb_env_close(state.ptr.0) };
                }
                state.ptr = EnvPtr(ptr::null_mut());
                state.status = EnvStatus::Closed;
                return;
            }
            EnvStatus::Open => {}
        }
        state.status = EnvStatus::Closing;

        self.write_gate.close();
        self.dbs.close_gate();
        self.signal.notify();

        self.dbs.close_all(state.ptr);
        state.lifecycle = None;
        unsafe { ffi::mdb_env_close(state.ptr.0) };
        state.ptr = EnvPtr(ptr::null_mut());
        state.status = EnvStatus::Closed;

        tracing::debug!(target: "lmdb", path = %self.path.display(), "environment closed");
    }
}

impl Drop for EnvInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// An LMDB environment.
///
/// An environment maps one data file and coordinates every transaction,
/// database handle and cursor created from it. Handles are cheap to clone
/// and share one native environment. The native environment is released
/// by [`Environment::close`] or when the last clone and the last
/// transaction are dropped.
///
/// Closing aborts every live transaction, including nested ones, and
/// closes their cursors before the native handle is freed.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvInner>,
}

impl Environment {
    /// Creates a builder for an environment.
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Allocates an unopened environment for `path`.
    ///
    /// Configure it with the `set_*` methods, then call
    /// [`Environment::open`].
    pub fn new(path: impl AsRef<Path>) -> LmdbResult<Self> {
        let mut env: *mut ffi::MDB_env = ptr::null_mut();
        lmdb_result(unsafe { ffi::mdb_env_create(&mut env) })?;
        let state = EnvState {
            status: EnvStatus::Created,
            ptr: EnvPtr(env),
            config: EnvConfig::default(),
            flags: EnvironmentFlags::empty(),
            lifecycle: None,
        };
        Ok(Self {
            inner: Arc::new(EnvInner {
                id: NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed),
                path: path.as_ref().to_path_buf(),
                state: RwLock::new(state),
                signal: ClosingSignal::new(),
                write_gate: Gate::new("write transaction"),
                dbs: DbCache::new(),
                fatal: Mutex::new(None),
            }),
        })
    }

    /// Sets the size of the memory map. Only valid before opening.
    pub fn set_map_size(&self, size: usize) -> LmdbResult<()> {
        let mut state = self.inner.state.write();
        let env = state.require_created()?;
        lmdb_result(unsafe { ffi::mdb_env_set_mapsize(env.0, size as _) })?;
        state.config.map_size = Some(size);
        Ok(())
    }

    /// Sets the number of reader slots. Only valid before opening.
    pub fn set_max_readers(&self, readers: u32) -> LmdbResult<()> {
        let mut state = self.inner.state.write();
        let env = state.require_created()?;
        lmdb_result(unsafe { ffi::mdb_env_set_maxreaders(env.0, readers as _) })?;
        state.config.max_readers = Some(readers);
        Ok(())
    }

    /// Sets the number of named databases. Only valid before opening.
    ///
    /// The default is zero, which allows only the unnamed database.
    pub fn set_max_dbs(&self, dbs: u32) -> LmdbResult<()> {
        let mut state = self.inner.state.write();
        let env = state.require_created()?;
        lmdb_result(unsafe { ffi::mdb_env_set_maxdbs(env.0, dbs as _) })?;
        state.config.max_dbs = Some(dbs);
        Ok(())
    }

    /// Opens the environment.
    ///
    /// Creates the environment directory if it does not exist, or its
    /// parent with [`EnvironmentFlags::NO_SUB_DIR`]. [`EnvironmentFlags::NO_TLS`]
    /// is always added, so read-only transactions are not bound to the
    /// thread that began them.
    ///
    /// If the native open fails the environment stays unopened with its
    /// configuration intact, and `open` may be retried.
    pub fn open(&self, flags: EnvironmentFlags, mode: u32) -> LmdbResult<()> {
        let mut state = self.inner.state.write();
        state.require_created()?;

        let path = &self.inner.path;
        if flags.contains(EnvironmentFlags::NO_SUB_DIR) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        } else {
            std::fs::create_dir_all(path)?;
        }
        let c_path = path_to_cstring(path)?;
        let flags = flags | EnvironmentFlags::NO_TLS;

        let opened = lmdb_result(unsafe {
            ffi::mdb_env_open(state.ptr.0, c_path.as_ptr(), flags.bits(), mode as _)
        })
        .and_then(|_| RwSyncLifecycle::spawn(state.ptr));

        match opened {
            Ok(lifecycle) => {
                state.lifecycle = Some(lifecycle);
                state.flags = flags;
                state.status = EnvStatus::Open;
                tracing::debug!(
                    target: "lmdb",
                    path = %path.display(),
                    flags = ?flags,
                    "environment opened"
                );
                Ok(())
            }
            Err(err) => {
                tracing::debug!(
                    target: "lmdb",
                    path = %path.display(),
                    %err,
                    "environment open failed"
                );
                state.recreate()?;
                Err(err)
            }
        }
    }

    /// Closes the environment.
    ///
    /// Aborts every live transaction and closes their cursors, then closes
    /// every cached database handle and frees the native environment.
    /// Later calls do nothing.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns `true` once the environment is open and not yet closing.
    pub fn is_open(&self) -> bool {
        self.inner.state.read().status == EnvStatus::Open
    }

    /// Returns `true` once [`Environment::close`] has started.
    pub fn is_closed(&self) -> bool {
        matches!(self.inner.state.read().status, EnvStatus::Closing | EnvStatus::Closed)
    }

    /// The path the environment was created for.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The flags the environment was opened with.
    pub fn flags(&self) -> LmdbResult<EnvironmentFlags> {
        let state = self.inner.state.read();
        state.require_open()?;
        Ok(state.flags)
    }

    /// Returns `true` if the environment was opened with
    /// [`EnvironmentFlags::WRITE_MAP`].
    pub fn is_write_map(&self) -> bool {
        self.inner.state.read().flags.contains(EnvironmentFlags::WRITE_MAP)
    }

    /// Returns `true` if the environment was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.inner.state.read().flags.contains(EnvironmentFlags::READ_ONLY)
    }

    /// The fatal error that made the environment unusable, if any.
    pub fn fatal_error(&self) -> Option<LmdbError> {
        *self.inner.fatal.lock()
    }

    /// Begins a transaction.
    ///
    /// With a `parent`, begins a nested read-write transaction inside it.
    /// Otherwise begins a root transaction, read-only if `flags` contains
    /// [`TransactionFlags::READ_ONLY`].
    ///
    /// A root read-write transaction waits until no other root read-write
    /// transaction of this environment is live in the process.
    pub fn begin_transaction(
        &self,
        parent: Option<&Transaction>,
        flags: TransactionFlags,
    ) -> LmdbResult<Transaction> {
        if let Some(parent) = parent {
            if !self.same_env(parent.env()) {
                return Err(LmdbError::EnvironmentMismatch);
            }
            if flags.contains(TransactionFlags::READ_ONLY) {
                return Err(LmdbError::InvalidParameter);
            }
            return parent.begin_nested_txn();
        }
        if flags.contains(TransactionFlags::READ_ONLY) {
            self.begin_ro(flags)
        } else {
            self.begin_rw(flags)
        }
    }

    /// Begins a read-only transaction.
    pub fn begin_ro_txn(&self) -> LmdbResult<Transaction> {
        self.begin_ro(TransactionFlags::READ_ONLY)
    }

    /// Begins a read-write transaction.
    pub fn begin_rw_txn(&self) -> LmdbResult<Transaction> {
        self.begin_rw(TransactionFlags::empty())
    }

    fn begin_ro(&self, flags: TransactionFlags) -> LmdbResult<Transaction> {
        let id = next_txn_id();
        let state = self.inner.state.read();
        let env = state.require_open()?;
        self.check_fatal()?;

        let begin_seq = self.inner.dbs.publish_seq();
        let span = new_span(true, id);
        let ptr = begin_reader(env, flags)?;

        Transaction::from_parts(TxParts {
            env: self.clone(),
            parent: None,
            ptr,
            flags,
            id,
            root: id,
            read_only: true,
            begin_seq,
            lifecycle: None,
            signal: &self.inner.signal,
            span,
        })
    }

    fn begin_rw(&self, flags: TransactionFlags) -> LmdbResult<Transaction> {
        let id = next_txn_id();
        self.inner.write_gate.acquire(id)?;

        let res = (|| {
            let state = self.inner.state.read();
            state.require_open()?;
            self.check_fatal()?;
            let lifecycle = state.lifecycle.clone().ok_or(LmdbError::EnvironmentClosed)?;

            let begin_seq = self.inner.dbs.publish_seq();
            let span = new_span(false, id);
            let ptr = lifecycle
                .begin(RawTxPtr(ptr::null_mut()), flags.bits(), span.clone())
                .inspect_err(|err| self.latch(*err))?;

            Transaction::from_parts(TxParts {
                env: self.clone(),
                parent: None,
                ptr: ptr.0,
                flags,
                id,
                root: id,
                read_only: false,
                begin_seq,
                lifecycle: Some(lifecycle),
                signal: &self.inner.signal,
                span,
            })
        })();

        if res.is_err() {
            self.inner.write_gate.release(id);
        }
        res
    }

    /// Copies the environment to `path`.
    ///
    /// Runs a read-only snapshot copy and blocks until it completes. With
    /// `compact`, free pages are omitted and pages are renumbered.
    pub fn copy_to(&self, path: impl AsRef<Path>, compact: bool) -> LmdbResult<()> {
        let path = path.as_ref();
        let state = self.inner.state.read();
        let env = state.require_open()?;

        if state.flags.contains(EnvironmentFlags::NO_SUB_DIR) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        } else {
            std::fs::create_dir_all(path)?;
        }
        let c_path = path_to_cstring(path)?;
        let flags = if compact { ffi::MDB_CP_COMPACT } else { 0 };
        lmdb_result(unsafe { ffi::mdb_env_copy2(env.0, c_path.as_ptr(), flags as _) })
    }

    /// Flushes the data buffers to disk.
    ///
    /// Only needed with [`EnvironmentFlags::NO_SYNC`] or
    /// [`EnvironmentFlags::MAP_ASYNC`]. With `force`, flushes synchronously
    /// even then.
    pub fn sync(&self, force: bool) -> LmdbResult<()> {
        self.with_env(|env| lmdb_result(unsafe { ffi::mdb_env_sync(env.0, force as c_int) }))
    }

    /// Retrieves statistics about the main database.
    pub fn stat(&self) -> LmdbResult<Stat> {
        self.with_env(|env| {
            let mut stat = MaybeUninit::<ffi::MDB_stat>::uninit();
            lmdb_result(unsafe { ffi::mdb_env_stat(env.0, stat.as_mut_ptr()) })?;
            Ok(unsafe { stat.assume_init() }.into())
        })
    }

    /// Retrieves information about the environment.
    pub fn info(&self) -> LmdbResult<Info> {
        self.with_env(|env| {
            let mut info = MaybeUninit::<ffi::MDB_envinfo>::uninit();
            lmdb_result(unsafe { ffi::mdb_env_info(env.0, info.as_mut_ptr()) })?;
            Ok(unsafe { info.assume_init() }.into())
        })
    }

    /// Clears stale entries from the reader table. Returns how many were
    /// cleared.
    pub fn reader_check(&self) -> LmdbResult<usize> {
        self.with_env(reader_check)
    }

    /// The maximum key size, in bytes.
    pub fn max_key_size(&self) -> LmdbResult<usize> {
        self.with_env(|env| Ok(unsafe { ffi::mdb_env_get_maxkeysize(env.0) } as usize))
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn same_env(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn dbs(&self) -> &DbCache {
        &self.inner.dbs
    }

    /// Read access to the native environment, failing unless it is open.
    pub(crate) fn with_env<T>(&self, f: impl FnOnce(EnvPtr) -> LmdbResult<T>) -> LmdbResult<T> {
        let state: RwLockReadGuard<'_, EnvState> = self.inner.state.read();
        f(state.require_open()?)
    }

    /// Runs `f` in a short-lived native read-only transaction, committed if
    /// `f` succeeds and aborted otherwise. Committing publishes the
    /// database handles `f` opened to every transaction begun afterwards.
    pub(crate) fn with_scratch_txn<T>(
        &self,
        f: impl FnOnce(*mut ffi::MDB_txn) -> LmdbResult<T>,
    ) -> LmdbResult<T> {
        self.with_env(|env| {
            self.check_fatal()?;
            let txn = begin_reader(env, TransactionFlags::READ_ONLY)?;
            match f(txn) {
                // SAFETY: `txn` is live, and freed by either call.
                Ok(value) => {
                    lmdb_result(unsafe { ffi::mdb_txn_commit(txn) })?;
                    Ok(value)
                }
                Err(err) => {
                    unsafe { ffi::mdb_txn_abort(txn) };
                    Err(err)
                }
            }
        })
    }

    /// Releases the write slot held by the root transaction `owner`.
    pub(crate) fn release_writer(&self, owner: u64) {
        self.inner.write_gate.release(owner);
    }

    /// Records `err` if it leaves the environment unusable.
    pub(crate) fn latch(&self, err: LmdbError) {
        if err.is_fatal() {
            let mut fatal = self.inner.fatal.lock();
            if fatal.is_none() {
                tracing::error!(target: "lmdb", %err, "environment poisoned");
                *fatal = Some(err);
            }
        }
    }

    fn check_fatal(&self) -> LmdbResult<()> {
        match *self.inner.fatal.lock() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.inner.id)
            .field("path", &self.inner.path)
            .field("status", &self.inner.state.read().status)
            .finish_non_exhaustive()
    }
}

fn begin_native(env: EnvPtr, flags: TransactionFlags) -> LmdbResult<*mut ffi::MDB_txn> {
    let mut txn: *mut ffi::MDB_txn = ptr::null_mut();
    lmdb_result(unsafe {
        ffi::mdb_txn_begin(
            env.0,
            ptr::null_mut(),
            (flags | TransactionFlags::READ_ONLY).bits(),
            &mut txn,
        )
    })?;
    Ok(txn)
}

/// Begins a read-only transaction, sweeping stale readers once if the
/// reader table is full.
fn begin_reader(env: EnvPtr, flags: TransactionFlags) -> LmdbResult<*mut ffi::MDB_txn> {
    match begin_native(env, flags) {
        Err(LmdbError::ReadersFull) => {
            let cleared = reader_check(env)?;
            tracing::debug!(target: "lmdb", cleared, "reader table full, retrying");
            begin_native(env, flags)
        }
        res => res,
    }
}

fn reader_check(env: EnvPtr) -> LmdbResult<usize> {
    let mut dead: c_int = 0;
    lmdb_result(unsafe { ffi::mdb_reader_check(env.0, &mut dead) })?;
    Ok(dead as usize)
}

fn path_to_cstring(path: &Path) -> LmdbResult<CString> {
    CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| LmdbError::InvalidParameter)
}

/// Environment statistics.
///
/// Contains information about the size and layout of an LMDB environment
/// or database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Size of a database page, in bytes.
    pub page_size: u32,
    /// Depth (height) of the B-tree.
    pub depth: u32,
    /// Number of internal (non-leaf) pages.
    pub branch_pages: usize,
    /// Number of leaf pages.
    pub leaf_pages: usize,
    /// Number of overflow pages.
    pub overflow_pages: usize,
    /// Number of data items.
    pub entries: usize,
}

impl From<ffi::MDB_stat> for Stat {
    fn from(raw: ffi::MDB_stat) -> Self {
        Self {
            page_size: raw.ms_psize as u32,
            depth: raw.ms_depth as u32,
            branch_pages: raw.ms_branch_pages as usize,
            leaf_pages: raw.ms_leaf_pages as usize,
            overflow_pages: raw.ms_overflow_pages as usize,
            entries: raw.ms_entries as usize,
        }
    }
}

/// Environment information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Info {
    /// Size of the memory map, in bytes.
    pub map_size: usize,
    /// ID of the last used page.
    pub last_pgno: usize,
    /// ID of the last committed transaction.
    pub last_txnid: usize,
    /// Maximum reader slots.
    pub max_readers: u32,
    /// Reader slots in use.
    pub num_readers: u32,
}

impl From<ffi::MDB_envinfo> for Info {
    fn from(raw: ffi::MDB_envinfo) -> Self {
        Self {
            map_size: raw.me_mapsize as usize,
            last_pgno: raw.me_last_pgno as usize,
            last_txnid: raw.me_last_txnid as usize,
            max_readers: raw.me_maxreaders as u32,
            num_readers: raw.me_numreaders as u32,
        }
    }
}

/// Version of the linked LMDB library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Major version.
    pub major: i32,
    /// Minor version.
    pub minor: i32,
    /// Patch version.
    pub patch: i32,
    /// Full version string.
    pub text: String,
}

/// Returns the version of the linked LMDB library.
pub fn version() -> Version {
    let (mut major, mut minor, mut patch): (c_int, c_int, c_int) = (0, 0, 0);
    let text = unsafe {
        let raw = ffi::mdb_version(&mut major, &mut minor, &mut patch);
        if raw.is_null() {
            String::new()
        } else {
            CStr::from_ptr(raw).to_string_lossy().into_owned()
        }
    };
    Version { major, minor, patch, text }
}

/// Options for opening or creating an environment.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentBuilder {
    flags: EnvironmentFlags,
    mode: u32,
    map_size: Option<usize>,
    max_readers: Option<u32>,
    max_dbs: Option<u32>,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self {
            flags: EnvironmentFlags::empty(),
            mode: DEFAULT_MODE,
            map_size: None,
            max_readers: None,
            max_dbs: None,
        }
    }
}

impl EnvironmentBuilder {
    /// Opens an environment at `path`, creating the directory if needed.
    pub fn open(&self, path: impl AsRef<Path>) -> LmdbResult<Environment> {
        let env = Environment::new(path)?;
        if let Some(size) = self.map_size {
            env.set_map_size(size)?;
        }
        if let Some(readers) = self.max_readers {
            env.set_max_readers(readers)?;
        }
        if let Some(dbs) = self.max_dbs {
            env.set_max_dbs(dbs)?;
        }
        env.open(self.flags, self.mode)?;
        Ok(env)
    }

    /// Sets the environment flags.
    pub const fn set_flags(&mut self, flags: EnvironmentFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Sets the unix permissions of created files.
    pub const fn set_mode(&mut self, mode: u32) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Sets the size of the memory map, in bytes.
    ///
    /// This is the maximum size of the database. The default is LMDB's,
    /// 10485760 bytes.
    pub const fn set_map_size(&mut self, size: usize) -> &mut Self {
        self.map_size = Some(size);
        self
    }

    /// Sets the maximum number of threads or reader slots.
    ///
    /// Each read-only transaction holds one slot until it ends or is reset.
    /// The default is 126.
    pub const fn set_max_readers(&mut self, readers: u32) -> &mut Self {
        self.max_readers = Some(readers);
        self
    }

    /// Sets the maximum number of named databases.
    ///
    /// Required when the environment holds named databases. A moderate
    /// number is cheap, but every named open scans the open slots.
    pub const fn set_max_dbs(&mut self, dbs: u32) -> &mut Self {
        self.max_dbs = Some(dbs);
        self
    }
}
