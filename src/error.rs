use crate::tx::TransactionState;
use std::{borrow::Cow, ffi::CStr, os::raw::c_int};

/// An LMDB result.
pub type LmdbResult<T> = Result<T, LmdbError>;

/// Coarse classification of an [`LmdbError`].
///
/// Used to decide whether an error is an expected miss, the caller's fault,
/// a capacity problem that a retry may fix, or fatal to the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The key or position does not exist. Lookups report this as `None`.
    NotFound,
    /// Invalid input, conflicting flags, or an existing key.
    Caller,
    /// Map, reader table, or database table exhausted.
    Capacity,
    /// The environment can no longer be trusted.
    Fatal,
    /// The operation does not fit the current state of a handle.
    State,
}

/// An LMDB error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum LmdbError {
    /// Key/data pair already exists.
    #[error("MDB_KEYEXIST: Key/data pair already exists")]
    KeyExist,
    /// No matching key/data pair found.
    #[error("MDB_NOTFOUND: No matching key/data pair found")]
    NotFound,
    /// The requested page was not found.
    #[error("MDB_PAGE_NOTFOUND: Requested page not found")]
    PageNotFound,
    /// Database is corrupted.
    #[error("MDB_CORRUPTED: Located page was wrong type")]
    Corrupted,
    /// Environment had fatal error.
    #[error("MDB_PANIC: Update of meta page failed or environment had fatal error")]
    Panic,
    /// DB version mismatch.
    #[error("MDB_VERSION_MISMATCH: Database environment version mismatch")]
    VersionMismatch,
    /// File is not an LMDB file.
    #[error("MDB_INVALID: File is not an LMDB file")]
    Invalid,
    /// Environment map size limit reached.
    #[error("MDB_MAP_FULL: Environment mapsize limit reached")]
    MapFull,
    /// Too many databases were opened.
    #[error("MDB_DBS_FULL: Environment maxdbs limit reached")]
    DbsFull,
    /// Too many readers were opened.
    #[error("MDB_READERS_FULL: Environment maxreaders limit reached")]
    ReadersFull,
    /// Thread-local storage keys exhausted.
    #[error("MDB_TLS_FULL: Thread-local storage keys full - too many environments open")]
    TlsFull,
    /// Transaction has too many dirty pages.
    #[error("MDB_TXN_FULL: Transaction has too many dirty pages - transaction too big")]
    TxnFull,
    /// Internal stack of the cursor is too deep.
    #[error("MDB_CURSOR_FULL: Internal error - cursor stack limit reached")]
    CursorFull,
    /// Page has no more space.
    #[error("MDB_PAGE_FULL: Internal error - page has no more space")]
    PageFull,
    /// The map was grown beyond the configured size by another process.
    #[error("MDB_MAP_RESIZED: Database contents grew beyond environment mapsize")]
    MapResized,
    /// Flags do not match what the database or environment expects.
    #[error("MDB_INCOMPATIBLE: Operation and DB incompatible, or DB flags changed")]
    Incompatible,
    /// Invalid reuse of a reader slot.
    #[error("MDB_BAD_RSLOT: Invalid reuse of reader locktable slot")]
    BadRslot,
    /// The transaction must abort, has a child, or is invalid.
    #[error("MDB_BAD_TXN: Transaction must abort, has a child, or is invalid")]
    BadTxn,
    /// Unsupported size of key, DB name, data, or wrong DUP_FIXED size.
    #[error("MDB_BAD_VALSIZE: Unsupported size of key/DB name/data, or wrong DUPFIXED size")]
    BadValSize,
    /// The database handle was changed unexpectedly.
    #[error("MDB_BAD_DBI: The specified DBI handle was closed/changed unexpectedly")]
    BadDbi,
    /// Invalid parameter passed to the native library.
    #[error("invalid parameter")]
    InvalidParameter,
    /// Permission denied, usually a write against a read-only environment.
    #[error("access denied")]
    Access,
    /// Any other native or OS error code.
    #[error("native error {0}: {msg}", msg = strerror(*.0))]
    Other(i32),

    /// [`Environment::open`](crate::Environment::open) was called twice, or
    /// a pre-open setting was changed after open.
    #[error("environment is already open")]
    EnvironmentAlreadyOpen,
    /// The environment has not been opened yet.
    #[error("environment is not open")]
    EnvironmentNotOpen,
    /// The environment has been closed.
    #[error("environment is closed")]
    EnvironmentClosed,
    /// Two handles from different environments were combined.
    #[error("handle belongs to a different environment")]
    EnvironmentMismatch,
    /// The transaction is not in the `Active` state.
    #[error("transaction is not active (state: {0})")]
    TxnNotActive(TransactionState),
    /// The operation is only valid on read-only transactions.
    #[error("operation requires a read-only transaction")]
    ReadOnlyRequired,
    /// The operation is only valid on read-write transactions.
    #[error("operation requires a read-write transaction")]
    ReadWriteRequired,
    /// `renew` was called on a transaction that was not reset.
    #[error("transaction was not reset")]
    NotReset,
    /// The cursor has no current position.
    #[error("cursor is not positioned")]
    CursorNotPositioned,
    /// A borrowed value outlived the data it pointed to.
    #[error("value view is stale")]
    StaleView,
    /// The database handle was dropped or evicted.
    #[error("database handle is stale")]
    StaleDatabase,
    /// The database handle was published after this transaction began.
    #[error("database handle is not visible to this transaction")]
    HandleNotVisible,
    /// Another transaction holds unpublished database handles, so no new
    /// handle can be opened until it ends.
    #[error("another transaction holds unpublished database handles")]
    HandleOpenBusy,
    /// The requested database flags conflict with the database on disk.
    #[error("incompatible database flags: requested {requested:#x}, found {actual:#x}")]
    IncompatibleFlags {
        /// Requested persistent flags.
        requested: u32,
        /// Flags stored for the database.
        actual: u32,
    },
    /// Operation requires the database to have the `DUP_SORT` flag set.
    #[error("operation requires DUP_SORT database flag")]
    RequiresDupSort,
    /// Operation requires the database to have the `DUP_FIXED` flag set.
    #[error("operation requires DUP_FIXED database flag")]
    RequiresDupFixed,
    /// A batch buffer does not split evenly into fixed-width elements, or
    /// the elements of a batch differ in width.
    #[error("element size mismatch: {len} bytes does not fit element width {width}")]
    ElementSizeMismatch {
        /// Length of the offending buffer or element.
        len: usize,
        /// Expected element width.
        width: usize,
    },
    /// Nested transactions are not supported with `WRITE_MAP`.
    #[error("nested transactions are not supported with WRITE_MAP")]
    NestedTransactionsUnsupportedWithWriteMap,
}

impl LmdbError {
    /// Converts a raw error code to an [`LmdbError`].
    pub const fn from_err_code(err_code: c_int) -> Self {
        match err_code {
            ffi::MDB_KEYEXIST => Self::KeyExist,
            ffi::MDB_NOTFOUND => Self::NotFound,
            ffi::MDB_PAGE_NOTFOUND => Self::PageNotFound,
            ffi::MDB_CORRUPTED => Self::Corrupted,
            ffi::MDB_PANIC => Self::Panic,
            ffi::MDB_VERSION_MISMATCH => Self::VersionMismatch,
            ffi::MDB_INVALID => Self::Invalid,
            ffi::MDB_MAP_FULL => Self::MapFull,
            ffi::MDB_DBS_FULL => Self::DbsFull,
            ffi::MDB_READERS_FULL => Self::ReadersFull,
            ffi::MDB_TLS_FULL => Self::TlsFull,
            ffi::MDB_TXN_FULL => Self::TxnFull,
            ffi::MDB_CURSOR_FULL => Self::CursorFull,
            ffi::MDB_PAGE_FULL => Self::PageFull,
            ffi::MDB_MAP_RESIZED => Self::MapResized,
            ffi::MDB_INCOMPATIBLE => Self::Incompatible,
            ffi::MDB_BAD_RSLOT => Self::BadRslot,
            ffi::MDB_BAD_TXN => Self::BadTxn,
            ffi::MDB_BAD_VALSIZE => Self::BadValSize,
            ffi::MDB_BAD_DBI => Self::BadDbi,
            libc::EINVAL => Self::InvalidParameter,
            libc::EACCES => Self::Access,
            other => Self::Other(other),
        }
    }

    /// Converts an [`LmdbError`] to the raw error code.
    ///
    /// Errors raised by this crate rather than the native library map to
    /// `EINVAL`, except [`LmdbError::EnvironmentClosed`], which maps to
    /// `EBADF`, and [`LmdbError::HandleOpenBusy`], which maps to `EBUSY`.
    pub const fn code(&self) -> c_int {
        match self {
            Self::KeyExist => ffi::MDB_KEYEXIST,
            Self::NotFound => ffi::MDB_NOTFOUND,
            Self::PageNotFound => ffi::MDB_PAGE_NOTFOUND,
            Self::Corrupted => ffi::MDB_CORRUPTED,
            Self::Panic => ffi::MDB_PANIC,
            Self::VersionMismatch => ffi::MDB_VERSION_MISMATCH,
            Self::Invalid => ffi::MDB_INVALID,
            Self::MapFull => ffi::MDB_MAP_FULL,
            Self::DbsFull => ffi::MDB_DBS_FULL,
            Self::ReadersFull => ffi::MDB_READERS_FULL,
            Self::TlsFull => ffi::MDB_TLS_FULL,
            Self::TxnFull => ffi::MDB_TXN_FULL,
            Self::CursorFull => ffi::MDB_CURSOR_FULL,
            Self::PageFull => ffi::MDB_PAGE_FULL,
            Self::MapResized => ffi::MDB_MAP_RESIZED,
            Self::Incompatible | Self::IncompatibleFlags { .. } => ffi::MDB_INCOMPATIBLE,
            Self::BadRslot => ffi::MDB_BAD_RSLOT,
            Self::BadTxn => ffi::MDB_BAD_TXN,
            Self::BadValSize | Self::ElementSizeMismatch { .. } => ffi::MDB_BAD_VALSIZE,
            Self::BadDbi | Self::StaleDatabase | Self::HandleNotVisible => ffi::MDB_BAD_DBI,
            Self::Access => libc::EACCES,
            Self::Other(code) => *code,
            Self::EnvironmentClosed => libc::EBADF,
            Self::HandleOpenBusy => libc::EBUSY,
            Self::InvalidParameter
            | Self::EnvironmentAlreadyOpen
            | Self::EnvironmentNotOpen
            | Self::EnvironmentMismatch
            | Self::TxnNotActive(_)
            | Self::ReadOnlyRequired
            | Self::ReadWriteRequired
            | Self::NotReset
            | Self::CursorNotPositioned
            | Self::StaleView
            | Self::RequiresDupSort
            | Self::RequiresDupFixed
            | Self::NestedTransactionsUnsupportedWithWriteMap => libc::EINVAL,
        }
    }

    /// Classifies the error.
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound => ErrorClass::NotFound,
            Self::KeyExist
            | Self::BadValSize
            | Self::BadDbi
            | Self::Incompatible
            | Self::IncompatibleFlags { .. }
            | Self::InvalidParameter
            | Self::Access
            | Self::RequiresDupSort
            | Self::RequiresDupFixed
            | Self::ElementSizeMismatch { .. }
            | Self::EnvironmentMismatch
            | Self::Other(_) => ErrorClass::Caller,
            Self::MapFull
            | Self::DbsFull
            | Self::ReadersFull
            | Self::TlsFull
            | Self::TxnFull
            | Self::CursorFull
            | Self::PageFull => ErrorClass::Capacity,
            Self::PageNotFound
            | Self::Corrupted
            | Self::Panic
            | Self::VersionMismatch
            | Self::Invalid
            | Self::MapResized => ErrorClass::Fatal,
            Self::BadRslot
            | Self::BadTxn
            | Self::EnvironmentAlreadyOpen
            | Self::EnvironmentNotOpen
            | Self::EnvironmentClosed
            | Self::TxnNotActive(_)
            | Self::ReadOnlyRequired
            | Self::ReadWriteRequired
            | Self::NotReset
            | Self::CursorNotPositioned
            | Self::StaleView
            | Self::StaleDatabase
            | Self::HandleNotVisible
            | Self::HandleOpenBusy
            | Self::NestedTransactionsUnsupportedWithWriteMap => ErrorClass::State,
        }
    }

    /// Returns `true` if the environment must be considered unusable.
    pub const fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Fatal)
    }

    /// Returns `true` if a retry can succeed after corrective action.
    ///
    /// [`LmdbError::ReadersFull`] clears after stale readers are swept, and
    /// [`LmdbError::MapFull`] after the map is grown.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::ReadersFull | Self::MapFull)
    }

    /// Returns the message the native library gives for this error's code.
    pub fn native_message(&self) -> Cow<'static, str> {
        strerror(self.code())
    }
}

impl From<std::io::Error> for LmdbError {
    fn from(err: std::io::Error) -> Self {
        Self::from_err_code(err.raw_os_error().unwrap_or(libc::EIO))
    }
}

fn strerror(code: c_int) -> Cow<'static, str> {
    // SAFETY: `mdb_strerror` returns a pointer to a static or thread-local
    // NUL-terminated string, which is copied before returning.
    unsafe {
        let msg = ffi::mdb_strerror(code);
        if msg.is_null() {
            return Cow::Borrowed("unknown error");
        }
        Cow::Owned(CStr::from_ptr(msg).to_string_lossy().into_owned())
    }
}

/// Funnels a native status code into an [`LmdbResult`].
#[inline]
pub(crate) const fn lmdb_result(err_code: c_int) -> LmdbResult<()> {
    match err_code {
        0 => Ok(()),
        _ => Err(LmdbError::from_err_code(err_code)),
    }
}

/// Like [`lmdb_result`], but reports not-found as `Ok(false)`.
#[inline]
pub(crate) const fn lmdb_found(err_code: c_int) -> LmdbResult<bool> {
    match err_code {
        0 => Ok(true),
        ffi::MDB_NOTFOUND => Ok(false),
        _ => Err(LmdbError::from_err_code(err_code)),
    }
}
