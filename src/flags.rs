use bitflags::bitflags;
use std::os::raw::c_uint;

bitflags! {
    /// Environment options, passed to [`Environment::open`].
    ///
    /// [`NO_TLS`](Self::NO_TLS) is always added by the crate so that
    /// read-only transactions are not bound to the thread that began them.
    ///
    /// [`Environment::open`]: crate::Environment::open
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EnvironmentFlags: c_uint {
        /// Use a fixed address for the mmap region.
        const FIXED_MAP = ffi::MDB_FIXEDMAP as c_uint;
        /// The path is the data file itself; the lock file is
        /// `<path>-lock`.
        const NO_SUB_DIR = ffi::MDB_NOSUBDIR as c_uint;
        /// Don't flush system buffers to disk when committing.
        const NO_SYNC = ffi::MDB_NOSYNC as c_uint;
        /// Open the environment read-only.
        const READ_ONLY = ffi::MDB_RDONLY as c_uint;
        /// Flush system buffers but omit the meta page flush on commit.
        const NO_META_SYNC = ffi::MDB_NOMETASYNC as c_uint;
        /// Use a writeable memory map.
        const WRITE_MAP = ffi::MDB_WRITEMAP as c_uint;
        /// Use asynchronous msync when [`WRITE_MAP`](Self::WRITE_MAP) is
        /// used.
        const MAP_ASYNC = ffi::MDB_MAPASYNC as c_uint;
        /// Tie reader slots to transactions rather than threads.
        const NO_TLS = ffi::MDB_NOTLS as c_uint;
        /// Don't do any locking. The caller must coordinate access.
        const NO_LOCK = ffi::MDB_NOLOCK as c_uint;
        /// Turn off readahead.
        const NO_READAHEAD = ffi::MDB_NORDAHEAD as c_uint;
        /// Don't initialize malloc'd memory before writing to the data
        /// file.
        const NO_MEM_INIT = ffi::MDB_NOMEMINIT as c_uint;
    }
}

bitflags! {
    /// Database options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DatabaseFlags: c_uint {
        /// Keys are compared in reverse order, from the end of the strings
        /// to the beginning.
        const REVERSE_KEY = ffi::MDB_REVERSEKEY as c_uint;
        /// Duplicate keys may be used in the database.
        const DUP_SORT = ffi::MDB_DUPSORT as c_uint;
        /// Keys are binary integers in native byte order, either `u32` or
        /// `usize`.
        const INTEGER_KEY = ffi::MDB_INTEGERKEY as c_uint;
        /// With [`DUP_SORT`](Self::DUP_SORT): all data items are the same
        /// size.
        const DUP_FIXED = ffi::MDB_DUPFIXED as c_uint;
        /// With [`DUP_SORT`](Self::DUP_SORT): duplicate data items are
        /// binary integers, like [`INTEGER_KEY`](Self::INTEGER_KEY) keys.
        const INTEGER_DUP = ffi::MDB_INTEGERDUP as c_uint;
        /// With [`DUP_SORT`](Self::DUP_SORT): duplicates are compared in
        /// reverse order.
        const REVERSE_DUP = ffi::MDB_REVERSEDUP as c_uint;
        /// Create the named database if it doesn't exist.
        const CREATE = ffi::MDB_CREATE as c_uint;
    }
}

impl DatabaseFlags {
    /// The flags that are stored with the database on disk.
    pub const fn persistent(self) -> Self {
        self.difference(Self::CREATE)
    }
}

bitflags! {
    /// Write options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WriteFlags: c_uint {
        /// Insert the new item only if the key does not already appear in
        /// the database.
        const NO_OVERWRITE = ffi::MDB_NOOVERWRITE as c_uint;
        /// Insert the new item only if it does not already appear in the
        /// database. Only for [`DatabaseFlags::DUP_SORT`] databases.
        const NO_DUP_DATA = ffi::MDB_NODUPDATA as c_uint;
        /// For cursor puts: replace the item at the current cursor
        /// position.
        const CURRENT = ffi::MDB_CURRENT as c_uint;
        /// Append the item to the end of the database. Keys must arrive in
        /// sorted order.
        const APPEND = ffi::MDB_APPEND as c_uint;
        /// Like [`APPEND`](Self::APPEND), but for sorted duplicate data.
        const APPEND_DUP = ffi::MDB_APPENDDUP as c_uint;
    }
}

bitflags! {
    /// Transaction options, passed to [`Environment::begin_transaction`].
    ///
    /// [`Environment::begin_transaction`]: crate::Environment::begin_transaction
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransactionFlags: c_uint {
        /// Begin a read-only transaction.
        const READ_ONLY = ffi::MDB_RDONLY as c_uint;
        /// Don't flush system buffers when this transaction commits.
        const NO_SYNC = ffi::MDB_NOSYNC as c_uint;
        /// Don't flush the meta page when this transaction commits.
        const NO_META_SYNC = ffi::MDB_NOMETASYNC as c_uint;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_match_native_values() {
        assert_eq!(EnvironmentFlags::READ_ONLY.bits(), 0x20000);
        assert_eq!(EnvironmentFlags::NO_SUB_DIR.bits(), 0x4000);
        assert_eq!(DatabaseFlags::DUP_SORT.bits(), 0x04);
        assert_eq!(DatabaseFlags::CREATE.bits(), 0x40000);
        assert_eq!(WriteFlags::NO_OVERWRITE.bits(), 0x10);
        assert_eq!(TransactionFlags::READ_ONLY.bits(), EnvironmentFlags::READ_ONLY.bits());
    }

    #[test]
    fn persistent_strips_create() {
        let flags = DatabaseFlags::CREATE | DatabaseFlags::DUP_SORT;
        assert_eq!(flags.persistent(), DatabaseFlags::DUP_SORT);
    }
}
