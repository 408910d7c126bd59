//! Raw operations on transactions.
//!
//! Thin wrappers that funnel native status codes into [`LmdbResult`].
//! Callers must hold the transaction lock and pass a live transaction.

use crate::{
    LmdbResult, Stat,
    entries::val::PinnedVal,
    error::{lmdb_found, lmdb_result},
    flags::DatabaseFlags,
};
use std::{
    ffi::{CStr, c_uint},
    mem::MaybeUninit,
    ptr,
};

/// Opens a database handle.
///
/// # Safety
///
/// `txn` must be a live transaction, and no other transaction may open or
/// close handles concurrently.
pub(crate) unsafe fn dbi_open(
    txn: *mut ffi::MDB_txn,
    name: Option<&CStr>,
    flags: DatabaseFlags,
) -> LmdbResult<ffi::MDB_dbi> {
    let name_ptr = name.map_or(ptr::null(), CStr::as_ptr);
    let mut dbi: ffi::MDB_dbi = 0;
    lmdb_result(unsafe { ffi::mdb_dbi_open(txn, name_ptr, flags.bits(), &mut dbi) })?;
    Ok(dbi)
}

/// Reads the stored flags of a database.
///
/// # Safety
///
/// `txn` must be a live transaction in which `dbi` is valid.
pub(crate) unsafe fn dbi_flags(
    txn: *mut ffi::MDB_txn,
    dbi: ffi::MDB_dbi,
) -> LmdbResult<DatabaseFlags> {
    let mut flags: c_uint = 0;
    lmdb_result(unsafe { ffi::mdb_dbi_flags(txn, dbi, &mut flags) })?;
    Ok(DatabaseFlags::from_bits_truncate(flags).persistent())
}

/// Retrieves database statistics.
///
/// # Safety
///
/// `txn` must be a live transaction in which `dbi` is valid.
pub(crate) unsafe fn stat(txn: *mut ffi::MDB_txn, dbi: ffi::MDB_dbi) -> LmdbResult<Stat> {
    let mut stat = MaybeUninit::<ffi::MDB_stat>::uninit();
    lmdb_result(unsafe { ffi::mdb_stat(txn, dbi, stat.as_mut_ptr()) })?;
    Ok(unsafe { stat.assume_init() }.into())
}

/// Looks up `key`, leaving the result in `data`.
///
/// # Safety
///
/// `txn` must be a live transaction in which `dbi` is valid.
pub(crate) unsafe fn get(
    txn: *mut ffi::MDB_txn,
    dbi: ffi::MDB_dbi,
    key: &[u8],
    data: &mut PinnedVal<'_>,
) -> LmdbResult<bool> {
    let mut key = PinnedVal::new(key);
    lmdb_found(unsafe { ffi::mdb_get(txn, dbi, key.as_mut_ptr(), data.as_mut_ptr()) })
}

/// Stores `data`, which on return may describe the reserved space.
///
/// # Safety
///
/// `txn` must be a live read-write transaction in which `dbi` is valid.
pub(crate) unsafe fn put(
    txn: *mut ffi::MDB_txn,
    dbi: ffi::MDB_dbi,
    key: &[u8],
    data: &mut PinnedVal<'_>,
    flags: c_uint,
) -> LmdbResult<()> {
    let mut key = PinnedVal::new(key);
    lmdb_result(unsafe { ffi::mdb_put(txn, dbi, key.as_mut_ptr(), data.as_mut_ptr(), flags) })
}

/// Deletes `key`, or only the `key`/`data` pair when `data` is given.
///
/// # Safety
///
/// `txn` must be a live read-write transaction in which `dbi` is valid.
pub(crate) unsafe fn del(
    txn: *mut ffi::MDB_txn,
    dbi: ffi::MDB_dbi,
    key: &[u8],
    data: Option<&[u8]>,
) -> LmdbResult<bool> {
    let mut key = PinnedVal::new(key);
    let mut data_val = PinnedVal::from_opt(data);
    let data_ptr = if data.is_some() { data_val.as_mut_ptr() } else { ptr::null_mut() };
    lmdb_found(unsafe { ffi::mdb_del(txn, dbi, key.as_mut_ptr(), data_ptr) })
}

/// Empties a database, and with `delete` also deletes it and closes the
/// handle.
///
/// # Safety
///
/// `txn` must be a live read-write transaction in which `dbi` is valid.
pub(crate) unsafe fn drop_db(
    txn: *mut ffi::MDB_txn,
    dbi: ffi::MDB_dbi,
    delete: bool,
) -> LmdbResult<()> {
    lmdb_result(unsafe { ffi::mdb_drop(txn, dbi, delete as _) })
}
