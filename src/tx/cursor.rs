use crate::{
    Database, FixedWidth, KvView, LmdbError, LmdbResult, Transaction, ValueView,
    entries::{decode_all, encode_all, val::PinnedVal},
    error::{lmdb_found, lmdb_result},
    flags::{DatabaseFlags, WriteFlags},
    sys::signal::{CloseListener, Subscription},
    tx::{
        TxInner,
        assertions::{debug_assert_integer_key, debug_assert_put},
        iter::Iter,
        transaction::TxCore,
    },
};
use ffi::{
    MDB_FIRST, MDB_FIRST_DUP, MDB_GET_BOTH, MDB_GET_BOTH_RANGE, MDB_GET_CURRENT,
    MDB_GET_MULTIPLE, MDB_LAST, MDB_LAST_DUP, MDB_NEXT, MDB_NEXT_DUP, MDB_NEXT_MULTIPLE,
    MDB_NEXT_NODUP, MDB_PREV, MDB_PREV_DUP, MDB_PREV_NODUP, MDB_SET, MDB_SET_KEY,
    MDB_SET_RANGE, MDB_cursor_op,
};
use parking_lot::Mutex;
use std::{
    ffi::c_uint,
    fmt, ptr,
    sync::{Arc, Weak},
};

/// The native cursor and what we know about its position.
#[derive(Debug)]
pub(crate) struct CursorCore {
    ptr: *mut ffi::MDB_cursor,
    /// Whether the last move succeeded.
    positioned: bool,
    /// Transaction incarnation the native cursor is bound to.
    incarnation: u64,
}

// SAFETY: the cursor is only used under its transaction's lock.
unsafe impl Send for CursorCore {}

impl Default for CursorCore {
    fn default() -> Self {
        Self { ptr: ptr::null_mut(), positioned: false, incarnation: 0 }
    }
}

#[derive(Debug)]
struct CursorInner {
    core: Mutex<CursorCore>,
}

impl CursorInner {
    fn close(core: &mut CursorCore) {
        if !core.ptr.is_null() {
            unsafe { ffi::mdb_cursor_close(core.ptr) };
            core.ptr = ptr::null_mut();
        }
        core.positioned = false;
    }
}

impl CloseListener for CursorInner {
    fn on_close(&self) {
        // Runs while the transaction is locked and ending.
        Self::close(&mut self.core.lock());
    }
}

/// A cursor for navigating the items within a database.
///
/// Navigation returns `Ok(None)` when there is no item at the requested
/// position. Values are [`ValueView`]s into the memory map, and go stale
/// when the transaction writes or ends.
///
/// A cursor is closed when dropped, or earlier if its transaction ends.
/// After its transaction is [reset](Transaction::reset) and
/// [renewed](Transaction::renew), a cursor rebinds itself on next use.
pub struct Cursor<'tx> {
    txn: &'tx Transaction,
    db: Database,
    inner: Arc<CursorInner>,
    _subscription: Subscription,
}

impl<'tx> Cursor<'tx> {
    pub(crate) fn new(txn: &'tx Transaction, db: Database) -> LmdbResult<Self> {
        txn.check_db(&db)?;
        let inner = Arc::new(CursorInner {
            core: Mutex::new(CursorCore::default()),
        });
        let subscription = Self::bind(txn.inner(), &inner, db, None)?;
        Ok(Self { txn, db, inner, _subscription: subscription })
    }

    /// Binds `inner` to `txn`, renewing `existing` or opening a new native
    /// cursor, and subscribes it to the transaction's end.
    fn bind(
        txn: &TxInner,
        inner: &Arc<CursorInner>,
        db: Database,
        existing: Option<*mut ffi::MDB_cursor>,
    ) -> LmdbResult<Subscription> {
        txn.with_active(|core| {
            let ptr = match existing {
                Some(cursor) => {
                    let renewed = lmdb_result(unsafe { ffi::mdb_cursor_renew(core.ptr, cursor) });
                    if let Err(err) = renewed {
                        unsafe { ffi::mdb_cursor_close(cursor) };
                        return Err(err);
                    }
                    cursor
                }
                None => {
                    let mut cursor: *mut ffi::MDB_cursor = ptr::null_mut();
                    lmdb_result(unsafe { ffi::mdb_cursor_open(core.ptr, db.dbi(), &mut cursor) })?;
                    cursor
                }
            };
            let mut cursor = inner.core.lock();
            *cursor = CursorCore { ptr, positioned: false, incarnation: core.incarnation };

            let listener: Weak<dyn CloseListener> = Arc::<CursorInner>::downgrade(inner);
            txn.signal().subscribe(listener).ok_or_else(|| {
                CursorInner::close(&mut cursor);
                LmdbError::TxnNotActive(core.state)
            })
        })
    }

    /// Returns the transaction associated with this cursor.
    pub const fn txn(&self) -> &'tx Transaction {
        self.txn
    }

    /// Returns the database associated with this cursor.
    pub const fn db(&self) -> Database {
        self.db
    }

    /// Returns the flags of the database associated with this cursor.
    pub const fn db_flags(&self) -> DatabaseFlags {
        self.db.flags()
    }

    /// Returns `true` if the last move found an item in the current
    /// snapshot.
    pub fn is_positioned(&self) -> bool {
        let txn = self.txn.inner().lock();
        let cursor = self.inner.core.lock();
        cursor.positioned && cursor.incarnation == txn.incarnation
    }

    /// Validates that the database has the DUP_SORT flag set.
    #[inline(always)]
    fn require_dup_sort(&self) -> LmdbResult<()> {
        self.db
            .flags()
            .contains(DatabaseFlags::DUP_SORT)
            .then_some(())
            .ok_or(LmdbError::RequiresDupSort)
    }

    /// Validates that the database has the DUP_FIXED flag set.
    #[inline(always)]
    fn require_dup_fixed(&self) -> LmdbResult<()> {
        self.db
            .flags()
            .contains(DatabaseFlags::DUP_FIXED)
            .then_some(())
            .ok_or(LmdbError::RequiresDupFixed)
    }

    fn require_rw(&self) -> LmdbResult<()> {
        if self.txn.is_read_only() { Err(LmdbError::ReadWriteRequired) } else { Ok(()) }
    }

    /// Runs `f` with the transaction and the cursor locked, renewing the
    /// native cursor first if the transaction was renewed since.
    fn execute<T>(
        &self,
        f: impl FnOnce(&mut TxCore, &mut CursorCore) -> LmdbResult<T>,
    ) -> LmdbResult<T> {
        self.txn.check_db(&self.db)?;
        self.txn.inner().with_active(|txn| {
            let mut cursor = self.inner.core.lock();
            if cursor.ptr.is_null() {
                return Err(LmdbError::InvalidParameter);
            }
            if cursor.incarnation != txn.incarnation {
                lmdb_result(unsafe { ffi::mdb_cursor_renew(txn.ptr, cursor.ptr) })?;
                cursor.incarnation = txn.incarnation;
                cursor.positioned = false;
            }
            f(txn, &mut cursor)
        })
    }

    /// Moves the cursor with `op` and maps the resulting key and data under
    /// the lock.
    ///
    /// Ops that leave a descriptor pointing at caller memory are followed
    /// by a `GET_CURRENT`, so `map` only ever sees map memory.
    fn get_with<T>(
        &self,
        key: Option<&[u8]>,
        data: Option<&[u8]>,
        op: MDB_cursor_op,
        map: impl FnOnce(&PinnedVal<'_>, &PinnedVal<'_>, u64) -> T,
    ) -> LmdbResult<Option<T>> {
        self.execute(|txn, cursor| {
            if op == MDB_GET_CURRENT && !cursor.positioned {
                return Err(LmdbError::CursorNotPositioned);
            }
            let mut key_val = PinnedVal::from_opt(key);
            let mut data_val = PinnedVal::from_opt(data);
            cursor.positioned = lmdb_found(unsafe {
                ffi::mdb_cursor_get(cursor.ptr, key_val.as_mut_ptr(), data_val.as_mut_ptr(), op)
            })?;
            if !cursor.positioned {
                return Ok(None);
            }
            if key_val.points_at(key) || data_val.points_at(data) {
                lmdb_result(unsafe {
                    ffi::mdb_cursor_get(
                        cursor.ptr,
                        key_val.as_mut_ptr(),
                        data_val.as_mut_ptr(),
                        MDB_GET_CURRENT,
                    )
                })?;
            }
            Ok(Some(map(&key_val, &data_val, txn.epoch)))
        })
    }

    fn get_kv(
        &self,
        key: Option<&[u8]>,
        data: Option<&[u8]>,
        op: MDB_cursor_op,
    ) -> LmdbResult<Option<KvView<'tx>>> {
        let txn: &'tx TxInner = self.txn.inner();
        // SAFETY: both descriptors point into the map at `epoch`.
        self.get_with(key, data, op, |k, v, epoch| unsafe {
            (ValueView::from_val(k, txn, epoch), ValueView::from_val(v, txn, epoch))
        })
    }

    fn get_value(
        &self,
        key: Option<&[u8]>,
        data: Option<&[u8]>,
        op: MDB_cursor_op,
    ) -> LmdbResult<Option<ValueView<'tx>>> {
        self.get_kv(key, data, op).map(|kv| kv.map(|(_, v)| v))
    }

    /// Moves the cursor with `op` and copies the item out.
    pub(crate) fn get_owned(
        &mut self,
        op: MDB_cursor_op,
    ) -> LmdbResult<Option<(Vec<u8>, Vec<u8>)>> {
        self.get_with(None, None, op, |k, v, _| unsafe {
            (k.as_slice().to_vec(), v.as_slice().to_vec())
        })
    }

    fn get_owned_at(
        &mut self,
        key: &[u8],
        op: MDB_cursor_op,
    ) -> LmdbResult<Option<(Vec<u8>, Vec<u8>)>> {
        debug_assert_integer_key(self.db.flags(), key);
        self.get_with(Some(key), None, op, |k, v, _| unsafe {
            (k.as_slice().to_vec(), v.as_slice().to_vec())
        })
    }

    /// Position at first key/data item.
    pub fn first(&mut self) -> LmdbResult<Option<KvView<'tx>>> {
        self.get_kv(None, None, MDB_FIRST)
    }

    /// Position at last key/data item.
    pub fn last(&mut self) -> LmdbResult<Option<KvView<'tx>>> {
        self.get_kv(None, None, MDB_LAST)
    }

    /// Position at next data item.
    ///
    /// On a new cursor this is the first item.
    #[expect(clippy::should_implement_trait)]
    pub fn next(&mut self) -> LmdbResult<Option<KvView<'tx>>> {
        self.get_kv(None, None, MDB_NEXT)
    }

    /// Position at previous data item.
    pub fn prev(&mut self) -> LmdbResult<Option<KvView<'tx>>> {
        self.get_kv(None, None, MDB_PREV)
    }

    /// Return key/data at current cursor position.
    ///
    /// Fails with [`LmdbError::CursorNotPositioned`] unless the last move
    /// found an item.
    pub fn get_current(&mut self) -> LmdbResult<Option<KvView<'tx>>> {
        self.get_kv(None, None, MDB_GET_CURRENT)
    }

    /// Position at specified key.
    pub fn set(&mut self, key: &[u8]) -> LmdbResult<Option<ValueView<'tx>>> {
        debug_assert_integer_key(self.db.flags(), key);
        self.get_value(Some(key), None, MDB_SET)
    }

    /// Position at specified key, return both key and data.
    pub fn set_key(&mut self, key: &[u8]) -> LmdbResult<Option<KvView<'tx>>> {
        debug_assert_integer_key(self.db.flags(), key);
        self.get_kv(Some(key), None, MDB_SET_KEY)
    }

    /// Position at first key greater than or equal to specified key.
    pub fn set_range(&mut self, key: &[u8]) -> LmdbResult<Option<KvView<'tx>>> {
        debug_assert_integer_key(self.db.flags(), key);
        self.get_kv(Some(key), None, MDB_SET_RANGE)
    }

    /// [`DatabaseFlags::DUP_SORT`]-only: Position at key/data pair.
    ///
    /// Returns [`LmdbError::RequiresDupSort`] if the database does not have the
    /// [`DatabaseFlags::DUP_SORT`] flag set.
    pub fn get_both(&mut self, k: &[u8], v: &[u8]) -> LmdbResult<Option<ValueView<'tx>>> {
        self.require_dup_sort()?;
        self.get_value(Some(k), Some(v), MDB_GET_BOTH)
    }

    /// [`DatabaseFlags::DUP_SORT`]-only: Position at given key and at first data greater than or
    /// equal to specified data.
    ///
    /// Returns [`LmdbError::RequiresDupSort`] if the database does not have the
    /// [`DatabaseFlags::DUP_SORT`] flag set.
    pub fn get_both_range(&mut self, k: &[u8], v: &[u8]) -> LmdbResult<Option<ValueView<'tx>>> {
        self.require_dup_sort()?;
        self.get_value(Some(k), Some(v), MDB_GET_BOTH_RANGE)
    }

    /// [`DatabaseFlags::DUP_SORT`]-only: Position at first data item of current key.
    pub fn first_dup(&mut self) -> LmdbResult<Option<ValueView<'tx>>> {
        self.require_dup_sort()?;
        self.get_value(None, None, MDB_FIRST_DUP)
    }

    /// [`DatabaseFlags::DUP_SORT`]-only: Position at last data item of current key.
    pub fn last_dup(&mut self) -> LmdbResult<Option<ValueView<'tx>>> {
        self.require_dup_sort()?;
        self.get_value(None, None, MDB_LAST_DUP)
    }

    /// [`DatabaseFlags::DUP_SORT`]-only: Position at next data item of current key.
    pub fn next_dup(&mut self) -> LmdbResult<Option<KvView<'tx>>> {
        self.require_dup_sort()?;
        self.get_kv(None, None, MDB_NEXT_DUP)
    }

    /// [`DatabaseFlags::DUP_SORT`]-only: Position at previous data item of current key.
    pub fn prev_dup(&mut self) -> LmdbResult<Option<KvView<'tx>>> {
        self.require_dup_sort()?;
        self.get_kv(None, None, MDB_PREV_DUP)
    }

    /// Position at first data item of next key.
    pub fn next_nodup(&mut self) -> LmdbResult<Option<KvView<'tx>>> {
        self.get_kv(None, None, MDB_NEXT_NODUP)
    }

    /// Position at last data item of previous key.
    pub fn prev_nodup(&mut self) -> LmdbResult<Option<KvView<'tx>>> {
        self.get_kv(None, None, MDB_PREV_NODUP)
    }

    /// [`DatabaseFlags::DUP_SORT`]-only: Number of data items for the
    /// current key.
    pub fn count(&self) -> LmdbResult<usize> {
        self.require_dup_sort()?;
        self.execute(|_, cursor| {
            if !cursor.positioned {
                return Err(LmdbError::CursorNotPositioned);
            }
            let mut count: usize = 0;
            lmdb_result(unsafe {
                ffi::mdb_cursor_count(cursor.ptr, &mut count as *mut usize as *mut _)
            })?;
            Ok(count)
        })
    }

    /// Puts a key/data pair into the database. The cursor will be positioned at
    /// the new data item, or on failure usually near it.
    pub fn put(&mut self, key: &[u8], data: &[u8], flags: WriteFlags) -> LmdbResult<()> {
        self.require_rw()?;
        debug_assert_put(self.db.flags(), key, data);
        self.execute(|txn, cursor| {
            txn.epoch += 1;
            let mut key_val = PinnedVal::new(key);
            let mut data_val = PinnedVal::new(data);
            let res = lmdb_result(unsafe {
                ffi::mdb_cursor_put(
                    cursor.ptr,
                    key_val.as_mut_ptr(),
                    data_val.as_mut_ptr(),
                    flags.bits(),
                )
            });
            cursor.positioned = res.is_ok();
            res
        })
    }

    /// Deletes the current key/data pair, or with `all_duplicates` every
    /// data item of the current key.
    pub fn del(&mut self, all_duplicates: bool) -> LmdbResult<()> {
        self.require_rw()?;
        self.execute(|txn, cursor| {
            if !cursor.positioned {
                return Err(LmdbError::CursorNotPositioned);
            }
            txn.epoch += 1;
            let flags = if all_duplicates { ffi::MDB_NODUPDATA as c_uint } else { 0 };
            cursor.positioned = false;
            lmdb_result(unsafe { ffi::mdb_cursor_del(cursor.ptr, flags) })
        })
    }

    /// Rebinds a read-only cursor to another read-only transaction of the
    /// same environment, reusing the native cursor.
    pub fn renew<'n>(self, txn: &'n Transaction) -> LmdbResult<Cursor<'n>> {
        if !self.txn.is_read_only() || !txn.is_read_only() {
            return Err(LmdbError::ReadOnlyRequired);
        }
        if !self.txn.env().same_env(txn.env()) {
            return Err(LmdbError::EnvironmentMismatch);
        }
        txn.check_db(&self.db)?;

        let existing = {
            let _old = self.txn.inner().lock();
            let mut core = self.inner.core.lock();
            let ptr = std::mem::replace(&mut core.ptr, ptr::null_mut());
            core.positioned = false;
            (!ptr.is_null()).then_some(ptr)
        };
        let db = self.db;
        drop(self);

        let inner = Arc::new(CursorInner {
            core: Mutex::new(CursorCore::default()),
        });
        let subscription = Cursor::bind(txn.inner(), &inner, db, existing)?;
        Ok(Cursor { txn, db, inner, _subscription: subscription })
    }

    /// [`DatabaseFlags::DUP_FIXED`]-only: Stores `values` as duplicates of
    /// `key` in one native call. Returns how many were written.
    pub fn put_multiple<T: FixedWidth>(
        &mut self,
        key: &[u8],
        values: &[T],
        flags: WriteFlags,
    ) -> LmdbResult<usize> {
        self.require_rw()?;
        self.require_dup_fixed()?;
        if values.is_empty() {
            return Ok(0);
        }
        if T::WIDTH == 0 {
            return Err(LmdbError::ElementSizeMismatch { len: 0, width: 0 });
        }
        let buf = encode_all(values);
        self.put_multiple_raw(key, &buf, T::WIDTH, values.len(), flags)
    }

    /// [`DatabaseFlags::DUP_FIXED`]-only: Like [`put_multiple`](Self::put_multiple)
    /// for raw elements, which must all have the same length.
    pub fn put_multiple_slices(
        &mut self,
        key: &[u8],
        values: &[&[u8]],
        flags: WriteFlags,
    ) -> LmdbResult<usize> {
        self.require_rw()?;
        self.require_dup_fixed()?;
        let Some(first) = values.first() else {
            return Ok(0);
        };
        let width = first.len();
        if let Some(bad) = values.iter().find(|value| value.len() != width || value.is_empty()) {
            return Err(LmdbError::ElementSizeMismatch { len: bad.len(), width });
        }
        let buf = values.concat();
        self.put_multiple_raw(key, &buf, width, values.len(), flags)
    }

    fn put_multiple_raw(
        &mut self,
        key: &[u8],
        buf: &[u8],
        width: usize,
        count: usize,
        flags: WriteFlags,
    ) -> LmdbResult<usize> {
        debug_assert_integer_key(self.db.flags(), key);
        self.execute(|txn, cursor| {
            txn.epoch += 1;
            let mut key_val = PinnedVal::new(key);
            // LMDB reads `count` elements starting at the first one.
            let mut data = [PinnedVal::new(&buf[..width]), PinnedVal::reserve(count)];
            let flags = flags.bits() | ffi::MDB_MULTIPLE as c_uint;
            let res = lmdb_result(unsafe {
                ffi::mdb_cursor_put(
                    cursor.ptr,
                    key_val.as_mut_ptr(),
                    data.as_mut_ptr() as *mut ffi::MDB_val,
                    flags,
                )
            });
            cursor.positioned = res.is_ok();
            res.map(|()| data[1].len())
        })
    }

    /// [`DatabaseFlags::DUP_FIXED`]-only: Return up to a page of duplicate data items from current
    /// cursor position. Move cursor to prepare for [`Self::next_multiple()`].
    ///
    /// Returns [`LmdbError::RequiresDupFixed`] if the database does not have the
    /// [`DatabaseFlags::DUP_FIXED`] flag set.
    pub fn get_multiple<T: FixedWidth>(&mut self) -> LmdbResult<Option<Vec<T>>> {
        self.require_dup_fixed()?;
        self.execute(|_, cursor| {
            if !cursor.positioned {
                return Err(LmdbError::CursorNotPositioned);
            }
            let mut key_val = PinnedVal::empty();
            let mut data_val = PinnedVal::empty();
            if !lmdb_found(unsafe {
                ffi::mdb_cursor_get(
                    cursor.ptr,
                    key_val.as_mut_ptr(),
                    data_val.as_mut_ptr(),
                    MDB_GET_MULTIPLE,
                )
            })? {
                cursor.positioned = false;
                return Ok(None);
            }
            if data_val.is_null() {
                // A single item is not stored as a duplicate page.
                lmdb_result(unsafe {
                    ffi::mdb_cursor_get(
                        cursor.ptr,
                        key_val.as_mut_ptr(),
                        data_val.as_mut_ptr(),
                        MDB_GET_CURRENT,
                    )
                })?;
            }
            decode_all(unsafe { data_val.as_slice() }).map(Some)
        })
    }

    /// [`DatabaseFlags::DUP_FIXED`]-only: Return up to a page of duplicate data items from next
    /// cursor position. Move cursor to prepare for the next call.
    ///
    /// Stays within the duplicates of the current key; on a new cursor it
    /// starts at the first key.
    pub fn next_multiple<T: FixedWidth>(&mut self) -> LmdbResult<Option<Vec<T>>> {
        self.require_dup_fixed()?;
        self.get_with(None, None, MDB_NEXT_MULTIPLE, |_, data, _| unsafe {
            decode_all(data.as_slice())
        })?
        .transpose()
    }

    /// Returns an iterator over database items.
    ///
    /// The iterator will begin with item next after the cursor, and continue
    /// until the end of the database. For new or unpositioned cursors, the
    /// iterator will begin with the first item in the database.
    ///
    /// For databases with duplicate data items ([`DatabaseFlags::DUP_SORT`]),
    /// the duplicate data items of each key will be returned before moving on
    /// to the next key.
    pub fn iter<'cur>(&'cur mut self) -> Iter<'tx, 'cur> {
        let op = if self.is_positioned() { MDB_NEXT } else { MDB_FIRST };
        Iter::new(self, op, MDB_NEXT)
    }

    /// Iterate over database items starting from the beginning of the database.
    pub fn iter_start<'cur>(&'cur mut self) -> Iter<'tx, 'cur> {
        Iter::new(self, MDB_FIRST, MDB_NEXT)
    }

    /// Iterate over database items starting from the given key.
    pub fn iter_from<'cur>(&'cur mut self, key: &[u8]) -> LmdbResult<Iter<'tx, 'cur>> {
        let first = self.get_owned_at(key, MDB_SET_RANGE)?;
        Ok(Iter::with_first(self, first, MDB_NEXT))
    }

    /// Iterate over the duplicates of the item in the database with the given
    /// key.
    pub fn iter_dup_of<'cur>(&'cur mut self, key: &[u8]) -> LmdbResult<Iter<'tx, 'cur>> {
        self.require_dup_sort()?;
        let first = self.get_owned_at(key, MDB_SET_KEY)?;
        Ok(Iter::with_first(self, first, MDB_NEXT_DUP))
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("txn", &self.txn.id())
            .field("db", &self.db.dbi())
            .finish_non_exhaustive()
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        // Lock order is transaction then cursor, as in every operation.
        let _txn = self.txn.inner().lock();
        CursorInner::close(&mut self.inner.core.lock());
    }
}
