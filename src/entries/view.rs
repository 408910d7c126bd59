//! A view of data borrowed from a transaction.
//!
//! This module provides [`ValueView`], a wrapper that checks the owning
//! transaction before every access to native memory.

use crate::{FixedWidth, LmdbError, LmdbResult, entries::val::PinnedVal, tx::TxInner};
use std::fmt;

/// A read-only view of a key or value inside the memory map.
///
/// LMDB hands out pointers into its map. Those stay valid only while the
/// transaction that produced them is active and has not written since.
/// `ValueView` records the transaction's epoch when it is created, and
/// every access re-checks it under the transaction lock. Once the
/// transaction writes, resets or ends, access fails with
/// [`LmdbError::StaleView`] instead of touching freed pages.
///
/// The view never exposes mutable access. Copy data out with
/// [`to_vec`](Self::to_vec) to keep it past the transaction.
///
/// The closure passed to [`with`](Self::with) runs while the transaction is
/// locked, so it must not call back into the same transaction.
///
/// ```no_run
/// # use lmdb_bridge::{Environment, LmdbResult};
/// # fn main() -> LmdbResult<()> {
/// # let env = Environment::builder().open("/tmp/view-example")?;
/// let txn = env.begin_ro_txn()?;
/// let db = txn.open_db(None)?;
/// if let Some(view) = txn.get(db, b"key")? {
///     let len = view.with(|bytes| bytes.len())?;
///     let owned: Vec<u8> = view.to_vec()?;
///     assert_eq!(len, owned.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ValueView<'tx> {
    data: *const u8,
    len: usize,
    txn: &'tx TxInner,
    epoch: u64,
}

impl<'tx> ValueView<'tx> {
    /// Wraps a descriptor filled in by the native library.
    ///
    /// # Safety
    ///
    /// `val` must point into memory owned by `txn` that is valid while
    /// `txn`'s epoch equals `epoch`.
    pub(crate) unsafe fn from_val(val: &PinnedVal<'_>, txn: &'tx TxInner, epoch: u64) -> Self {
        Self { data: val.data(), len: val.len(), txn, epoch }
    }

    /// Length of the viewed data. Does not touch native memory.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the viewed data is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if the view can still be read.
    pub fn is_valid(&self) -> bool {
        self.txn.view_epoch_matches(self.epoch)
    }

    /// Runs `f` over the viewed bytes while the transaction is locked.
    ///
    /// Returns [`LmdbError::StaleView`] if the transaction has written,
    /// reset or ended since the view was created.
    pub fn with<R, F>(&self, f: F) -> LmdbResult<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        self.txn.with_view(self.epoch, || {
            if self.len == 0 {
                return f(&[]);
            }
            // SAFETY: the epoch check above guarantees the pages are still
            // mapped and unmodified, and the lock holds them that way for
            // the duration of `f`.
            f(unsafe { std::slice::from_raw_parts(self.data, self.len) })
        })
    }

    /// Copies the viewed bytes into an owned buffer.
    pub fn to_vec(&self) -> LmdbResult<Vec<u8>> {
        self.with(<[u8]>::to_vec)
    }

    /// Decodes the viewed bytes as a single fixed-width value.
    pub fn decode<T: FixedWidth>(&self) -> LmdbResult<T> {
        if self.len != T::WIDTH {
            return Err(LmdbError::ElementSizeMismatch { len: self.len, width: T::WIDTH });
        }
        self.with(T::decode)
    }
}

impl fmt::Debug for ValueView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueView")
            .field("len", &self.len)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
