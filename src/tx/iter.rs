//! Owned iteration over cursor items.

use crate::{Cursor, LmdbResult};
use ffi::MDB_cursor_op;

/// A key/value pair copied out of the database.
pub type OwnedItem = (Vec<u8>, Vec<u8>);

/// An iterator over the key/value pairs of a database, driven by a
/// [`Cursor`].
///
/// Items are copied out of the memory map, so they stay usable after the
/// transaction writes or ends. The cursor is left on the last item yielded.
/// Iteration stops after the first error.
pub struct Iter<'tx, 'cur> {
    cursor: &'cur mut Cursor<'tx>,
    /// Op for the first move, if the iterator positions the cursor itself.
    first_op: Option<MDB_cursor_op>,
    /// Item found while positioning, yielded before moving again.
    pending: Option<OwnedItem>,
    next_op: MDB_cursor_op,
    /// When true, the iterator is exhausted and will always return `None`.
    exhausted: bool,
}

impl core::fmt::Debug for Iter<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iter").field("exhausted", &self.exhausted).finish_non_exhaustive()
    }
}

impl<'tx: 'cur, 'cur> Iter<'tx, 'cur> {
    /// Create a new iterator that moves with `first_op`, then `next_op`.
    pub(crate) fn new(
        cursor: &'cur mut Cursor<'tx>,
        first_op: MDB_cursor_op,
        next_op: MDB_cursor_op,
    ) -> Self {
        Iter { cursor, first_op: Some(first_op), pending: None, next_op, exhausted: false }
    }

    /// Create a new iterator from an already positioned cursor, first
    /// yielding the item found there. `None` yields an exhausted iterator.
    pub(crate) fn with_first(
        cursor: &'cur mut Cursor<'tx>,
        first: Option<OwnedItem>,
        next_op: MDB_cursor_op,
    ) -> Self {
        let exhausted = first.is_none();
        Iter { cursor, first_op: None, pending: first, next_op, exhausted }
    }

    /// Own the next key/value pair from the iterator.
    ///
    /// Returns `Ok(None)` once the cursor runs past the last item.
    pub fn owned_next(&mut self) -> LmdbResult<Option<OwnedItem>> {
        if self.exhausted {
            return Ok(None);
        }
        if let Some(item) = self.pending.take() {
            return Ok(Some(item));
        }
        let op = self.first_op.take().unwrap_or(self.next_op);
        let res = self.cursor.get_owned(op);
        if !matches!(res, Ok(Some(_))) {
            self.exhausted = true;
        }
        res
    }
}

impl Iterator for Iter<'_, '_> {
    type Item = LmdbResult<OwnedItem>;

    fn next(&mut self) -> Option<Self::Item> {
        self.owned_next().transpose()
    }
}

impl std::iter::FusedIterator for Iter<'_, '_> {}
