//! Native `{pointer, length}` descriptors.

use std::{ffi::c_void, marker::PhantomData, ptr};

/// An `MDB_val` lent to a single native call.
///
/// Built from a caller slice, the descriptor borrows that slice for `'a`,
/// so the buffer cannot move or be freed until the descriptor is dropped.
/// Descriptors are always stack locals scoped to one call, which releases
/// the borrow on every exit path.
///
/// Cursor operations may overwrite the descriptor with a pointer into the
/// memory map. [`PinnedVal::points_at`] tells the two cases apart.
#[repr(transparent)]
pub(crate) struct PinnedVal<'a> {
    val: ffi::MDB_val,
    _borrow: PhantomData<&'a [u8]>,
}

impl<'a> PinnedVal<'a> {
    /// Lends `bytes` to the native library.
    #[inline]
    pub(crate) const fn new(bytes: &'a [u8]) -> Self {
        Self {
            val: ffi::MDB_val { mv_size: bytes.len(), mv_data: bytes.as_ptr() as *mut c_void },
            _borrow: PhantomData,
        }
    }

    /// An empty descriptor, to be filled in by the native library.
    #[inline]
    pub(crate) const fn empty() -> Self {
        Self { val: ffi::MDB_val { mv_size: 0, mv_data: ptr::null_mut() }, _borrow: PhantomData }
    }

    /// A descriptor asking the native library to reserve `len` bytes.
    #[inline]
    pub(crate) const fn reserve(len: usize) -> Self {
        Self { val: ffi::MDB_val { mv_size: len, mv_data: ptr::null_mut() }, _borrow: PhantomData }
    }

    /// Lends `bytes` if present, or creates an empty descriptor.
    #[inline]
    pub(crate) const fn from_opt(bytes: Option<&'a [u8]>) -> Self {
        match bytes {
            Some(bytes) => Self::new(bytes),
            None => Self::empty(),
        }
    }

    /// Pointer handed to the native call.
    #[inline]
    pub(crate) const fn as_mut_ptr(&mut self) -> *mut ffi::MDB_val {
        &mut self.val
    }

    /// Returns `true` if the descriptor still points at `bytes`.
    #[inline]
    pub(crate) fn points_at(&self, bytes: Option<&[u8]>) -> bool {
        bytes.is_some_and(|b| ptr::eq(b.as_ptr(), self.val.mv_data as *const u8))
    }

    /// Raw data pointer.
    #[inline]
    pub(crate) const fn data(&self) -> *const u8 {
        self.val.mv_data as *const u8
    }

    /// Length in bytes.
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.val.mv_size
    }

    /// Returns `true` if the native call left the descriptor empty.
    #[inline]
    pub(crate) fn is_null(&self) -> bool {
        self.val.mv_data.is_null()
    }

    /// Reinterprets the descriptor as a slice.
    ///
    /// # Safety
    ///
    /// The descriptor must point at `len()` readable bytes that stay valid
    /// for `'t`.
    #[inline]
    pub(crate) unsafe fn as_slice<'t>(&self) -> &'t [u8] {
        if self.val.mv_size == 0 {
            return &[];
        }
        // SAFETY: upheld by the caller.
        unsafe { std::slice::from_raw_parts(self.data(), self.val.mv_size) }
    }
}

impl std::fmt::Debug for PinnedVal<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedVal").field("len", &self.val.mv_size).finish_non_exhaustive()
    }
}
