//! Debug assertions to catch LMDB constraint violations before the native
//! library sees them.
//!
//! LMDB compares `INTEGER_KEY` keys and `INTEGER_DUP` values as native
//! `unsigned int` or `size_t`, and reads past the buffer when given any
//! other length.

use crate::flags::DatabaseFlags;

/// Debug assertion that validates key size for INTEGER_KEY databases (must be 4 or 8 bytes).
#[inline]
pub(crate) fn debug_assert_integer_key(flags: DatabaseFlags, key: &[u8]) {
    debug_assert!(
        !flags.contains(DatabaseFlags::INTEGER_KEY) || key.len() == 4 || key.len() == 8,
        "INTEGER_KEY database requires key length of 4 or 8 bytes, got {}",
        key.len()
    );
}

/// Debug assertion that validates value size for INTEGER_DUP databases (must be 4 or 8 bytes).
#[inline]
pub(crate) fn debug_assert_integer_dup(flags: DatabaseFlags, value: &[u8]) {
    debug_assert!(
        !flags.contains(DatabaseFlags::INTEGER_DUP) || value.len() == 4 || value.len() == 8,
        "INTEGER_DUP database requires value length of 4 or 8 bytes, got {}",
        value.len()
    );
}

/// Runs all key and value debug assertions for put operations.
#[inline]
pub(crate) fn debug_assert_put(flags: DatabaseFlags, key: &[u8], value: &[u8]) {
    debug_assert_integer_key(flags, key);
    debug_assert_integer_dup(flags, value);
}
