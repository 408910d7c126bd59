use crate::{LmdbError, LmdbResult};
use byteorder::{ByteOrder, NativeEndian};

/// A fixed-width element of a [`DUP_FIXED`] database.
///
/// Each implementation is one row of the capability table used by the
/// batch cursor operations ([`Cursor::put_multiple`],
/// [`Cursor::get_multiple`], [`Cursor::next_multiple`]): it names the
/// element width and how to move a value in and out of that many bytes.
/// Integers use native byte order, matching [`INTEGER_DUP`].
///
/// ```
/// use lmdb_bridge::FixedWidth;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// struct Point { x: u16, y: u16 }
///
/// impl FixedWidth for Point {
///     const WIDTH: usize = 4;
///
///     fn encode(&self, out: &mut [u8]) {
///         self.x.encode(&mut out[..2]);
///         self.y.encode(&mut out[2..]);
///     }
///
///     fn decode(bytes: &[u8]) -> Self {
///         Point { x: u16::decode(&bytes[..2]), y: u16::decode(&bytes[2..]) }
///     }
/// }
/// ```
///
/// [`DUP_FIXED`]: crate::DatabaseFlags::DUP_FIXED
/// [`INTEGER_DUP`]: crate::DatabaseFlags::INTEGER_DUP
/// [`Cursor::put_multiple`]: crate::Cursor::put_multiple
/// [`Cursor::get_multiple`]: crate::Cursor::get_multiple
/// [`Cursor::next_multiple`]: crate::Cursor::next_multiple
pub trait FixedWidth: Copy {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Writes `self` into `out`, which is exactly [`Self::WIDTH`] bytes.
    fn encode(&self, out: &mut [u8]);

    /// Reads a value from `bytes`, which is exactly [`Self::WIDTH`] bytes.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! fixed_width_int {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl FixedWidth for $ty {
                const WIDTH: usize = size_of::<$ty>();

                #[inline]
                fn encode(&self, out: &mut [u8]) {
                    NativeEndian::$write(out, *self);
                }

                #[inline]
                fn decode(bytes: &[u8]) -> Self {
                    NativeEndian::$read(bytes)
                }
            }
        )*
    };
}

fixed_width_int! {
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
    u128 => write_u128, read_u128;
    i32 => write_i32, read_i32;
    i64 => write_i64, read_i64;
}

impl<const N: usize> FixedWidth for [u8; N] {
    const WIDTH: usize = N;

    #[inline]
    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(self);
    }

    #[inline]
    fn decode(bytes: &[u8]) -> Self {
        let mut arr = [0u8; N];
        arr.copy_from_slice(bytes);
        arr
    }
}

/// Packs `values` into one contiguous buffer.
pub(crate) fn encode_all<T: FixedWidth>(values: &[T]) -> Vec<u8> {
    let mut buf = vec![0u8; values.len() * T::WIDTH];
    if T::WIDTH > 0 {
        for (chunk, value) in buf.chunks_exact_mut(T::WIDTH).zip(values) {
            value.encode(chunk);
        }
    }
    buf
}

/// Unpacks a contiguous buffer into `len / T::WIDTH` elements.
///
/// Fails with [`LmdbError::ElementSizeMismatch`] if the buffer does not
/// split evenly.
pub(crate) fn decode_all<T: FixedWidth>(buf: &[u8]) -> LmdbResult<Vec<T>> {
    if T::WIDTH == 0 || buf.len() % T::WIDTH != 0 {
        return Err(LmdbError::ElementSizeMismatch { len: buf.len(), width: T::WIDTH });
    }
    Ok(buf.chunks_exact(T::WIDTH).map(T::decode).collect())
}
