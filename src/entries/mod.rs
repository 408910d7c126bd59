//! Safe access to database entries.
//!
//! Keys and values cross the FFI boundary as `{pointer, length}`
//! descriptors. Writes lend caller slices for a single native call; reads
//! come back as [`ValueView`]s over native memory, checked against the
//! owning transaction on every access. Fixed-width batch elements are
//! described by [`FixedWidth`].

mod codec;
pub use codec::FixedWidth;
pub(crate) use codec::{decode_all, encode_all};

pub(crate) mod val;

mod view;
pub use view::ValueView;

/// A key/value pair of views.
pub type KvView<'tx> = (ValueView<'tx>, ValueView<'tx>);
