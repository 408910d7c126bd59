//! Safe, managed bindings for [LMDB].
//!
//! # Overview
//!
//! [LMDB] is an embedded, memory-mapped, transactional key-value store.
//! Its C API hands out raw handles whose validity depends on each other:
//! a cursor dies with its transaction, a nested transaction with its
//! parent, everything with the environment. This crate tracks that
//! ownership graph so no handle can reach freed native state:
//!
//! - Ending a transaction or closing the environment first closes every
//!   dependent cursor and nested transaction, innermost first.
//! - Operations on an ended handle fail with
//!   [`LmdbError::TxnNotActive`] instead of crashing.
//! - Database handles are cached per environment, so every transaction
//!   sees the same handle for the same name.
//! - Reads return [`ValueView`]s over the memory map, checked on every
//!   access and invalidated by the next write or the end of the
//!   transaction.
//!
//! # Quick Start
//!
//! Databases are stored in a directory on disk. The following example
//! demonstrates creating an environment, writing a key-value pair, and
//! reading it back.
//!
//! ```no_run
//! use lmdb_bridge::{Environment, DatabaseFlags, WriteFlags, LmdbResult};
//! use std::path::Path;
//!
//! fn main() -> LmdbResult<()> {
//!     // Open an environment (creates directory if needed)
//!     let env = Environment::builder()
//!         .set_map_size(1024 * 1024 * 1024) // up to 1GB
//!         .set_max_dbs(4)
//!         .open(Path::new("/tmp/my_database"))?;
//!
//!     // Write data in a read-write transaction
//!     let txn = env.begin_rw_txn()?;
//!     let db = txn.create_db(Some("greetings"), DatabaseFlags::empty())?;
//!     txn.put(db, b"hello", b"world", WriteFlags::empty())?;
//!     txn.commit()?;
//!
//!     // Read data in a read-only transaction
//!     let txn = env.begin_ro_txn()?;
//!     let db = txn.open_db(Some("greetings"))?;
//!     let value = txn.get_owned(db, b"hello")?;
//!     assert_eq!(value.as_deref(), Some(b"world".as_slice()));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Key Concepts
//!
//! - [`Environment`] - A directory containing one or more databases. Created
//!   via [`Environment::builder()`] or [`Environment::new()`].
//! - [`Transaction`] - A read-only or read-write transaction. Read-write
//!   transactions can nest with [`Transaction::begin_nested_txn()`];
//!   read-only ones can be [reset](Transaction::reset) and
//!   [renewed](Transaction::renew).
//! - [`Database`] - A named or unnamed key-value store within an environment.
//!   - Opened with [`Transaction::open_db()`].
//!   - Created with [`Transaction::create_db()`].
//! - [`Cursor`]: Enables iteration and positioned access within a database.
//!   Created via [`Transaction::cursor()`].
//!
//! # Views vs Owned Data
//!
//! Borrowed reads such as [`Transaction::get`] and [`Cursor::first`] return
//! [`ValueView`]s. Reading one after the transaction wrote or ended fails
//! with [`LmdbError::StaleView`]:
//!
//! ```ignore
//! let value = txn.get(db, b"key")?.unwrap();
//! txn.put(db, b"other", b"x", WriteFlags::empty())?;
//! assert_eq!(value.to_vec(), Err(LmdbError::StaleView));
//! ```
//!
//! Owned reads such as [`Transaction::get_owned`] and [`Cursor::iter`] copy
//! the data out and have no such restriction.
//!
//! # Debug assertions
//!
//! When compiled with debug assertions enabled (the default for
//! `cargo build`), keys of `INTEGER_KEY` databases and values of
//! `INTEGER_DUP` databases are checked to be 4 or 8 bytes long before they
//! reach LMDB.
//!
//! # Logging
//!
//! Transactions log their lifecycle through [`tracing`] under the `lmdb`
//! target, each inside its own `lmdb_txn` span.
//!
//! [LMDB]: http://www.lmdb.tech/doc/

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub extern crate lmdb_master_sys as ffi;

pub mod entries;
pub use entries::{FixedWidth, KvView, ValueView};

mod error;
pub use error::{ErrorClass, LmdbError, LmdbResult};

mod flags;
pub use flags::{DatabaseFlags, EnvironmentFlags, TransactionFlags, WriteFlags};

pub mod sys;
pub use sys::{DEFAULT_MODE, Environment, EnvironmentBuilder, Info, Stat, Version, version};

pub mod tx;
pub use tx::{Cursor, Database, Iter, Transaction, TransactionState};

#[cfg(test)]
mod test {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};
    use tempfile::tempdir;

    /// Regression test for <https://github.com/danburkert/lmdb-rs/issues/21>.
    /// This test reliably segfaults when run against lmdb compiled with opt
    /// level -O3 and newer GCC compilers.
    #[test]
    fn issue_21_regression() {
        const HEIGHT_KEY: [u8; 1] = [0];

        let dir = tempdir().unwrap();

        let env = {
            let mut builder = Environment::builder();
            builder.set_max_dbs(2);
            builder.set_map_size(1_000_000);
            builder.open(dir.path()).expect("open lmdb env")
        };

        for height in 0..1000 {
            let mut value = [0u8; 8];
            LittleEndian::write_u64(&mut value, height);
            let tx = env.begin_rw_txn().expect("begin_rw_txn");
            let index = tx.create_db(None, DatabaseFlags::DUP_SORT).expect("open index db");
            tx.put(index, &HEIGHT_KEY, &value, WriteFlags::empty()).expect("tx.put");
            tx.commit().expect("tx.commit");
        }
    }
}
