//! Transaction management and access.
//!
//! # Core Types (re-exported at crate root)
//!
//! - [`Transaction`] - A read-only or read-write transaction, possibly
//!   nested in a parent
//! - [`TransactionState`] - Where a transaction is in its lifecycle
//! - [`Cursor`] - Database cursor for navigating entries
//! - [`Database`] - Handle to an opened database
//! - [`Iter`] - Owned iteration over a cursor
//!
//! # Ownership
//!
//! A transaction is bound to its environment, a nested transaction to its
//! parent, and a cursor to its transaction. Ending any of them, or closing
//! the environment, first closes everything bound to it, children before
//! parents. Handles outliving their owner report
//! [`LmdbError::TxnNotActive`](crate::LmdbError::TxnNotActive) instead of
//! touching freed native state.

mod assertions;

pub(crate) mod cache;

mod cursor;
pub use cursor::Cursor;

mod database;
pub use database::Database;

pub mod iter;
pub use iter::Iter;

mod kind;
pub use kind::TransactionState;
pub(crate) use kind::{new_span, next_txn_id};

mod ops;

mod transaction;
pub use transaction::Transaction;
pub(crate) use transaction::{TxInner, TxParts};
