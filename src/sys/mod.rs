//! Environment-level plumbing.
//!
//! [`Environment`] owns the native environment and begins root
//! transactions. The rest is crate-internal: admission gates for the
//! single root writer and for database handle opens, the closing signal
//! that cascades ends from owners to dependents, and the thread that
//! begins and ends every read-write transaction.

mod environment;
pub(crate) use environment::EnvPtr;
pub use environment::{
    DEFAULT_MODE, Environment, EnvironmentBuilder, Info, Stat, Version, version,
};

pub(crate) mod gate;

pub(crate) mod signal;

pub(crate) mod txn_manager;
