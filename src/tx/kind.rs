use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique transaction id.
pub(crate) fn next_txn_id() -> u64 {
    NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed)
}

/// State of a [`Transaction`](crate::Transaction).
///
/// ```text
///            reset            commit
///   Reset <--------- Active ---------> Committed
///     |    --------->   |
///     |      renew      | abort, parent end,
///     |                 | environment close
///     +------------> Aborted
/// ```
///
/// `Committed` and `Aborted` are terminal. Only read-only transactions can
/// be reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// The transaction can be used.
    Active,
    /// A read-only transaction released its snapshot and awaits
    /// [`renew`](crate::Transaction::renew).
    Reset,
    /// The transaction committed.
    Committed,
    /// The transaction aborted, explicitly or by cascade.
    Aborted,
}

impl TransactionState {
    /// Returns `true` for `Committed` and `Aborted`.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "Active",
            Self::Reset => "Reset",
            Self::Committed => "Committed",
            Self::Aborted => "Aborted",
        })
    }
}

/// Create a new tracing span for a transaction.
pub(crate) fn new_span(read_only: bool, txn_id: u64) -> tracing::Span {
    tracing::debug_span!(
        target: "lmdb",
        "lmdb_txn",
        kind = %if read_only { "ro" } else { "rw" },
        txn_id = txn_id,
    )
}
