/// Error produced by a single `Load`/`Store` step of a TL2 transaction attempt.
///
/// `Retry` is the only variant: TL2 detects conflicts by re-validating versions,
/// not by any other failure mode. It is fully recovered by the driver loop in
/// [`crate::atomically`] / [`crate::run`] and never escapes to the caller.
#[derive(Eq, PartialEq, Clone, Copy, Debug, thiserror::Error)]
pub enum StmError {
    /// A read observed a lock held by another writer, or a version beyond the
    /// transaction's read-version bound. The current attempt must be discarded
    /// and the block re-executed from scratch.
    #[error("transaction must retry: a read observed a conflicting write")]
    Retry,
}

/// Result of a single step (`Load`/`Store`) of a TL2 calculation.
///
/// Use `?` to propagate a retry signal out of the block passed to `atomically`/`run`.
/// Do not match on it yourself; the driver loop is the only thing that should
/// interpret `StmError::Retry`.
pub type StmResult<T> = Result<T, StmError>;

/// Error produced by a transaction body that can also abort with a caller-defined error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError<E> {
    /// Failed due to a detected conflict; the driver will retry the block.
    #[error(transparent)]
    Stm(#[from] StmError),

    /// The block explicitly aborted. The transaction is discarded (no
    /// partial commit is ever observable) and `e` propagates to the caller
    /// of `atomically_with_err`/`run_with_err`.
    #[error("transaction aborted")]
    Abort(E),
}

/// Result of a transaction body that may abort with a caller error `E`.
pub type TransactionClosureResult<T, E> = Result<T, TransactionError<E>>;
