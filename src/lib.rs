//! An implementation of
//! [software transactional memory](https://en.wikipedia.org/wiki/Software_transactional_memory)
//! using the TL2 (Transactional Locking II) algorithm of Dice, Shalev and
//! Shavit.
//!
//! With locks the sequential composition of two threadsafe actions is no
//! longer threadsafe, because other threads may interleave between them.
//! Software transactional memory avoids this: a transaction buffers its
//! reads and writes in a private log, and only publishes the writes if
//! nothing it read has changed in the meantime. Otherwise the whole
//! computation is discarded and retried from scratch.
//!
//! TL2 specifically distinguishes itself from lock-based and obstruction-free
//! designs by never blocking a reader on a writer: a transaction samples a
//! global version clock once at the start of an attempt, and every shared
//! [`Variable`] it touches is checked against that sampled version rather
//! than against any lock held by another thread. Writers only take locks
//! (one per written variable, acquired without spinning) for the brief
//! window between validating the read set and publishing the new values.
//!
//! # Usage
//!
//! Run a top-level atomic operation with [`atomically`]:
//!
//! ```
//! # use tl2_stm::atomically;
//! let x = atomically(|_| Ok(42));
//! assert_eq!(x, 42);
//! ```
//!
//! Use `?` on [`StmResult`] to propagate a retry signal through the system.
//! Do not match on it yourself; the driver loop inside `atomically`/`run` is
//! the only thing that interprets it.
//!
//! ```
//! # use tl2_stm::{atomically, Variable};
//! let var = Variable::new(0);
//!
//! let x = atomically(|tx| {
//!     var.store(tx, 42)?;
//!     var.load(tx)
//! });
//!
//! assert_eq!(x, 42);
//! ```
//!
//! # Transaction safety
//!
//! * Don't run code with side effects, especially I/O, inside a transaction
//!   body. Attempts repeat on conflict, and would repeat the side effect too.
//! * Don't handle [`StmError`] yourself; always propagate it with `?`.
//! * Don't call `atomically`/`run` from inside another transaction body.
//!   Nested calls are detected at runtime and panic. When composing STM
//!   operations, take `&mut Transaction` as a parameter and return
//!   `StmResult<T>` instead.
//! * Don't mix locks or other blocking primitives with transactions; they can
//!   interfere with the locking TL2 does internally and cause deadlocks.
//! * Don't use interior mutability to bypass a [`Variable`] — all shared
//!   state a transaction touches must go through one.
//!
//! Panicking inside a transaction body is transaction-safe: the attempt's
//! write set is simply dropped unpublished, the same as a caller-observed
//! retry.
//!
//! # Speed
//!
//! Keep atomic blocks small. The longer an attempt runs, the likelier it is
//! to be invalidated by a concurrent commit. Read-only transactions commit
//! without ever taking a lock or touching the clock (§ read-only fast path);
//! keep writes out of a block unless they're actually needed.

mod clock;
mod lock;
mod result;
mod transaction;
mod variable;

pub use clock::VersionClock;
pub use result::{StmError, StmResult, TransactionClosureResult, TransactionError};
pub use transaction::{atomically, atomically_with_err, run, run_with_err, Transaction};
pub use variable::Variable;
