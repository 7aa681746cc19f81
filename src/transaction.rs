use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::any::Any;
use std::cell::Cell;
use std::sync::Arc;

use crate::clock::VersionClock;
use crate::result::{StmError, StmResult, TransactionClosureResult, TransactionError};
use crate::variable::{Variable, VariableControlBlock};

type ErasedValue = Arc<dyn Any + Send + Sync>;

/// A buffered write: the control block it targets, and the latest
/// speculative value to publish on commit.
struct WriteEntry {
    var: Arc<VariableControlBlock>,
    value: ErasedValue,
}

thread_local!(static TRANSACTION_RUNNING: Cell<bool> = const { Cell::new(false) });

/// Detects nested `atomically`/`run` calls on the same thread. Nested
/// transactions are an explicit non-goal: a silent nested call would share
/// (and corrupt) the outer attempt's read/write sets.
struct TransactionGuard;

impl TransactionGuard {
    fn new() -> TransactionGuard {
        TRANSACTION_RUNNING.with(|t| {
            assert!(!t.get(), "STM: nested transaction on the same thread");
            t.set(true);
        });
        TransactionGuard
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        TRANSACTION_RUNNING.with(|t| t.set(false));
    }
}

/// Tracks one attempt's read set, write set, and acquired locks.
///
/// A `Transaction` is thread-local to one attempt; it is never shared between
/// threads (§5). Construct one with [`Transaction::new`] and pass it to
/// [`crate::run`], or let [`crate::atomically`] manage one internally.
pub struct Transaction {
    rv: u64,
    read_set: Vec<Arc<VariableControlBlock>>,
    write_set: FxHashMap<usize, WriteEntry>,
    locked: SmallVec<[Arc<VariableControlBlock>; 8]>,
    retry: bool,
}

/// Outcome of one commit attempt (§4.4 steps 4-8).
enum CommitOutcome {
    Committed,
    Retry,
}

impl Transaction {
    /// Create a fresh, empty transaction.
    pub fn new() -> Transaction {
        Transaction {
            rv: 0,
            read_set: Vec::new(),
            write_set: FxHashMap::default(),
            locked: SmallVec::new(),
            retry: false,
        }
    }

    /// §4.3 Load(V): post-image read with inline double-sample validation.
    pub fn load<T>(&mut self, var: &Variable<T>) -> StmResult<T>
    where
        T: Any + Send + Sync + Clone,
    {
        // Short-circuit once this attempt is already doomed (§9 "Open question",
        // explicitly sanctioned): avoids redundant atomic traffic, the result
        // is discarded at the next retry check regardless.
        if self.retry {
            return Err(StmError::Retry);
        }

        let control_block = var.control_block();
        let key = Arc::as_ptr(control_block) as usize;

        // Step 1 (read-your-own-writes): buffered value wins, untouched by the lock.
        if let Some(entry) = self.write_set.get(&key) {
            return Ok(Variable::downcast(entry.value.clone()));
        }

        let (l1_locked, l1_version) = control_block.lock.load();
        if l1_locked || l1_version > self.rv {
            self.abort();
            return Err(StmError::Retry);
        }

        let value = control_block.read_value();

        let (l2_locked, l2_version) = control_block.lock.load();
        if l2_locked || l2_version != l1_version || l2_version > self.rv {
            self.abort();
            return Err(StmError::Retry);
        }

        self.read_set.push(control_block.clone());
        Ok(Variable::downcast(value))
    }

    /// §4.3 Store(V, value): buffer-only, lazily allocates the write set.
    pub fn store<T>(&mut self, var: &Variable<T>, value: T) -> StmResult<()>
    where
        T: Any + Send + Sync + Clone,
    {
        let control_block = var.control_block();
        let key = Arc::as_ptr(control_block) as usize;
        let boxed: ErasedValue = Arc::new(value);

        self.write_set
            .entry(key)
            .and_modify(|entry| entry.value = boxed.clone())
            .or_insert_with(|| WriteEntry {
                var: control_block.clone(),
                value: boxed,
            });

        Ok(())
    }

    /// §4.5 abort and cleanup: release any locks acquired so far, clear all
    /// buffers, reset `rv`, and mark the attempt for retry.
    fn abort(&mut self) {
        for var in self.locked.drain(..) {
            var.lock.release();
        }
        self.read_set.clear();
        self.write_set.clear();
        self.rv = 0;
        self.retry = true;
    }

    /// Prepare for a fresh attempt at read-version `rv`. Buffers are usually
    /// already empty (either this is the first attempt, or the previous one
    /// ended in `abort()`), but a block that ignores a retry signal and keeps
    /// issuing `store`s after the signal (§9's sanctioned-but-wasteful case)
    /// can repopulate `write_set` after `abort()` already cleared it. Clear
    /// unconditionally rather than asserting, so that stale work is always
    /// discarded before the next attempt — capacity is retained either way.
    fn begin_attempt(&mut self, rv: u64) {
        self.read_set.clear();
        self.write_set.clear();
        self.locked.clear();
        self.rv = rv;
        self.retry = false;
    }

    /// §4.4 steps 4-8: acquire write locks, bump the clock, validate the
    /// read set, write back, and release. Always leaves the transaction
    /// ready for either the caller to return (`Committed`) or the driver to
    /// loop (`Retry`, buffers already cleared by `abort()`).
    fn commit_attempt(&mut self, clock: &VersionClock) -> CommitOutcome {
        // Step 4: read-only fast path. No lock, no clock touched.
        if self.write_set.is_empty() {
            self.read_set.clear();
            return CommitOutcome::Committed;
        }

        // Step 5: acquire every write-set lock.
        for entry in self.write_set.values() {
            let (locked, version) = entry.var.lock.load();
            if locked || !entry.var.lock.try_acquire(version) {
                self.abort();
                return CommitOutcome::Retry;
            }
            self.locked.push(entry.var.clone());
        }

        // Step 6: bump the clock.
        let wv = clock.increment();

        // Step 7: validate the read set unless no other commit could have
        // interleaved (wv == rv + 1: the proof in §4.4).
        if wv != self.rv + 1 {
            for var in &self.read_set {
                let key = Arc::as_ptr(var) as usize;
                if self.write_set.contains_key(&key) {
                    // Locked by this same transaction: trivially valid.
                    continue;
                }
                let (locked, version) = var.lock.load();
                if locked || version > self.rv {
                    self.abort();
                    return CommitOutcome::Retry;
                }
            }
        }

        // Step 8: write values back and publish wv, then release.
        for entry in self.write_set.values() {
            entry.var.write_value(entry.value.clone());
            entry.var.lock.commit(wv);
        }

        self.read_set.clear();
        self.write_set.clear();
        self.locked.clear();
        CommitOutcome::Committed
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction::new()
    }
}

/// §4.6 driver: attempt the block against `clock`/`tx` until one attempt
/// commits. `tx`'s buffers are reused (not reallocated) across attempts and
/// across repeated calls to `run` — the reuse form promised by §4.6.
pub fn run<T, F>(clock: &VersionClock, tx: &mut Transaction, f: F) -> T
where
    F: Fn(&mut Transaction) -> StmResult<T>,
{
    let _guard = TransactionGuard::new();
    loop {
        tx.begin_attempt(clock.load());
        match f(tx) {
            Ok(value) if !tx.retry => {
                if let CommitOutcome::Committed = tx.commit_attempt(clock) {
                    return value;
                }
            }
            _ => {}
        }
    }
}

/// The reuse form's fallible counterpart: the block may abort with a
/// caller-defined error `E`, which propagates immediately (no retry) after
/// any locks acquired in the current attempt are released.
pub fn run_with_err<T, E, F>(clock: &VersionClock, tx: &mut Transaction, f: F) -> Result<T, E>
where
    F: Fn(&mut Transaction) -> TransactionClosureResult<T, E>,
{
    let _guard = TransactionGuard::new();
    loop {
        tx.begin_attempt(clock.load());
        match f(tx) {
            Ok(value) if !tx.retry => {
                if let CommitOutcome::Committed = tx.commit_attempt(clock) {
                    return Ok(value);
                }
            }
            Err(TransactionError::Abort(e)) => {
                // The block never held a lock outside of commit_attempt, so
                // there is nothing to release here; just leave tx clean.
                tx.read_set.clear();
                tx.write_set.clear();
                return Err(e);
            }
            _ => {}
        }
    }
}

/// Run `f` atomically using the process-wide [`VersionClock`]. Creates a
/// fresh [`Transaction`] for the call (the allocation-light form of §4.6).
pub fn atomically<T, F>(f: F) -> T
where
    F: Fn(&mut Transaction) -> StmResult<T>,
{
    let mut tx = Transaction::new();
    run(VersionClock::global(), &mut tx, f)
}

/// Run `f` atomically using the process-wide [`VersionClock`], allowing the
/// block to abort early with a caller-defined error.
pub fn atomically_with_err<T, E, F>(f: F) -> Result<T, E>
where
    F: Fn(&mut Transaction) -> TransactionClosureResult<T, E>,
{
    let mut tx = Transaction::new();
    run_with_err(VersionClock::global(), &mut tx, f)
}
