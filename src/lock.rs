use std::sync::atomic::{AtomicU64, Ordering};

/// High bit of the packed word marks the lock as held.
const LOCK_BIT: u64 = 1 << 63;
/// Remaining 63 bits carry the version.
const VERSION_MASK: u64 = LOCK_BIT - 1;

/// A versioned write-lock: one 64-bit atomic word packing a one-bit lock flag
/// and a 63-bit monotonic version, as used by TL2 to stamp and guard each
/// shared variable.
///
/// `TryAcquire` never spins — callers that fail to acquire are expected to
/// abort their attempt and retry the whole transaction instead of busy-waiting
/// on this lock specifically.
pub(crate) struct VersionLock {
    word: AtomicU64,
}

impl VersionLock {
    pub(crate) fn new() -> Self {
        VersionLock {
            word: AtomicU64::new(0),
        }
    }

    /// Atomically read `(locked, version)`.
    pub(crate) fn load(&self) -> (bool, u64) {
        let word = self.word.load(Ordering::Acquire);
        (word & LOCK_BIT != 0, word & VERSION_MASK)
    }

    /// Attempt to acquire the lock at the version it was last observed at.
    /// Fails immediately (no spinning) if the lock is held or the version
    /// has moved since `observed`.
    pub(crate) fn try_acquire(&self, observed: u64) -> bool {
        let unlocked = observed & VERSION_MASK;
        self.word
            .compare_exchange(
                unlocked,
                unlocked | LOCK_BIT,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Clear the lock bit and publish `wv` as the new version in one atomic
    /// store. Requires the lock to be held by the caller.
    pub(crate) fn commit(&self, wv: u64) {
        let word = self.word.load(Ordering::Relaxed);
        assert!(
            word & LOCK_BIT != 0,
            "VersionLock::commit called without holding the lock"
        );
        assert!(
            wv & LOCK_BIT == 0,
            "write-version overflowed the 63-bit version field"
        );
        self.word.store(wv, Ordering::Release);
    }

    /// Clear the lock bit, leaving the version unchanged. Used to abandon an
    /// acquisition made during a commit attempt that ultimately aborted.
    /// Requires the lock to be held by the caller.
    pub(crate) fn release(&self) {
        let word = self.word.load(Ordering::Relaxed);
        assert!(
            word & LOCK_BIT != 0,
            "VersionLock::release called without holding the lock"
        );
        self.word.store(word & VERSION_MASK, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_is_unlocked_at_version_zero() {
        let lock = VersionLock::new();
        assert_eq!(lock.load(), (false, 0));
    }

    #[test]
    fn try_acquire_succeeds_once() {
        let lock = VersionLock::new();
        assert!(lock.try_acquire(0));
        assert_eq!(lock.load(), (true, 0));
        // a second acquisition against the same observed version fails: the
        // word now has the lock bit set, so the compare-exchange can't match.
        assert!(!lock.try_acquire(0));
    }

    #[test]
    fn commit_clears_lock_and_publishes_version() {
        let lock = VersionLock::new();
        assert!(lock.try_acquire(0));
        lock.commit(7);
        assert_eq!(lock.load(), (false, 7));
    }

    #[test]
    fn release_clears_lock_and_keeps_version() {
        let lock = VersionLock::new();
        assert!(lock.try_acquire(0));
        lock.release();
        assert_eq!(lock.load(), (false, 0));
    }

    #[test]
    #[should_panic(expected = "without holding the lock")]
    fn commit_without_lock_panics() {
        let lock = VersionLock::new();
        lock.commit(1);
    }

    #[test]
    #[should_panic(expected = "without holding the lock")]
    fn release_without_lock_panics() {
        let lock = VersionLock::new();
        lock.release();
    }

    #[test]
    fn try_acquire_fails_on_stale_version() {
        let lock = VersionLock::new();
        assert!(lock.try_acquire(0));
        lock.commit(1);
        // a transaction that observed version 0 must not be able to lock
        // a variable that has since moved to version 1.
        assert!(!lock.try_acquire(0));
        assert!(lock.try_acquire(1));
    }
}
