use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Monotonic 64-bit counter shared by a cohort of [`crate::Variable`]s.
///
/// A transaction samples the clock into its read-version `rv` at the start of
/// an attempt, and bumps it to obtain its write-version `wv` at commit. The
/// clock itself carries no knowledge of which variables use it — callers are
/// responsible for committing a variable only against the clock it was
/// sampled from (§4.2: using two different clocks against the same variable
/// voids all guarantees).
///
/// Most callers don't need to construct one directly: `atomically` uses
/// [`VersionClock::global`], a single process-wide instance. Constructing a
/// private `VersionClock` lets independent cohorts of variables avoid
/// contending on that shared counter.
pub struct VersionClock {
    counter: AtomicU64,
}

impl VersionClock {
    /// Create a new clock starting at version 0.
    pub fn new() -> Self {
        VersionClock {
            counter: AtomicU64::new(0),
        }
    }

    /// The process-wide clock used by [`crate::atomically`] / [`crate::atomically_with_err`].
    pub fn global() -> &'static VersionClock {
        static GLOBAL: OnceLock<VersionClock> = OnceLock::new();
        GLOBAL.get_or_init(VersionClock::new)
    }

    /// Atomically read the current version.
    pub(crate) fn load(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Atomically bump the clock and return the post-increment value — the
    /// `wv` a committing transaction stamps into every variable it wrote.
    pub(crate) fn increment(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        VersionClock::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let clock = VersionClock::new();
        assert_eq!(clock.load(), 0);
    }

    #[test]
    fn increment_returns_post_increment_value() {
        let clock = VersionClock::new();
        assert_eq!(clock.increment(), 1);
        assert_eq!(clock.increment(), 2);
        assert_eq!(clock.load(), 2);
    }

    #[test]
    fn global_is_a_single_shared_instance() {
        let a = VersionClock::global();
        let b = VersionClock::global();
        let before = a.load();
        a.increment();
        assert_eq!(b.load(), before + 1);
    }
}
