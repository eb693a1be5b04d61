//! Bounded correlation of asynchronous replies.
//!
//! Replies from the system under test arrive on their own schedule and carry
//! no case identifier, so correlation is purely temporal: one reply slot,
//! cleared before every transmission, consumed by one bounded wait. Clearing
//! first is the property everything else leans on: a reply left over from an
//! earlier case can never satisfy the current case's wait.
//!
//! The slot holds at most one reply and keeps the newest on overflow. The
//! harness wants the latest state of the system under test, not a backlog.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::link::AnnotationReply;

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Option<AnnotationReply>>,
    ready: Condvar,
}

impl Shared {
    // A panicking poster must not take the whole suite down with a
    // poisoned lock; the slot content is always valid on its own.
    fn lock(&self) -> MutexGuard<'_, Option<AnnotationReply>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome of [`ReplyCorrelator::wait`].
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// A reply arrived within the budget, or was already pending.
    Reply(AnnotationReply),
    /// The budget elapsed with no reply.
    TimedOut,
}

/// Consumer side of the reply slot, owned by the suite runner.
#[derive(Debug, Default)]
pub struct ReplyCorrelator {
    shared: Arc<Shared>,
}

impl ReplyCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer handle for link wiring. Cheap to clone and callable from any
    /// thread at any time.
    #[must_use]
    pub fn handle(&self) -> ReplyHandle {
        ReplyHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Drop any pending reply. Idempotent.
    ///
    /// Must run before every transmission; skipping it reopens the race
    /// where a late reply to case `k` gets attributed to case `k + 1`.
    pub fn clear(&self) {
        let mut slot = self.shared.lock();
        if slot.take().is_some() {
            debug!("discarded stale reply from an earlier case");
        }
    }

    /// Block until a reply is available or `timeout` elapses.
    ///
    /// A pending reply returns immediately. The reply is consumed: a second
    /// wait needs a new post. Spurious wakeups are re-entered against the
    /// remaining budget.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        let guard = self.shared.lock();
        let (mut guard, _) = self
            .shared
            .ready
            .wait_timeout_while(guard, timeout, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(reply) => WaitOutcome::Reply(reply),
            None => WaitOutcome::TimedOut,
        }
    }

    /// True when a reply is pending right now. Diagnostic only; the answer
    /// can be stale by the time the caller acts on it.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.shared.lock().is_some()
    }
}

/// Producer side of the reply slot.
#[derive(Debug, Clone)]
pub struct ReplyHandle {
    shared: Arc<Shared>,
}

impl ReplyHandle {
    /// Post a reply and wake the waiter, if any. Never blocks on the
    /// consumer; an unconsumed predecessor is replaced by the newer reply.
    pub fn post(&self, reply: AnnotationReply) {
        let mut slot = self.shared.lock();
        if slot.replace(reply).is_some() {
            debug!("reply overwrote an unconsumed predecessor");
        }
        drop(slot);
        self.shared.ready.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::thread;
    use std::time::Instant;

    fn reply(ids: &[u32]) -> AnnotationReply {
        AnnotationReply::from_categories(ids.iter().copied())
    }

    #[test]
    fn wait_times_out_when_nothing_is_posted() {
        let correlator = ReplyCorrelator::new();
        let start = Instant::now();
        let outcome = correlator.wait(Duration::from_millis(30));
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn pending_reply_returns_immediately_and_is_consumed() {
        let correlator = ReplyCorrelator::new();
        correlator.handle().post(reply(&[7]));

        match correlator.wait(Duration::from_secs(1)) {
            WaitOutcome::Reply(r) => assert_eq!(r.categories, BTreeSet::from([7])),
            WaitOutcome::TimedOut => panic!("pending reply was not returned"),
        }
        // Consumed: the slot is empty again.
        assert_eq!(
            correlator.wait(Duration::from_millis(10)),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn clear_discards_a_pending_reply() {
        let correlator = ReplyCorrelator::new();
        correlator.handle().post(reply(&[9]));
        assert!(correlator.has_pending());

        correlator.clear();

        assert!(!correlator.has_pending());
        assert_eq!(
            correlator.wait(Duration::from_millis(10)),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn clear_on_an_empty_slot_is_a_no_op() {
        let correlator = ReplyCorrelator::new();
        correlator.clear();
        correlator.clear();
        assert_eq!(
            correlator.wait(Duration::from_millis(10)),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn newest_reply_wins_when_posting_twice() {
        let correlator = ReplyCorrelator::new();
        let handle = correlator.handle();
        handle.post(reply(&[1]));
        handle.post(reply(&[2]));

        match correlator.wait(Duration::from_secs(1)) {
            WaitOutcome::Reply(r) => assert_eq!(r.categories, BTreeSet::from([2])),
            WaitOutcome::TimedOut => panic!("reply missing"),
        }
    }

    #[test]
    fn reply_posted_during_wait_wakes_the_waiter() {
        let correlator = ReplyCorrelator::new();
        let handle = correlator.handle();
        let poster = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.post(reply(&[7]));
        });

        match correlator.wait(Duration::from_secs(2)) {
            WaitOutcome::Reply(r) => assert_eq!(r.categories, BTreeSet::from([7])),
            WaitOutcome::TimedOut => panic!("waiter was not woken"),
        }
        poster.join().unwrap();
    }

    #[test]
    fn stale_reply_never_satisfies_the_next_wait() {
        let correlator = ReplyCorrelator::new();
        let handle = correlator.handle();

        // Leftover from an earlier case.
        handle.post(reply(&[9]));
        correlator.clear();

        let fresh = correlator.handle();
        let poster = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            fresh.post(reply(&[7]));
        });

        match correlator.wait(Duration::from_secs(2)) {
            WaitOutcome::Reply(r) => {
                // The stale 9 must be gone; only the fresh 7 is visible.
                assert_eq!(r.categories, BTreeSet::from([7]));
            }
            WaitOutcome::TimedOut => panic!("fresh reply missing"),
        }
        poster.join().unwrap();
    }
}
