//! Broadcast completion signal for hosted builds.
//!
//! Every `complete_all` bumps a sequence number and wakes all waiters. A
//! waiter samples `sequence()` before checking its own condition and then
//! waits for the number to move, so a completion raised in between is
//! never lost and nothing has to be re-armed between rounds.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct Completion {
    seq: Mutex<u64>,
    cond: Condvar,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            seq: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    fn seq(&self) -> MutexGuard<'_, u64> {
        self.seq.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current completion count.
    pub fn sequence(&self) -> u64 {
        *self.seq()
    }

    /// Signal completion and wake every waiter.
    pub fn complete_all(&self) {
        let mut seq = self.seq();
        *seq = seq.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Wait until a completion newer than `seen` is signaled or `timeout`
    /// elapses.
    ///
    /// Returns `true` if the sequence moved past `seen`.
    pub fn wait_since(&self, seen: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.seq();
        loop {
            if *guard != seen {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .cond
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_returns_after_complete() {
        let c = Arc::new(Completion::new());
        let seen = c.sequence();
        let c2 = c.clone();
        let t = thread::spawn(move || c2.wait_since(seen, Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        c.complete_all();
        assert!(t.join().unwrap());
    }

    #[test]
    fn completion_before_wait_is_not_lost() {
        let c = Completion::new();
        let seen = c.sequence();
        c.complete_all();
        assert!(c.wait_since(seen, Duration::from_millis(1)));
        assert!(!c.wait_since(c.sequence(), Duration::from_millis(10)));
    }
}
