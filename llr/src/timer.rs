//! Phase watchdogs.
//!
//! Each instance owns one watchdog per busy phase. A watchdog is a parked
//! thread with a deadline; on expiry it only queues the bound timeout work
//! item, so the timeout itself is handled in order with everything else
//! on the device queue.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crate::error::{LlrError, Result};
use crate::instance::Llr;
use crate::state::LlrState;
use crate::work::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerId {
    Setup,
    Start,
}

impl TimerId {
    pub(crate) const ALL: [TimerId; 2] = [TimerId::Setup, TimerId::Start];

    pub(crate) const fn index(&self) -> usize {
        *self as usize
    }

    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            TimerId::Setup => "setup",
            TimerId::Start => "start",
        }
    }

    /// The only state the watchdog may be armed in.
    pub(crate) const fn busy_state(&self) -> LlrState {
        match self {
            TimerId::Setup => LlrState::SettingUp,
            TimerId::Start => LlrState::Starting,
        }
    }

    pub(crate) const fn work_item(&self) -> WorkItem {
        match self {
            TimerId::Setup => WorkItem::SetupTimeout,
            TimerId::Start => WorkItem::StartTimeout,
        }
    }
}

#[derive(Default)]
struct WatchdogState {
    deadline: Option<Instant>,
    firing: bool,
    shutdown: bool,
    target: Option<(Weak<Llr>, WorkItem)>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<WatchdogState>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WatchdogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct Watchdog {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl Watchdog {
    pub(crate) fn new(name: String) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || watchdog_loop(&thread_shared))
            .map_err(|e| {
                log::error!("llr watchdog spawn failed [{}]", e);
                LlrError::OutOfMemory
            })?;

        Ok(Self {
            shared,
            thread_id: handle.thread().id(),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Queue `item` for `llr` on expiry.
    pub(crate) fn bind(&self, llr: Weak<Llr>, item: WorkItem) {
        self.shared.lock().target = Some((llr, item));
    }

    /// (Re)arm for `timeout` from now.
    pub(crate) fn arm(&self, timeout: Duration) {
        self.shared.lock().deadline = Some(Instant::now() + timeout);
        self.shared.cond.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.shared.lock().deadline.is_some()
    }

    /// Disarm and wait out an expiry that is already firing. Returns
    /// `true` if the watchdog was armed.
    pub(crate) fn cancel_sync(&self) -> bool {
        let mut state = self.shared.lock();
        let armed = state.deadline.take().is_some();
        self.shared.cond.notify_all();

        if thread::current().id() != self.thread_id {
            while state.firing {
                state = self.shared.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
        }
        armed
    }

    /// Stop the watchdog thread. Nothing fires afterwards.
    pub(crate) fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.deadline = None;
            state.target = None;
        }
        self.shared.cond.notify_all();

        let handle = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if thread::current().id() != self.thread_id && handle.join().is_err() {
                log::error!("llr watchdog thread panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watchdog_loop(shared: &Shared) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }

        let Some(deadline) = state.deadline else {
            state = shared.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
            continue;
        };

        let now = Instant::now();
        if now < deadline {
            state = shared
                .cond
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
            continue;
        }

        state.deadline = None;
        let target = state.target.clone();
        state.firing = true;
        drop(state);

        if let Some((llr, item)) = target {
            if let Some(llr) = llr.upgrade() {
                log::debug!("{}: watchdog expired", llr.key());
                llr.work_queue(item);
            }
        }

        state = shared.lock();
        state.firing = false;
        shared.cond.notify_all();
    }
}

impl Llr {
    /// Arm the phase watchdog, but only while the phase is actually in
    /// flight.
    pub(crate) fn timer_begin(&self, id: TimerId) {
        let (state, timeout_ms) = self.with_inner(|inner| {
            let timeout_ms = match id {
                TimerId::Setup => inner.setup_timeout_ms,
                TimerId::Start => inner.start_timeout_ms,
            };
            (inner.state, timeout_ms)
        });

        if timeout_ms == 0 {
            log::warn!("{}: {} timer not armed, timeout is zero", self.key(), id.as_str());
            return;
        }
        if state != id.busy_state() {
            log::debug!("{}: {} timer not armed ({})", self.key(), id.as_str(), state);
            return;
        }

        log::debug!("{}: {} timer begin ({}ms)", self.key(), id.as_str(), timeout_ms);
        self.watchdog(id).arm(Duration::from_millis(u64::from(timeout_ms)));
    }

    pub(crate) fn timer_end(&self, id: TimerId) {
        if self.watchdog(id).cancel_sync() {
            log::debug!("{}: {} timer end", self.key(), id.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_without_target_is_harmless() {
        let dog = Watchdog::new("wd-test".into()).unwrap();
        dog.arm(Duration::from_millis(5));
        assert!(dog.is_armed());
        thread::sleep(Duration::from_millis(50));
        assert!(!dog.is_armed());
        assert!(!dog.cancel_sync());
    }

    #[test]
    fn cancel_disarms() {
        let dog = Watchdog::new("wd-test".into()).unwrap();
        dog.arm(Duration::from_secs(10));
        assert!(dog.cancel_sync());
        assert!(!dog.is_armed());
        dog.shutdown();
    }
}
