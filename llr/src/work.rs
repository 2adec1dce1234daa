//! Per-device ordered work queue.
//!
//! One worker thread runs every deferred LLR handler of a device in
//! submission order. A (instance, item) pair is pending at most once; an
//! item that is already running may be queued again.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};

use crate::error::{LlrError, Result};
use crate::instance::{Llr, LlrKey};

/// Pending items allowed per device before submissions are refused,
/// unless the device sets its own limit.
pub(crate) const MAX_DEPTH: usize = 256;

/// Deferred operations of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkItem {
    Setup,
    SetupReuseTiming,
    SetupLoopTimeIntr,
    SetupUnexpLoopTimeIntr,
    SetupTimeout,
    Start,
    StartInitCompleteIntr,
    StartTimeout,
    SetupCancel,
    StartCancel,
    Stop,
}

impl WorkItem {
    pub(crate) const SETUP_PHASE: [WorkItem; 5] = [
        WorkItem::Setup,
        WorkItem::SetupReuseTiming,
        WorkItem::SetupLoopTimeIntr,
        WorkItem::SetupUnexpLoopTimeIntr,
        WorkItem::SetupTimeout,
    ];

    pub(crate) const START_PHASE: [WorkItem; 3] = [
        WorkItem::Start,
        WorkItem::StartInitCompleteIntr,
        WorkItem::StartTimeout,
    ];

    /// Commands wind a phase down and are never refused for a pending
    /// cancel.
    pub(crate) const fn is_command(&self) -> bool {
        matches!(self, WorkItem::SetupCancel | WorkItem::StartCancel | WorkItem::Stop)
    }

    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            WorkItem::Setup => "setup",
            WorkItem::SetupReuseTiming => "setup-reuse-timing",
            WorkItem::SetupLoopTimeIntr => "setup-loop-time-intr",
            WorkItem::SetupUnexpLoopTimeIntr => "setup-unexp-loop-time-intr",
            WorkItem::SetupTimeout => "setup-timeout",
            WorkItem::Start => "start",
            WorkItem::StartInitCompleteIntr => "start-init-complete-intr",
            WorkItem::StartTimeout => "start-timeout",
            WorkItem::SetupCancel => "setup-cancel",
            WorkItem::StartCancel => "start-cancel",
            WorkItem::Stop => "stop",
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Job {
    key: LlrKey,
    item: WorkItem,
    llr: Weak<Llr>,
}

struct QueueState {
    pending: VecDeque<Job>,
    running: Option<(LlrKey, WorkItem)>,
    max_depth: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, QueueState>) -> MutexGuard<'a, QueueState> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct WorkQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl WorkQueue {
    pub(crate) fn new(name: String) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                running: None,
                max_depth: MAX_DEPTH,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(&worker_shared))
            .map_err(|e| {
                log::error!("llr work queue spawn failed [{}]", e);
                LlrError::OutOfMemory
            })?;

        Ok(Self {
            shared,
            worker_id: worker.thread().id(),
            worker: Some(worker),
        })
    }

    /// Limit the number of pending items; at least one is always allowed.
    pub(crate) fn set_max_depth(&self, depth: usize) {
        self.shared.lock().max_depth = depth.max(1);
    }

    /// True when called from this queue's worker thread.
    pub(crate) fn is_current_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Submit `item` for `llr`. Returns `false` if the pair is already
    /// pending or the queue is full or shut down.
    pub(crate) fn queue(&self, llr: &Arc<Llr>, item: WorkItem) -> bool {
        let key = llr.key();
        let mut state = self.shared.lock();

        if state.shutdown {
            return false;
        }
        if state.pending.iter().any(|job| job.key == key && job.item == item) {
            log::debug!("{}: {} work already pending", key, item);
            return false;
        }
        if state.pending.len() >= state.max_depth {
            log::warn!("{}: work queue full, {} dropped", key, item);
            return false;
        }

        state.pending.push_back(Job {
            key,
            item,
            llr: Arc::downgrade(llr),
        });
        self.shared.cond.notify_all();
        true
    }

    /// Drop pending `items` of `key` and wait for a running one to finish.
    ///
    /// On the worker thread the running item is the caller, so only the
    /// pending ones are dropped. Returns `true` if anything was dropped.
    pub(crate) fn cancel_sync(&self, key: LlrKey, items: &[WorkItem]) -> bool {
        self.cancel_where(|k, item| k == key && items.contains(&item))
    }

    /// [`cancel_sync`](Self::cancel_sync) for every item of `key`.
    pub(crate) fn cancel_all(&self, key: LlrKey) -> bool {
        self.cancel_where(|k, _| k == key)
    }

    fn cancel_where(&self, matches: impl Fn(LlrKey, WorkItem) -> bool) -> bool {
        let mut state = self.shared.lock();
        let before = state.pending.len();
        state.pending.retain(|job| !matches(job.key, job.item));
        let dropped = state.pending.len() != before;

        if self.is_current_thread() {
            return dropped;
        }
        while let Some((key, item)) = state.running {
            if !matches(key, item) {
                break;
            }
            state = self.shared.wait(state);
        }
        dropped
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.cond.notify_all();

        if let Some(worker) = self.worker.take() {
            // the last device reference may go away inside a handler
            if !self.is_current_thread() && worker.join().is_err() {
                log::error!("llr work queue worker panicked");
            }
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(job) = state.pending.pop_front() {
                    state.running = Some((job.key, job.item));
                    break job;
                }
                state = shared.wait(state);
            }
        };

        if let Some(llr) = job.llr.upgrade() {
            llr.work_run(job.item);
        }

        shared.lock().running = None;
        shared.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_items_are_never_commands() {
        for item in WorkItem::SETUP_PHASE.iter().chain(&WorkItem::START_PHASE) {
            assert!(!item.is_command(), "{}", item);
        }
        assert!(WorkItem::Stop.is_command());
        assert!(!WorkItem::SETUP_PHASE.contains(&WorkItem::SetupCancel));
    }
}
