//! One LLR instance and its shared state.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use common::sync::{Completion, SpinLock};
use drivers::platform::{self, LlrIntr};
use drivers::{IntrFlags, LlrHardware};

use crate::capacity::{LlrData, LoopTimes};
use crate::config::{LinkCaps, LlrConfig, LlrPolicy, LlrSettings};
use crate::controller::{SetupCallback, StartCallback};
use crate::counters::{LlrCounter, LlrCounters};
use crate::device::LlrDevice;
use crate::error::Result;
use crate::state::{FailCause, InfoMap, LlrState, StopFlags};
use crate::timer::{TimerId, Watchdog};
use crate::work::WorkItem;

/// Identifies an instance: device, link group on the device, link in the
/// group. A group is one port of the device with its own register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LlrKey {
    pub dev: u8,
    pub grp: u8,
    pub link: u8,
}

impl LlrKey {
    pub const fn new(dev: u8, grp: u8, link: u8) -> Self {
        Self { dev, grp, link }
    }

    /// Hardware port driven by the instance.
    pub const fn port(&self) -> u8 {
        self.grp
    }
}

impl fmt::Display for LlrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "llr[{}:{}:{}]", self.dev, self.grp, self.link)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct IntrRecord {
    pub(crate) registered: bool,
    pub(crate) enabled: bool,
    /// Flag words latched by the last interrupt.
    pub(crate) source: IntrFlags,
}

pub(crate) struct SetupRequest {
    pub(crate) callback: SetupCallback,
}

pub(crate) struct StartRequest {
    pub(crate) callback: StartCallback,
}

pub(crate) struct LlrInner {
    pub(crate) state: LlrState,
    pub(crate) info_map: InfoMap,
    pub(crate) fail_cause: FailCause,
    pub(crate) fail_time: Option<Instant>,
    pub(crate) deleted: bool,
    pub(crate) config: Option<LlrConfig>,
    pub(crate) policy: LlrPolicy,
    pub(crate) setup_timeout_ms: u32,
    pub(crate) start_timeout_ms: u32,
    pub(crate) link_caps: LinkCaps,
    pub(crate) settings: LlrSettings,
    pub(crate) loop_times: LoopTimes,
    pub(crate) data: LlrData,
    pub(crate) data_valid: bool,
    pub(crate) setup_req: Option<SetupRequest>,
    pub(crate) start_req: Option<StartRequest>,
    pub(crate) stop_flags: StopFlags,
    /// Phases that settled but whose callback has not returned yet.
    pub(crate) phase_ends: u32,
    pub(crate) intrs: [IntrRecord; LlrIntr::COUNT],
}

impl LlrInner {
    fn new() -> Self {
        Self {
            state: LlrState::New,
            info_map: InfoMap::empty(),
            fail_cause: FailCause::empty(),
            fail_time: None,
            deleted: false,
            config: None,
            policy: LlrPolicy::default(),
            setup_timeout_ms: 0,
            start_timeout_ms: 0,
            link_caps: LinkCaps::default(),
            settings: LlrSettings::default(),
            loop_times: LoopTimes::new(),
            data: LlrData::default(),
            data_valid: false,
            setup_req: None,
            start_req: None,
            stop_flags: StopFlags::empty(),
            phase_ends: 0,
            intrs: [IntrRecord::default(); LlrIntr::COUNT],
        }
    }

    pub(crate) fn fail(&mut self, cause: FailCause) {
        self.fail_cause = cause;
        self.fail_time = Some(Instant::now());
    }
}

/// An LLR instance.
///
/// Created and destroyed through [`LlrRegistry`](crate::LlrRegistry);
/// the caller-facing operations live in [`controller`](crate::controller).
pub struct Llr {
    key: LlrKey,
    device: Arc<LlrDevice>,
    hw: Arc<dyn LlrHardware>,
    inner: SpinLock<LlrInner>,
    timers: [Watchdog; 2],
    stop_complete: Completion,
    counters: LlrCounters,
}

impl Llr {
    /// Build an instance for `key` on `device` with its hardware idle.
    ///
    /// Interrupt sources are claimed before any register is written, so a
    /// key whose sources are taken leaves the hardware untouched.
    pub(crate) fn new(key: LlrKey, device: Arc<LlrDevice>) -> Result<Arc<Self>> {
        let hw = platform::llr_hardware(device.generation(), device.csr(), key.port(), key.link)?;

        let timers = [
            Watchdog::new(format!("llr{}.{}.{}-setup", key.dev, key.grp, key.link))?,
            Watchdog::new(format!("llr{}.{}.{}-start", key.dev, key.grp, key.link))?,
        ];

        let llr = Arc::new(Self {
            key,
            device,
            hw,
            inner: SpinLock::new(LlrInner::new()),
            timers,
            stop_complete: Completion::new(),
            counters: LlrCounters::new(),
        });

        for id in TimerId::ALL {
            llr.watchdog(id).bind(Arc::downgrade(&llr), id.work_item());
        }
        llr.intr_register()?;

        if let Err(e) = llr.hw.off().and_then(|_| llr.hw.link_init()) {
            llr.teardown();
            return Err(e.into());
        }

        log::debug!("{}: new ({})", key, llr.device.generation());

        Ok(llr)
    }

    /// Release interrupts, timers and queued work. Waits for a handler of
    /// this instance that is already running; nothing runs afterwards.
    pub(crate) fn teardown(&self) {
        log::debug!("{}: del ({})", self.key, self.state());

        self.with_inner(|inner| inner.deleted = true);

        for id in TimerId::ALL {
            self.timer_end(id);
        }
        self.device.workq().cancel_all(self.key);
        self.intr_unregister();
        for timer in &self.timers {
            timer.shutdown();
        }

        self.with_inner(|inner| {
            inner.setup_req = None;
            inner.start_req = None;
        });
        self.stop_complete.complete_all();
    }

    pub fn key(&self) -> LlrKey {
        self.key
    }

    pub fn device(&self) -> &LlrDevice {
        &self.device
    }

    pub(crate) fn hw(&self) -> &dyn LlrHardware {
        self.hw.as_ref()
    }

    pub(crate) fn watchdog(&self, id: TimerId) -> &Watchdog {
        &self.timers[id.index()]
    }

    pub(crate) fn stop_complete(&self) -> &Completion {
        &self.stop_complete
    }

    pub(crate) fn counters(&self) -> &LlrCounters {
        &self.counters
    }

    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&mut LlrInner) -> R) -> R {
        self.inner.with(f)
    }

    pub(crate) fn is_state(&self, state: LlrState) -> bool {
        self.with_inner(|inner| inner.state == state)
    }

    /// Move from `from` to `to`; `false` if the state was anything else.
    pub(crate) fn transition(&self, from: LlrState, to: LlrState) -> bool {
        self.with_inner(|inner| {
            if inner.state != from {
                return false;
            }
            inner.state = to;
            true
        })
    }

    pub fn counter_get(&self, counter: LlrCounter) -> u32 {
        self.counters.get(counter)
    }

    pub fn counters_snapshot(&self) -> [(&'static str, u32); LlrCounter::COUNT] {
        self.counters.snapshot()
    }

    /// Queue `item` on the device queue.
    ///
    /// Refused once the instance is deleted, and for phase work while a
    /// stop or cancel is winding the instance down.
    pub(crate) fn work_queue(self: &Arc<Self>, item: WorkItem) -> bool {
        let refuse = self.with_inner(|inner| {
            if inner.deleted {
                Some("deleted")
            } else if !item.is_command() && inner.state.should_stop() {
                Some("stopping")
            } else {
                None
            }
        });
        if let Some(why) = refuse {
            log::debug!("{}: {} work not queued ({})", self.key, item, why);
            return false;
        }
        self.device.workq().queue(self, item)
    }

    /// Drop pending `items` of this instance, waiting for one that is
    /// running unless called from the worker itself.
    pub(crate) fn work_cancel(&self, items: &[WorkItem]) {
        self.device.workq().cancel_sync(self.key, items);
    }
}

impl fmt::Debug for Llr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Llr")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}
