//! Setup, start and stop sequences.
//!
//! Every function here runs on the device work queue (or inline from a
//! stop issued on it), so handlers of one instance never overlap. A
//! handler first checks that the instance is still in the state it was
//! queued for; anything else means the phase was ended by someone else.

use std::sync::Arc;

use drivers::CsrError;
use drivers::platform::{HwLlrState, LlrIntr};

use crate::capacity::{self, LOOP_TIME_MAX_TRIES, LOOP_TIME_SETTLE_US, LoopTimes};
use crate::config::LlrSettings;
use crate::counters::LlrCounter;
use crate::error::Result;
use crate::instance::{Llr, LlrInner};
use crate::state::{FailCause, InfoMap, LlrState, SetupFlags, StopFlags};
use crate::timer::TimerId;
use crate::work::WorkItem;

const INIT_COMPLETE_SETTLE_MS: u32 = 20;
const INIT_COMPLETE_TRIES: u32 = 3;
const INIT_COMPLETE_POLL_MIN_MS: u32 = 15;
const INIT_COMPLETE_POLL_MAX_MS: u32 = 20;

/// How a phase ends: the state it leaves behind, the cause recorded (empty
/// for none), the info bits to drop and raise, and the counter bumped once
/// the callback returned.
struct PhaseEnd {
    settle: LlrState,
    cause: FailCause,
    clear: InfoMap,
    set: InfoMap,
    counter: Option<LlrCounter>,
}

impl Llr {
    pub(crate) fn work_run(self: &Arc<Self>, item: WorkItem) {
        let rtn = match item {
            WorkItem::Setup => self.setup_work(),
            WorkItem::SetupReuseTiming => self.setup_reuse_timing_work(),
            WorkItem::SetupLoopTimeIntr => self.loop_time_intr_work(),
            WorkItem::SetupUnexpLoopTimeIntr => self.unexp_loop_time_intr_work(),
            WorkItem::SetupTimeout => self.setup_timeout_work(),
            WorkItem::Start => self.start_work(),
            WorkItem::StartInitCompleteIntr => self.init_complete_intr_work(),
            WorkItem::StartTimeout => self.start_timeout_work(),
            WorkItem::SetupCancel => self.setup_cancel_cmd(),
            WorkItem::StartCancel => self.start_cancel_cmd(),
            WorkItem::Stop => self.stop_cmd(),
        };

        if let Err(e) = rtn {
            log::error!("{}: {} work failed [{}]", self.key(), item, e);
        }
    }

    /// Settle the phase if the instance is still in `expect` and take the
    /// caller's request out with `take`.
    ///
    /// The phase counts as ending until [`phase_done`](Self::phase_done);
    /// stop waiters are not released before that.
    fn phase_settle<T>(&self, expect: LlrState, end: &PhaseEnd, take: impl FnOnce(&mut LlrInner) -> T) -> Option<T> {
        self.with_inner(|inner| {
            if inner.state != expect {
                return None;
            }
            inner.state = end.settle;
            inner.info_map.remove(end.clear);
            inner.info_map.insert(end.set);
            if !end.cause.is_empty() {
                inner.fail(end.cause);
            }
            inner.phase_ends += 1;
            Some(take(inner))
        })
    }

    fn phase_done(&self, end: &PhaseEnd) {
        if let Some(counter) = end.counter {
            self.counters().inc(counter);
        }
        self.with_inner(|inner| inner.phase_ends -= 1);
        self.stop_complete().complete_all();
    }

    /// End the setup phase if the instance is still in `expect`.
    ///
    /// The callback is taken under the lock, so exactly one path ever gets
    /// to run it. It is called with `outcome` after the state settled, and
    /// a stop racing the end returns only after it did.
    fn setup_end(&self, expect: LlrState, outcome: LlrState, end: PhaseEnd) -> bool {
        let Some((req, info_map, data)) =
            self.phase_settle(expect, &end, |inner| (inner.setup_req.take(), inner.info_map, inner.data))
        else {
            return false;
        };

        log::debug!("{}: setup ended ({} -> {})", self.key(), outcome, end.settle);
        if let Some(req) = req {
            (req.callback)(outcome, info_map, data);
        }
        self.phase_done(&end);
        true
    }

    /// Start-phase counterpart of [`setup_end`](Self::setup_end).
    fn start_end(&self, expect: LlrState, outcome: LlrState, end: PhaseEnd) -> bool {
        let Some((req, info_map)) = self.phase_settle(expect, &end, |inner| (inner.start_req.take(), inner.info_map))
        else {
            return false;
        };

        log::debug!("{}: start ended ({} -> {})", self.key(), outcome, end.settle);
        if let Some(req) = req {
            (req.callback)(outcome, info_map);
        }
        self.phase_done(&end);
        true
    }

    fn hw_step(&self, what: &str, rtn: core::result::Result<(), CsrError>) {
        if let Err(e) = rtn {
            log::warn!("{}: {} failed [{}]", self.key(), what, e);
        }
    }

    /// Stop measurement and the engine, leaving the link discarding.
    ///
    /// Every step runs even when an earlier one failed.
    fn hw_quiesce(&self) {
        let hw = self.hw();
        self.hw_step("loop time stop", hw.loop_time_stop());
        self.hw_step("ordered sets stop", hw.ordered_sets_stop());
        self.hw_step("off", hw.off());
        self.hw_step("discard", hw.discard());
    }

    // ---- setup ----

    /// Program the static configuration and queue the setup work.
    ///
    /// On a register failure the instance goes back to `Configured` and
    /// the request is dropped without its callback.
    pub(crate) fn setup_cmd(self: &Arc<Self>, flags: SetupFlags) -> Result<()> {
        let (regs, reuse) = self.with_inner(|inner| {
            let reuse = flags.contains(SetupFlags::REUSE_TIMING) && inner.data_valid;
            (inner.settings.regs, reuse)
        });
        let reuse = reuse && self.hw().supports_reuse_timing();

        self.timer_begin(TimerId::Setup);
        self.intr_quiesce(LlrIntr::SetupLoopTime);
        self.hw_quiesce();

        if let Err(e) = self.hw().config(&regs) {
            log::error!("{}: setup config failed [{}]", self.key(), e);
            self.timer_end(TimerId::Setup);
            self.counters().inc(LlrCounter::SetupFail);
            self.with_inner(|inner| {
                if inner.state == LlrState::SettingUp {
                    inner.state = LlrState::Configured;
                    inner.info_map.remove(InfoMap::SETTING_UP);
                    inner.setup_req = None;
                    inner.fail(FailCause::SETUP_CONFIG);
                }
            });
            self.stop_complete().complete_all();
            return Err(e.into());
        }

        let item = if reuse { WorkItem::SetupReuseTiming } else { WorkItem::Setup };
        if !self.work_queue(item) {
            log::debug!("{}: {} work not queued", self.key(), item);
        }
        Ok(())
    }

    fn setup_work(self: &Arc<Self>) -> Result<()> {
        if !self.is_state(LlrState::SettingUp) {
            log::debug!("{}: setup work canceled", self.key());
            return Ok(());
        }

        self.hw().intr_flags_clear(LlrIntr::SetupLoopTime)?;

        match self.intr_enable(LlrIntr::SetupLoopTime) {
            Ok(true) => self.hw().enable()?,
            Ok(false) => {}
            Err(e) => {
                log::error!("{}: setup intr enable failed [{}]", self.key(), e);
                self.timer_end(TimerId::Setup);
                self.counters().inc(LlrCounter::SetupFail);
                self.setup_end(
                    LlrState::SettingUp,
                    LlrState::Configured,
                    PhaseEnd {
                        settle: LlrState::Configured,
                        cause: FailCause::SETUP_INTR_ENABLE,
                        clear: InfoMap::SETTING_UP,
                        set: InfoMap::empty(),
                        counter: None,
                    },
                );
            }
        }
        Ok(())
    }

    /// Skip measurement and reprogram capacity from the cached loop times.
    fn setup_reuse_timing_work(self: &Arc<Self>) -> Result<()> {
        if !self.is_state(LlrState::SettingUp) {
            log::debug!("{}: setup reuse timing work canceled", self.key());
            return Ok(());
        }

        let (samples, settings) = self.with_inner(|inner| (inner.loop_times, inner.settings));
        log::debug!("{}: reusing {} loop time samples", self.key(), samples.len());

        self.setup_measured(samples, &settings)
    }

    fn loop_time_intr_work(self: &Arc<Self>) -> Result<()> {
        if !self.is_state(LlrState::SettingUp) {
            log::debug!("{}: loop time work canceled", self.key());
            return Ok(());
        }

        let mut samples = LoopTimes::new();
        let mut tries = 0;

        while !samples.is_full() {
            if !self.is_state(LlrState::SettingUp) {
                log::debug!("{}: loop time work canceled", self.key());
                return Ok(());
            }
            if tries >= LOOP_TIME_MAX_TRIES {
                // leave the phase to the watchdog
                log::error!(
                    "{}: loop time tries exhausted ({} of {} samples)",
                    self.key(),
                    samples.len(),
                    capacity::LOOP_TIME_COUNT
                );
                return Ok(());
            }
            tries += 1;

            self.hw().loop_time_clear()?;
            self.device().clock().delay_us(LOOP_TIME_SETTLE_US);
            let ns = self.hw().loop_time_read()?;
            if !samples.push(ns) {
                log::debug!("{}: loop time not ready (try = {})", self.key(), tries);
            }
        }

        let settings = self.with_inner(|inner| inner.settings);
        self.setup_measured(samples, &settings)
    }

    /// Program capacity from `samples` and finish setup.
    fn setup_measured(&self, samples: LoopTimes, settings: &LlrSettings) -> Result<()> {
        let plan = capacity::plan(&samples, settings);

        log::debug!(
            "{}: loop time (min = {}, max = {}, avg = {})",
            self.key(),
            plan.loop_time.min,
            plan.loop_time.max,
            plan.loop_time.average
        );

        if !self.is_state(LlrState::SettingUp) {
            return Ok(());
        }
        self.hw().capacity_set(plan.capacity)?;

        self.with_inner(|inner| {
            inner.loop_times = samples;
            inner.data.loop_time = plan.loop_time;
            inner.data_valid = true;
            inner.settings.regs.replay_timer_max = plan.replay_timer_max;
            inner.settings.regs.replay_ct_max = plan.replay_ct_max;
        });

        self.timer_end(TimerId::Setup);
        self.setup_end(
            LlrState::SettingUp,
            LlrState::Setup,
            PhaseEnd {
                settle: LlrState::Setup,
                cause: FailCause::empty(),
                clear: InfoMap::SETTING_UP,
                set: InfoMap::SETUP,
                counter: Some(LlrCounter::Setup),
            },
        );
        Ok(())
    }

    fn unexp_loop_time_intr_work(&self) -> Result<()> {
        let source = self.with_inner(|inner| inner.intrs[LlrIntr::SetupUnexpLoopTime.index()].source);
        log::warn!(
            "{}: unexpected loop time (flags = {:#x} {:#x} {:#x} {:#x})",
            self.key(),
            source[0],
            source[1],
            source[2],
            source[3]
        );
        self.hw().intr_flags_clear(LlrIntr::SetupUnexpLoopTime)?;
        Ok(())
    }

    fn setup_timeout_work(self: &Arc<Self>) -> Result<()> {
        if !self.is_state(LlrState::SettingUp) {
            log::debug!("{}: setup timeout work, not setting up", self.key());
            return Ok(());
        }

        self.counters().inc(LlrCounter::SetupTimeout);

        if self.with_inner(|inner| inner.policy.infinite_tries()) {
            log::debug!("{}: setup timeout, retrying", self.key());
            self.timer_begin(TimerId::Setup);
            self.hw().loop_time_stop()?;
            self.hw().intr_flags_clear(LlrIntr::SetupLoopTime)?;
            if self.intr_enable(LlrIntr::SetupLoopTime)? {
                self.hw().enable()?;
            }
            return Ok(());
        }

        if !self.transition(LlrState::SettingUp, LlrState::SetupTimeout) {
            return Ok(());
        }
        log::warn!("{}: setup timeout", self.key());

        self.intr_quiesce(LlrIntr::SetupLoopTime);
        self.work_cancel(&[WorkItem::Setup, WorkItem::SetupReuseTiming, WorkItem::SetupLoopTimeIntr]);
        self.hw_quiesce();

        self.setup_end(
            LlrState::SetupTimeout,
            LlrState::SetupTimeout,
            PhaseEnd {
                settle: LlrState::Configured,
                cause: FailCause::SETUP_TIMEOUT,
                clear: InfoMap::SETTING_UP | InfoMap::SETUP,
                set: InfoMap::SETUP_TIMEOUT,
                counter: None,
            },
        );
        Ok(())
    }

    fn setup_cancel_cmd(self: &Arc<Self>) -> Result<()> {
        log::debug!("{}: setup cancel", self.key());

        self.intr_quiesce(LlrIntr::SetupLoopTime);
        self.timer_end(TimerId::Setup);
        self.work_cancel(&WorkItem::SETUP_PHASE);
        self.hw_quiesce();

        self.setup_end(
            LlrState::SetupCanceling,
            LlrState::SetupCanceling,
            PhaseEnd {
                settle: LlrState::Configured,
                cause: FailCause::empty(),
                clear: InfoMap::SETTING_UP | InfoMap::SETUP | InfoMap::SETUP_TIMEOUT,
                set: InfoMap::empty(),
                counter: Some(LlrCounter::SetupCanceled),
            },
        );
        Ok(())
    }

    // ---- start ----

    pub(crate) fn start_cmd(self: &Arc<Self>) {
        self.timer_begin(TimerId::Start);
        self.intr_quiesce(LlrIntr::StartInitComplete);
        self.hw_step("start off", self.hw().off());

        if !self.work_queue(WorkItem::Start) {
            log::debug!("{}: start work not queued", self.key());
        }
    }

    fn start_work(self: &Arc<Self>) -> Result<()> {
        if !self.is_state(LlrState::Starting) {
            log::debug!("{}: start work canceled", self.key());
            return Ok(());
        }

        self.hw().intr_flags_clear(LlrIntr::StartInitComplete)?;

        match self.intr_enable(LlrIntr::StartInitComplete) {
            Ok(true) => self.hw().on()?,
            Ok(false) => {}
            Err(e) => {
                log::error!("{}: start intr enable failed [{}]", self.key(), e);
                self.timer_end(TimerId::Start);
                self.counters().inc(LlrCounter::StartFail);
                self.start_end(
                    LlrState::Starting,
                    LlrState::Setup,
                    PhaseEnd {
                        settle: LlrState::Setup,
                        cause: FailCause::START_INTR_ENABLE,
                        clear: InfoMap::STARTING,
                        set: InfoMap::empty(),
                        counter: None,
                    },
                );
            }
        }
        Ok(())
    }

    fn init_complete_intr_work(self: &Arc<Self>) -> Result<()> {
        if !self.is_state(LlrState::Starting) {
            log::debug!("{}: init complete work canceled", self.key());
            return Ok(());
        }

        self.timer_end(TimerId::Start);
        self.hw().loop_time_stop()?;

        let clock = self.device().clock();
        clock.sleep_ms(INIT_COMPLETE_SETTLE_MS, INIT_COMPLETE_SETTLE_MS);

        let mut hw_state = self.hw().llr_state()?;
        for _ in 1..INIT_COMPLETE_TRIES {
            if hw_state == HwLlrState::Advance || !self.is_state(LlrState::Starting) {
                break;
            }
            clock.sleep_ms(INIT_COMPLETE_POLL_MIN_MS, INIT_COMPLETE_POLL_MAX_MS);
            hw_state = self.hw().llr_state()?;
        }

        if hw_state != HwLlrState::Advance {
            log::error!("{}: init complete but not advancing ({:?})", self.key(), hw_state);
            if !self.transition(LlrState::Starting, LlrState::StartFail) {
                return Ok(());
            }
            self.intr_quiesce(LlrIntr::StartInitComplete);
            self.hw_step("start fail off", self.hw().off());
            self.start_end(
                LlrState::StartFail,
                LlrState::StartFail,
                PhaseEnd {
                    settle: LlrState::Setup,
                    cause: FailCause::START_NOT_ADVANCING,
                    clear: InfoMap::STARTING,
                    set: InfoMap::empty(),
                    counter: Some(LlrCounter::StartFail),
                },
            );
            return Ok(());
        }

        let regs = self.with_inner(|inner| inner.settings.regs);
        self.hw().replay_set(regs.replay_ct_max, regs.replay_timer_max)?;

        if self.start_end(
            LlrState::Starting,
            LlrState::Running,
            PhaseEnd {
                settle: LlrState::Running,
                cause: FailCause::empty(),
                clear: InfoMap::STARTING,
                set: InfoMap::RUNNING,
                counter: Some(LlrCounter::Running),
            },
        ) && self.is_state(LlrState::Running)
        {
            if let Err(e) = self.intr_enable(LlrIntr::SetupUnexpLoopTime) {
                log::warn!("{}: unexpected loop time intr enable failed [{}]", self.key(), e);
            }
        }
        Ok(())
    }

    fn start_timeout_work(self: &Arc<Self>) -> Result<()> {
        if !self.is_state(LlrState::Starting) {
            log::debug!("{}: start timeout work, not starting", self.key());
            return Ok(());
        }

        self.counters().inc(LlrCounter::StartTimeout);

        if self.with_inner(|inner| inner.policy.infinite_tries()) {
            log::debug!("{}: start timeout, retrying", self.key());
            self.timer_begin(TimerId::Start);
            self.hw().off()?;
            self.hw().intr_flags_clear(LlrIntr::StartInitComplete)?;
            if self.intr_enable(LlrIntr::StartInitComplete)? {
                self.hw().on()?;
            }
            return Ok(());
        }

        if !self.transition(LlrState::Starting, LlrState::StartTimeout) {
            return Ok(());
        }
        log::warn!("{}: start timeout", self.key());

        self.intr_quiesce(LlrIntr::StartInitComplete);
        self.work_cancel(&[WorkItem::Start, WorkItem::StartInitCompleteIntr]);
        self.hw_step("start timeout off", self.hw().off());

        self.start_end(
            LlrState::StartTimeout,
            LlrState::StartTimeout,
            PhaseEnd {
                settle: LlrState::Setup,
                cause: FailCause::START_TIMEOUT,
                clear: InfoMap::STARTING | InfoMap::RUNNING,
                set: InfoMap::START_TIMEOUT,
                counter: None,
            },
        );
        Ok(())
    }

    fn start_cancel_cmd(self: &Arc<Self>) -> Result<()> {
        log::debug!("{}: start cancel", self.key());

        self.intr_quiesce(LlrIntr::StartInitComplete);
        self.timer_end(TimerId::Start);
        self.work_cancel(&WorkItem::START_PHASE);
        self.hw_step("start cancel off", self.hw().off());
        self.hw_step("start cancel discard", self.hw().discard());

        self.start_end(
            LlrState::StartCanceling,
            LlrState::StartCanceling,
            PhaseEnd {
                settle: LlrState::Setup,
                cause: FailCause::empty(),
                clear: InfoMap::STARTING | InfoMap::RUNNING | InfoMap::START_TIMEOUT,
                set: InfoMap::empty(),
                counter: Some(LlrCounter::StartCanceled),
            },
        );
        Ok(())
    }

    // ---- stop ----

    /// Tear the link down from `Setup` or `Running` back to `Configured`.
    fn stop_cmd(self: &Arc<Self>) -> Result<()> {
        log::debug!("{}: stop cmd ({})", self.key(), self.state());

        for intr in LlrIntr::ALL {
            self.intr_quiesce(intr);
        }
        self.hw_quiesce();

        let settled = self.with_inner(|inner| {
            if !matches!(inner.state, LlrState::SetupStopping | LlrState::Stopping) {
                return false;
            }
            if inner.stop_flags.contains(StopFlags::CLEAR_SETUP) {
                inner.loop_times.clear();
                inner.data = Default::default();
                inner.data_valid = false;
            }
            inner.info_map.remove(!InfoMap::CONFIG);
            inner.state = inner.state.settled();
            true
        });

        if settled {
            self.stop_complete().complete_all();
        }
        Ok(())
    }
}
