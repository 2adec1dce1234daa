//! Caller-facing LLR state machine.
//!
//! ```text
//! New -> Configured -> SettingUp -> Setup -> Starting -> Running
//! ```
//!
//! A setup that times out or is canceled passes through `SetupTimeout` or
//! `SetupCanceling` and lands back in `Configured`; a failed start lands
//! back in `Setup`. Stopping from `Setup` or `Running` returns to
//! `Configured`.
//!
//! Setup and start complete asynchronously; their callback runs exactly
//! once, on the device work queue, with the state the phase ended in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capacity::LlrData;
use crate::config::{DEFAULT_TIMEOUT_MS, LinkCaps, LlrConfig, LlrPolicy, LlrSettings, checked_timeout_ms};
use crate::counters::LlrCounter;
use crate::error::{LlrError, Result};
use crate::instance::{Llr, LlrInner, SetupRequest, StartRequest};
use crate::state::{FailCause, InfoMap, LlrState, SetupFlags, StopFlags};
use crate::work::WorkItem;

/// Setup completion: the state setup ended in, the info map and the
/// measured loop timing.
pub type SetupCallback = Box<dyn FnOnce(LlrState, InfoMap, LlrData) + Send>;

/// Start completion: the state start ended in and the info map.
pub type StartCallback = Box<dyn FnOnce(LlrState, InfoMap) + Send>;

/// Upper bound on waiting for a stop to settle.
pub const STOP_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

const STOP_WAIT_POLL: Duration = Duration::from_millis(50);

impl Llr {
    /// Store `config` and derive the static hardware settings.
    ///
    /// Only legal before setup; calling it again with the same or a new
    /// configuration from `Configured` is allowed.
    pub fn config_set(&self, config: &LlrConfig) -> Result<()> {
        config.validate()?;

        let setup_timeout_ms = self.timeout_ms("setup", config.setup_timeout_ms);
        let start_timeout_ms = self.timeout_ms("start", config.start_timeout_ms);

        let stored = LlrConfig {
            setup_timeout_ms,
            start_timeout_ms,
            ..*config
        };

        self.with_inner(|inner| {
            if !matches!(inner.state, LlrState::New | LlrState::Configured) {
                return Err(LlrError::InvalidState(inner.state));
            }
            inner.config = Some(stored);
            inner.setup_timeout_ms = setup_timeout_ms;
            inner.start_timeout_ms = start_timeout_ms;
            inner.settings = LlrSettings::from_config(&stored);
            inner.state = LlrState::Configured;
            inner.info_map.insert(InfoMap::CONFIG);
            Ok(())
        })?;

        self.counters().inc(LlrCounter::Configured);
        log::debug!(
            "{}: config set (link down = {}, setup = {}ms, start = {}ms)",
            self.key(),
            stored.link_dn_behavior,
            setup_timeout_ms,
            start_timeout_ms
        );
        Ok(())
    }

    fn timeout_ms(&self, which: &str, ms: u32) -> u32 {
        checked_timeout_ms(ms).unwrap_or_else(|| {
            log::warn!(
                "{}: {} timeout {}ms out of range, using {}ms",
                self.key(),
                which,
                ms,
                DEFAULT_TIMEOUT_MS
            );
            DEFAULT_TIMEOUT_MS
        })
    }

    pub fn config_get(&self) -> Result<LlrConfig> {
        self.with_inner(|inner| inner.config.ok_or(LlrError::InvalidState(inner.state)))
    }

    /// Replace the retry policy. Takes effect at the next timeout.
    pub fn policy_set(&self, policy: &LlrPolicy) -> Result<()> {
        policy.validate()?;
        self.with_inner(|inner| inner.policy = *policy);
        log::debug!("{}: policy set (options = {:?})", self.key(), policy.options);
        Ok(())
    }

    pub fn policy_get(&self) -> LlrPolicy {
        self.with_inner(|inner| inner.policy)
    }

    /// Record the link properties used to size the replay buffer at the
    /// next setup.
    pub fn link_caps_set(&self, caps: LinkCaps) {
        self.with_inner(|inner| inner.link_caps = caps);
    }

    pub fn state(&self) -> LlrState {
        self.with_inner(|inner| inner.state)
    }

    pub fn info_map(&self) -> InfoMap {
        self.with_inner(|inner| inner.info_map)
    }

    /// Clear `bits`; [`InfoMap::CLEAR_ALL`] clears everything.
    pub fn info_map_clr(&self, bits: InfoMap) {
        self.with_inner(|inner| inner.info_map.remove(bits));
    }

    /// The last recorded failure and when it happened.
    pub fn last_fail_cause(&self) -> (FailCause, Option<Instant>) {
        self.with_inner(|inner| (inner.fail_cause, inner.fail_time))
    }

    /// Loop timing from the last completed measurement.
    pub fn data_get(&self) -> LlrData {
        self.with_inner(|inner| inner.data)
    }

    pub fn is_data_valid(&self) -> bool {
        self.with_inner(|inner| inner.data_valid)
    }

    pub fn should_stop(&self) -> bool {
        self.state().should_stop()
    }

    pub fn setup_should_stop(&self) -> bool {
        self.state().setup_should_stop()
    }

    pub fn start_should_stop(&self) -> bool {
        self.state().start_should_stop()
    }

    /// Begin setup: program the static configuration, measure the loop
    /// time and size the replay buffer.
    ///
    /// Returns once the work is queued. `callback` later receives `Setup`
    /// on success, or the state the attempt ended in.
    pub fn setup(self: &Arc<Self>, flags: SetupFlags, callback: SetupCallback) -> Result<()> {
        self.with_inner(|inner| match inner.state {
            LlrState::Configured => {
                inner.state = LlrState::SettingUp;
                inner.info_map.remove(InfoMap::CLEAR_ALL);
                inner.info_map.insert(InfoMap::CONFIG | InfoMap::SETTING_UP);
                inner.setup_req = Some(SetupRequest { callback });
                Ok(())
            }
            LlrState::Setup => Err(LlrError::AlreadyInState(LlrState::Setup)),
            other => Err(LlrError::InvalidState(other)),
        })?;

        self.counters().inc(LlrCounter::SetupCmd);
        log::debug!("{}: setup (flags = {:?})", self.key(), flags);

        if let Err(e) = self.settings_derive() {
            log::error!("{}: setup settings failed [{}]", self.key(), e);
            self.with_inner(|inner| {
                if inner.state == LlrState::SettingUp {
                    inner.state = LlrState::Configured;
                    inner.info_map.remove(InfoMap::SETTING_UP);
                    inner.setup_req = None;
                    inner.fail(FailCause::SETUP_CONFIG);
                }
            });
            self.counters().inc(LlrCounter::SetupFail);
            self.stop_complete().complete_all();
            return Err(e);
        }

        self.setup_cmd(flags)
    }

    fn settings_derive(&self) -> Result<()> {
        self.with_inner(|inner| {
            let caps = inner.link_caps;
            inner.settings.apply_link_caps(&caps)
        })
    }

    /// Begin start: turn the engine on and wait for init-complete.
    ///
    /// `callback` later receives `Running` on success, or the state the
    /// attempt ended in.
    pub fn start(self: &Arc<Self>, callback: StartCallback) -> Result<()> {
        self.with_inner(|inner| match inner.state {
            LlrState::Setup => {
                inner.state = LlrState::Starting;
                inner.info_map.remove(InfoMap::RUNNING | InfoMap::START_TIMEOUT);
                inner.info_map.insert(InfoMap::STARTING);
                inner.start_req = Some(StartRequest { callback });
                Ok(())
            }
            LlrState::Running => Err(LlrError::AlreadyInState(LlrState::Running)),
            other => Err(LlrError::InvalidState(other)),
        })?;

        self.counters().inc(LlrCounter::StartCmd);
        log::debug!("{}: start", self.key());

        self.start_cmd();
        Ok(())
    }

    /// Stop whatever the instance is doing and return it to `Configured`.
    pub fn stop(self: &Arc<Self>) -> Result<()> {
        self.stop_with(StopFlags::empty())
    }

    /// [`stop`](Self::stop) with flags. Blocks until the state settles;
    /// an in-flight phase is canceled and its callback has returned by the
    /// time this does.
    ///
    /// Fails with [`LlrError::Busy`], leaving the instance as it was, when
    /// the device queue refuses the command.
    pub fn stop_with(self: &Arc<Self>, flags: StopFlags) -> Result<()> {
        let command = self.with_inner(|inner| {
            let (next, cause, item) = match inner.state {
                LlrState::New | LlrState::Configured => return Ok(None),
                LlrState::SettingUp => (LlrState::SetupCanceling, FailCause::CANCELED, WorkItem::SetupCancel),
                LlrState::Starting => (LlrState::StartCanceling, FailCause::CANCELED, WorkItem::StartCancel),
                LlrState::Setup => (LlrState::SetupStopping, FailCause::COMMAND, WorkItem::Stop),
                LlrState::Running => (LlrState::Stopping, FailCause::COMMAND, WorkItem::Stop),
                _ => return Ok(None),
            };
            if inner.deleted {
                return Err(LlrError::NotFound);
            }
            let prev = StopUndo {
                state: inner.state,
                next,
                fail_cause: inner.fail_cause,
                fail_time: inner.fail_time,
                stop_flags: inner.stop_flags,
            };
            inner.state = next;
            inner.stop_flags = flags;
            inner.fail(cause);
            Ok(Some((item, prev)))
        })?;

        if let Some((item, prev)) = command {
            log::debug!("{}: stop ({})", self.key(), item);
            if !self.command_run(item) {
                log::warn!("{}: {} not queued, stop refused", self.key(), item);
                self.with_inner(|inner| prev.restore(inner));
                self.counters().inc(LlrCounter::StopFail);
                return Err(LlrError::Busy);
            }
            self.counters().inc(LlrCounter::StopCmd);
        }

        self.stop_wait()
    }

    /// Run a winding-down command in order on the device queue, or right
    /// here when already on the worker. `false` if the queue refused it.
    fn command_run(self: &Arc<Self>, item: WorkItem) -> bool {
        if self.device().workq().is_current_thread() {
            self.work_run(item);
            return true;
        }
        self.work_queue(item)
    }

    /// Wait for a transitional state to settle and for the callback of a
    /// phase that just ended to return.
    pub(crate) fn stop_wait(&self) -> Result<()> {
        let deadline = Instant::now() + STOP_WAIT_TIMEOUT;

        loop {
            let seen = self.stop_complete().sequence();
            let (state, phase_ends) = self.with_inner(|inner| (inner.state, inner.phase_ends));
            if !state.is_transitional() && phase_ends == 0 {
                return Ok(());
            }

            // the command that settles it is queued behind the caller, or
            // the caller is the callback being waited for
            if self.device().workq().is_current_thread() {
                log::debug!("{}: stop in progress ({})", self.key(), state);
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                log::warn!("{}: stop wait timed out ({}, {} callbacks)", self.key(), state, phase_ends);
                self.counters().inc(LlrCounter::StopFail);
                return Err(LlrError::Timeout);
            }
            self.stop_complete().wait_since(seen, (deadline - now).min(STOP_WAIT_POLL));
        }
    }
}

/// What a refused stop puts back.
struct StopUndo {
    state: LlrState,
    next: LlrState,
    fail_cause: FailCause,
    fail_time: Option<Instant>,
    stop_flags: StopFlags,
}

impl StopUndo {
    fn restore(&self, inner: &mut LlrInner) {
        if inner.state != self.next {
            return;
        }
        inner.state = self.state;
        inner.fail_cause = self.fail_cause;
        inner.fail_time = self.fail_time;
        inner.stop_flags = self.stop_flags;
    }
}
