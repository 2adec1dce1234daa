//! Controller states and the flag words reported with them.

use core::fmt;

use bitflags::bitflags;

/// Software state of one LLR instance.
///
/// `SettingUp` and `Starting` are the busy states a phase runs in. The
/// `*Timeout`, `*Canceling`, `*Stopping` and `StartFail` states are held
/// only while the path that entered them winds the phase down; they always
/// settle back into `Configured` or `Setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LlrState {
    #[default]
    New,
    Configured,
    SettingUp,
    SetupTimeout,
    SetupCanceling,
    SetupStopping,
    Setup,
    Starting,
    StartTimeout,
    StartCanceling,
    StartFail,
    Running,
    Stopping,
}

impl LlrState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LlrState::New => "new",
            LlrState::Configured => "configured",
            LlrState::SettingUp => "setting-up",
            LlrState::SetupTimeout => "setup-timeout",
            LlrState::SetupCanceling => "setup-canceling",
            LlrState::SetupStopping => "setup-stopping",
            LlrState::Setup => "setup",
            LlrState::Starting => "starting",
            LlrState::StartTimeout => "start-timeout",
            LlrState::StartCanceling => "start-canceling",
            LlrState::StartFail => "start-fail",
            LlrState::Running => "running",
            LlrState::Stopping => "stopping",
        }
    }

    /// A phase is in flight.
    pub const fn is_busy(&self) -> bool {
        matches!(self, LlrState::SettingUp | LlrState::Starting)
    }

    /// A phase is being wound down and the state will settle on its own.
    pub const fn is_transitional(&self) -> bool {
        matches!(
            self,
            LlrState::SetupTimeout
                | LlrState::SetupCanceling
                | LlrState::SetupStopping
                | LlrState::StartTimeout
                | LlrState::StartCanceling
                | LlrState::StartFail
                | LlrState::Stopping
        )
    }

    /// Setup-phase work must bail out.
    pub const fn setup_should_stop(&self) -> bool {
        matches!(
            self,
            LlrState::SetupCanceling | LlrState::SetupTimeout | LlrState::SetupStopping
        )
    }

    /// Start-phase work must bail out.
    pub const fn start_should_stop(&self) -> bool {
        self.setup_should_stop()
            || matches!(
                self,
                LlrState::StartCanceling | LlrState::StartTimeout | LlrState::StartFail | LlrState::Stopping
            )
    }

    /// Any pending work for the instance must bail out.
    pub const fn should_stop(&self) -> bool {
        self.start_should_stop()
    }

    /// State the instance lands in once a transitional state settles.
    pub const fn settled(&self) -> LlrState {
        match self {
            LlrState::SetupTimeout | LlrState::SetupCanceling | LlrState::SetupStopping | LlrState::Stopping => {
                LlrState::Configured
            }
            LlrState::StartTimeout | LlrState::StartCanceling | LlrState::StartFail => LlrState::Setup,
            other => *other,
        }
    }
}

impl fmt::Display for LlrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Progress and outcome bits reported alongside the state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InfoMap: u32 {
        const CONFIG = 1 << 0;
        const SETTING_UP = 1 << 1;
        const SETUP = 1 << 2;
        const SETUP_TIMEOUT = 1 << 3;
        const STARTING = 1 << 4;
        const RUNNING = 1 << 5;
        const START_TIMEOUT = 1 << 6;
    }
}

impl InfoMap {
    /// Sentinel accepted by `Llr::info_map_clr` to drop every bit.
    pub const CLEAR_ALL: InfoMap = InfoMap::all();
}

bitflags! {
    /// Why the last phase ended without reaching its target state.
    ///
    /// Empty means no failure recorded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FailCause: u32 {
        const SETUP_CONFIG = 1 << 0;
        const SETUP_INTR_ENABLE = 1 << 1;
        const SETUP_TIMEOUT = 1 << 2;
        const START_INTR_ENABLE = 1 << 3;
        const START_TIMEOUT = 1 << 4;
        /// Ended by a stop command.
        const COMMAND = 1 << 5;
        /// A busy phase was canceled.
        const CANCELED = 1 << 6;
        /// The hardware never reached advance after init-complete.
        const START_NOT_ADVANCING = 1 << 7;
    }
}

impl FailCause {
    const NAMES: [(FailCause, &'static str); 8] = [
        (FailCause::SETUP_CONFIG, "setup-config"),
        (FailCause::SETUP_INTR_ENABLE, "setup-intr-enable"),
        (FailCause::SETUP_TIMEOUT, "setup-timeout"),
        (FailCause::START_INTR_ENABLE, "start-intr-enable"),
        (FailCause::START_TIMEOUT, "start-timeout"),
        (FailCause::COMMAND, "command"),
        (FailCause::CANCELED, "canceled"),
        (FailCause::START_NOT_ADVANCING, "start-not-advancing"),
    ];

    pub fn as_str(&self) -> &'static str {
        if self.is_empty() {
            return "none";
        }
        Self::NAMES
            .iter()
            .find(|(cause, _)| cause == self)
            .map_or("multiple", |(_, name)| name)
    }
}

impl fmt::Display for FailCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SetupFlags: u32 {
        /// Skip measurement when loop timing from an earlier setup is valid.
        const REUSE_TIMING = 1 << 0;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StopFlags: u32 {
        /// Also drop the cached loop timing.
        const CLEAR_SETUP = 1 << 1;
    }
}
