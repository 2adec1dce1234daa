//! Per-instance event counters.

use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlrCounter {
    Configured,
    SetupCmd,
    Setup,
    SetupTimeout,
    SetupFail,
    SetupCanceled,
    StartCmd,
    Running,
    StartTimeout,
    StartFail,
    StartCanceled,
    StopCmd,
    StopFail,
}

impl LlrCounter {
    pub const COUNT: usize = 13;
    pub const ALL: [LlrCounter; Self::COUNT] = [
        LlrCounter::Configured,
        LlrCounter::SetupCmd,
        LlrCounter::Setup,
        LlrCounter::SetupTimeout,
        LlrCounter::SetupFail,
        LlrCounter::SetupCanceled,
        LlrCounter::StartCmd,
        LlrCounter::Running,
        LlrCounter::StartTimeout,
        LlrCounter::StartFail,
        LlrCounter::StartCanceled,
        LlrCounter::StopCmd,
        LlrCounter::StopFail,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            LlrCounter::Configured => "llr-configured",
            LlrCounter::SetupCmd => "llr-setup-cmd",
            LlrCounter::Setup => "llr-setup",
            LlrCounter::SetupTimeout => "llr-setup-timeout",
            LlrCounter::SetupFail => "llr-setup-fail",
            LlrCounter::SetupCanceled => "llr-setup-canceled",
            LlrCounter::StartCmd => "llr-start-cmd",
            LlrCounter::Running => "llr-running",
            LlrCounter::StartTimeout => "llr-start-timeout",
            LlrCounter::StartFail => "llr-start-fail",
            LlrCounter::StartCanceled => "llr-start-canceled",
            LlrCounter::StopCmd => "llr-stop-cmd",
            LlrCounter::StopFail => "llr-stop-fail",
        }
    }
}

#[derive(Debug, Default)]
pub struct LlrCounters {
    counts: [AtomicU32; LlrCounter::COUNT],
}

impl LlrCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, counter: LlrCounter) {
        self.counts[counter as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: LlrCounter) -> u32 {
        self.counts[counter as usize].load(Ordering::Relaxed)
    }

    /// Snapshot of every counter with its name.
    pub fn snapshot(&self) -> [(&'static str, u32); LlrCounter::COUNT] {
        LlrCounter::ALL.map(|counter| (counter.as_str(), self.get(counter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent() {
        let counters = LlrCounters::new();
        counters.inc(LlrCounter::SetupCmd);
        counters.inc(LlrCounter::SetupCmd);
        counters.inc(LlrCounter::StopFail);
        assert_eq!(counters.get(LlrCounter::SetupCmd), 2);
        assert_eq!(counters.get(LlrCounter::StopFail), 1);
        assert_eq!(counters.get(LlrCounter::Running), 0);
        assert_eq!(counters.snapshot()[1], ("llr-setup-cmd", 2));
    }
}
