//! Loop-time statistics and replay buffer sizing.
//!
//! The replay buffer has to hold everything in flight for one round trip
//! plus two maximum-size frames. Capacity is counted twice: in 64-byte
//! data quanta and in 32-byte sequence slots.

use drivers::platform::Capacity;

use crate::config::LlrSettings;

/// Samples averaged per measurement.
pub const LOOP_TIME_COUNT: usize = 10;
/// Reads allowed to collect [`LOOP_TIME_COUNT`] nonzero samples.
pub const LOOP_TIME_MAX_TRIES: u32 = 100;
/// Settle time between clearing and reading the loop-time register.
pub const LOOP_TIME_SETTLE_US: u32 = 50;

const MAX_FRAME_BYTES: u64 = 9216;
const FRAMES_IN_FLIGHT: u64 = 2;
const DATA_QUANTUM_BYTES: u64 = 64;
const SEQ_QUANTUM_BYTES: u64 = 32;

/// Capacity granted to fabric links regardless of the measurement.
pub const FABRIC_CAPACITY: u64 = 0x800;

pub const REPLAY_TIMER_MIN_NS: u64 = 1000;
pub const REPLAY_TIMER_MAX_NS: u64 = 15500;
const REPLAY_TIMER_MARGIN_NS: u64 = 500;
/// Replay count limit programmed once the loop time is known.
pub const REPLAY_CT_MAX: u64 = 0xFE;

/// Theoretical loop time of the pipeline, for reference next to the
/// measured values.
pub const fn calculated_loop_time() -> u64 {
    2 * 100 * 4 / 100 + 2 * (25 + 91)
}

/// Loop-time figures reported with a completed setup, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopTime {
    pub calculated: u64,
    pub min: u64,
    pub max: u64,
    pub average: u64,
}

/// Data handed to the setup callback and returned by `data_get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LlrData {
    pub loop_time: LoopTime,
}

/// Up to [`LOOP_TIME_COUNT`] nonzero loop-time samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopTimes {
    samples: [u64; LOOP_TIME_COUNT],
    len: usize,
}

impl LoopTimes {
    pub const fn new() -> Self {
        Self {
            samples: [0; LOOP_TIME_COUNT],
            len: 0,
        }
    }

    /// Record a sample. Zero means "no measurement yet" and is dropped.
    pub fn push(&mut self, ns: u64) -> bool {
        if ns == 0 || self.is_full() {
            return false;
        }
        self.samples[self.len] = ns;
        self.len += 1;
        true
    }

    pub fn is_full(&self) -> bool {
        self.len == LOOP_TIME_COUNT
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.samples[..self.len]
    }
}

/// Statistics over `samples`. The average is always taken over
/// [`LOOP_TIME_COUNT`] slots, rounded up. Sums saturate.
pub fn loop_time_stats(samples: &[u64]) -> LoopTime {
    let sum = samples.iter().fold(0u64, |sum, ns| sum.saturating_add(*ns));
    LoopTime {
        calculated: calculated_loop_time(),
        min: samples.iter().copied().min().unwrap_or(0),
        max: samples.iter().copied().max().unwrap_or(0),
        average: sum.div_ceil(LOOP_TIME_COUNT as u64),
    }
}

/// Replay timer limit for an average loop time of `average_ns`.
pub fn replay_timer_max(average_ns: u64) -> u64 {
    average_ns
        .saturating_mul(3)
        .saturating_add(REPLAY_TIMER_MARGIN_NS)
        .clamp(REPLAY_TIMER_MIN_NS, REPLAY_TIMER_MAX_NS)
}

/// Replay buffer capacity needed for an average loop time of `average_ns`.
pub fn capacity(average_ns: u64, settings: &LlrSettings) -> Capacity {
    if settings.fabric_link {
        return Capacity {
            data: FABRIC_CAPACITY,
            seq: FABRIC_CAPACITY,
        };
    }

    let bytes = average_ns
        .saturating_mul(settings.bytes_per_ns)
        .saturating_add(FRAMES_IN_FLIGHT * MAX_FRAME_BYTES);
    Capacity {
        data: bytes.div_ceil(DATA_QUANTUM_BYTES).min(settings.max_cap_data),
        seq: bytes.div_ceil(SEQ_QUANTUM_BYTES).min(settings.max_cap_seq),
    }
}

/// Everything programmed from one loop-time measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityPlan {
    pub loop_time: LoopTime,
    pub capacity: Capacity,
    pub replay_timer_max: u64,
    pub replay_ct_max: u64,
}

pub fn plan(samples: &LoopTimes, settings: &LlrSettings) -> CapacityPlan {
    let loop_time = loop_time_stats(samples.as_slice());
    CapacityPlan {
        loop_time,
        capacity: capacity(loop_time.average, settings),
        replay_timer_max: replay_timer_max(loop_time.average),
        replay_ct_max: REPLAY_CT_MAX,
    }
}
