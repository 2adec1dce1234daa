//! Devices hosting LLR instances.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use drivers::{Clock, CsrAccess, FlagInterruptController, Generation};

use crate::error::Result;
use crate::work::WorkQueue;

/// Host clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn delay_us(&self, us: u32) {
        std::thread::sleep(Duration::from_micros(u64::from(us)));
    }

    fn sleep_ms(&self, min_ms: u32, max_ms: u32) {
        let _ = max_ms;
        std::thread::sleep(Duration::from_millis(u64::from(min_ms)));
    }
}

/// One LLR-capable device: register access, interrupt controller, clock
/// and the ordered work queue shared by all of its links.
pub struct LlrDevice {
    num: u8,
    generation: Generation,
    csr: Arc<dyn CsrAccess>,
    intr: Arc<dyn FlagInterruptController>,
    clock: Arc<dyn Clock>,
    workq: WorkQueue,
}

impl LlrDevice {
    pub fn new(
        num: u8,
        generation: Generation,
        csr: Arc<dyn CsrAccess>,
        intr: Arc<dyn FlagInterruptController>,
    ) -> Result<Self> {
        Self::with_clock(num, generation, csr, intr, Arc::new(StdClock::new()))
    }

    pub fn with_clock(
        num: u8,
        generation: Generation,
        csr: Arc<dyn CsrAccess>,
        intr: Arc<dyn FlagInterruptController>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let workq = WorkQueue::new(format!("llr-dev{}", num))?;

        log::info!("llr device {} added ({}, {} links)", num, generation, generation.max_links());

        Ok(Self {
            num,
            generation,
            csr,
            intr,
            clock,
            workq,
        })
    }

    pub fn num(&self) -> u8 {
        self.num
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn csr(&self) -> Arc<dyn CsrAccess> {
        self.csr.clone()
    }

    pub(crate) fn intr(&self) -> &dyn FlagInterruptController {
        self.intr.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Limit the device's pending work items (default 256). Submissions
    /// beyond it are refused; a refused stop fails with
    /// [`LlrError::Busy`](crate::LlrError::Busy).
    pub fn work_queue_depth_set(&self, depth: usize) {
        log::debug!("llr device {}: work queue depth {}", self.num, depth);
        self.workq.set_max_depth(depth);
    }

    pub(crate) fn workq(&self) -> &WorkQueue {
        &self.workq
    }
}

impl fmt::Debug for LlrDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlrDevice")
            .field("num", &self.num)
            .field("generation", &self.generation)
            .finish()
    }
}
