//! Time source Hardware Abstraction Layer.

/// Monotonic clock with delay helpers.
pub trait Clock: Send + Sync {
    /// Free-running microsecond counter.
    fn now_us(&self) -> u64;

    /// Busy-wait delay for the specified number of microseconds.
    ///
    /// This blocks the CPU and should only be used for short delays.
    fn delay_us(&self, us: u32) {
        let start = self.now_us();
        let duration = us as u64;

        while self.now_us().wrapping_sub(start) < duration {
            core::hint::spin_loop();
        }
    }

    /// Sleep for somewhere between `min_ms` and `max_ms`.
    ///
    /// Implementations that can yield the CPU should override this; the
    /// default busy-waits for `min_ms`.
    fn sleep_ms(&self, min_ms: u32, max_ms: u32) {
        let _ = max_ms;
        self.delay_us(min_ms.saturating_mul(1000));
    }
}
