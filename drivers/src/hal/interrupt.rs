//! Error-flag interrupt Hardware Abstraction Layer.
//!
//! LLR events arrive as bits in a port's error-flag registers. A
//! consumer describes the bits it owns as the port plus four 64-bit words
//! and the controller calls its handler when any of them latch.

use alloc::sync::Arc;
use core::fmt;

/// Number of error-flag words per source.
pub const INTR_FLAG_WORDS: usize = 4;

/// Bits identifying one interrupt source, one entry per flag word.
pub type IntrFlags = [u64; INTR_FLAG_WORDS];

/// One interrupt source: flag bits in the error-flag block of `port`.
///
/// Every port has its own block, so equal flag words on two ports are
/// distinct sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrSource {
    pub port: u8,
    pub flags: IntrFlags,
}

impl IntrSource {
    pub const fn new(port: u8, flags: IntrFlags) -> Self {
        Self { port, flags }
    }

    /// True if `latched` on `port` overlaps this source.
    pub fn matches(&self, port: u8, latched: &IntrFlags) -> bool {
        self.port == port && flags_match(&self.flags, latched)
    }
}

/// Interrupt handler.
///
/// Receives the raw flag words that were latched. Runs in the
/// controller's context: it must not block.
pub type IntrHandler = Arc<dyn Fn(&IntrFlags) + Send + Sync>;

/// Interrupt controller errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrError {
    /// This source already has a handler
    AlreadyRegistered,
    /// No handler is registered for this source
    NotRegistered,
    /// The controller rejected the request
    Hardware,
}

impl fmt::Display for IntrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntrError::AlreadyRegistered => write!(f, "already registered"),
            IntrError::NotRegistered => write!(f, "not registered"),
            IntrError::Hardware => write!(f, "controller failure"),
        }
    }
}

/// Flag-word interrupt controller.
///
/// Sources are identified by port and flag words. Enable and disable are
/// expected to be idempotent.
pub trait FlagInterruptController: Send + Sync {
    /// Bind a handler to a source.
    fn register(&self, source: &IntrSource, handler: IntrHandler) -> Result<(), IntrError>;

    /// Remove the handler bound to `source`.
    fn unregister(&self, source: &IntrSource) -> Result<(), IntrError>;

    /// Unmask the source.
    fn enable(&self, source: &IntrSource) -> Result<(), IntrError>;

    /// Mask the source.
    fn disable(&self, source: &IntrSource) -> Result<(), IntrError>;
}

/// True if any bit of `flags` is set in `latched`.
pub fn flags_match(flags: &IntrFlags, latched: &IntrFlags) -> bool {
    flags.iter().zip(latched).any(|(a, b)| a & b != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_needs_overlap_in_same_word() {
        let mine = [0, 0, 0, 1 << 4];
        assert!(flags_match(&mine, &[0, 0, 0, 0x30]));
        assert!(!flags_match(&mine, &[1 << 4, 0, 0, 0]));
    }

    #[test]
    fn source_match_needs_same_port() {
        let source = IntrSource::new(3, [0, 0, 0, 1 << 4]);
        assert!(source.matches(3, &[0, 0, 0, 1 << 4]));
        assert!(!source.matches(2, &[0, 0, 0, 1 << 4]));
    }
}
