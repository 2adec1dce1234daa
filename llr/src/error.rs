use core::fmt;

use drivers::platform::PlatformError;
use drivers::{CsrError, IntrError};

use crate::state::LlrState;

/// LLR controller errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlrError {
    /// An instance already exists for the key
    AlreadyExists,
    /// No instance (or device) for the key
    NotFound,
    /// Operation not legal from the current state
    InvalidState(LlrState),
    /// Already in the requested state; informational
    AlreadyInState(LlrState),
    /// Device still hosts instances, or its work queue refused a command
    Busy,
    /// Could not allocate a worker or timer
    OutOfMemory,
    /// Rejected configuration or link capabilities
    InvalidArgument(&'static str),
    /// Bounded wait for a transition expired
    Timeout,
    /// Register access failed
    Csr(CsrError),
    /// Interrupt controller failed
    Interrupt(IntrError),
    /// Hardware generation or link not available
    Platform(PlatformError),
}

impl fmt::Display for LlrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlrError::AlreadyExists => write!(f, "already exists"),
            LlrError::NotFound => write!(f, "not found"),
            LlrError::InvalidState(state) => write!(f, "invalid state ({})", state),
            LlrError::AlreadyInState(state) => write!(f, "already {}", state),
            LlrError::Busy => write!(f, "busy"),
            LlrError::OutOfMemory => write!(f, "out of memory"),
            LlrError::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            LlrError::Timeout => write!(f, "timed out"),
            LlrError::Csr(e) => write!(f, "csr: {}", e),
            LlrError::Interrupt(e) => write!(f, "interrupt: {}", e),
            LlrError::Platform(e) => write!(f, "platform: {}", e),
        }
    }
}

impl std::error::Error for LlrError {}

impl From<CsrError> for LlrError {
    fn from(e: CsrError) -> Self {
        LlrError::Csr(e)
    }
}

impl From<IntrError> for LlrError {
    fn from(e: IntrError) -> Self {
        LlrError::Interrupt(e)
    }
}

impl From<PlatformError> for LlrError {
    fn from(e: PlatformError) -> Self {
        LlrError::Platform(e)
    }
}

pub type Result<T> = core::result::Result<T, LlrError>;
