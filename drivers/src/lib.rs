//! Hardware Driver Subsystem for the link layer retry (LLR) block
//!
//! # Module Organization
//!
//! - [`hal`]: Generation-independent trait definitions (CSR access,
//!   flag-word interrupts, clock)
//! - [`hw`]: Register maps and field layouts per ASIC generation
//! - [`platform`]: LLR register programming per generation, plus an
//!   in-memory emulator
//!
//! # Design Principles
//!
//! 1. **One state machine, many generations**: callers only see
//!    [`platform::LlrHardware`]; register layout stays behind it
//! 2. **Read-modify-write**: every field update preserves its neighbours
//!    and is followed by a flush
//! 3. **No blocking in handlers**: interrupt handlers run in the
//!    controller's context and must only record and defer
//!
//! # Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use drivers::platform::{self, Generation, emulator::LlrEmulator};
//!
//! let emu = Arc::new(LlrEmulator::new(Generation::Rosetta));
//! let hw = platform::llr_hardware(Generation::Rosetta, emu.clone(), 0, 0)?;
//! hw.off()?;
//! ```

#![cfg_attr(not(test), no_std)]

pub mod hal;
pub mod hw;
pub mod platform;

// Re-export commonly used types
pub use hal::csr::{CsrAccess, CsrAccessExt, CsrAddr, CsrError};
pub use hal::interrupt::{FlagInterruptController, INTR_FLAG_WORDS, IntrError, IntrFlags, IntrHandler, IntrSource};
pub use hal::timer::Clock;
pub use platform::{Generation, LlrHardware};

extern crate alloc;
