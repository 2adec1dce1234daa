//! Hardware Abstraction Layer (HAL) - Generation-Independent Traits
//!
//! These traits are implemented by the platform layer (or by a test
//! double) and consumed by the LLR controller. They carry no knowledge of
//! a particular ASIC.
//!
//! # Available Interfaces
//!
//! - [`csr`]: 64-bit control/status register access
//! - [`interrupt`]: error-flag interrupt demultiplexing
//! - [`timer`]: time source and delays
pub mod csr;
pub mod interrupt;
pub mod timer;
