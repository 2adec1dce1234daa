//! Shared building blocks for the LLR driver crates.
//!
//! - [`reg`]: bit-field helpers for 64-bit control/status registers
//! - [`sync`]: spinlock and (with `std`) a completion primitive
//!
//! The crate is `no_std` unless the `std` feature is enabled.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod reg;
pub mod sync;
