//! Link Layer Retry (LLR) controller
//!
//! Drives the hardware replay engine of a link through its bring-up
//! protocol: configure, set up (measure the loop time and size the replay
//! buffer from it), start, and stop, with watchdogs, cancellation and
//! teardown that stay safe against interrupts and timers firing
//! concurrently.
//!
//! # Module Organization
//!
//! - [`registry`]: devices and LLR instances keyed by (device, group, link)
//! - [`controller`]: caller-facing state machine on [`Llr`]
//! - `sequencer`: setup/start/stop register sequences and work handlers
//! - `timer`, `work`, `intr`: watchdogs, the per-device ordered work
//!   queue, and interrupt dispatch
//! - [`capacity`]: loop-time statistics and replay capacity math
//! - [`config`], [`state`], [`counters`]: configuration, states, flags
//!
//! # Concurrency
//!
//! Every hardware event (interrupt, watchdog expiry) and every
//! cancellation is turned into a work item on the owning device's queue.
//! One worker thread per device runs items in order, so the handlers of an
//! instance never overlap. Instance fields sit behind one short-held
//! spinlock which is never held across register IO or a callback.
//!
//! # Usage Example
//!
//! ```ignore
//! let registry = LlrRegistry::new();
//! registry.device_add(LlrDevice::new(0, Generation::Rosetta, csr, intr)?)?;
//!
//! let llr = registry.new_llr(0, 0, 0)?;
//! llr.link_caps_set(LinkCaps::new(TechMap::CK_400G, Furcation::X1, false));
//! llr.config_set(&LlrConfig::default())?;
//! llr.setup(SetupFlags::empty(), Box::new(|state, info_map, data| {
//!     log::info!("setup done: {} {:?} {:?}", state, info_map, data);
//! }))?;
//! ```

pub mod capacity;
pub mod config;
pub mod controller;
pub mod counters;
pub mod device;
pub mod error;
pub mod instance;
mod intr;
pub mod registry;
mod sequencer;
pub mod state;
mod timer;
mod work;

pub use capacity::{LlrData, LoopTime};
pub use config::{Furcation, LinkCaps, LinkDownBehavior, LlrConfig, LlrPolicy, PolicyOptions, TechMap};
pub use controller::{SetupCallback, StartCallback};
pub use counters::LlrCounter;
pub use device::{LlrDevice, StdClock};
pub use error::{LlrError, Result};
pub use instance::{Llr, LlrKey};
pub use registry::LlrRegistry;
pub use state::{FailCause, InfoMap, LlrState, SetupFlags, StopFlags};

pub use drivers::platform::Generation;
