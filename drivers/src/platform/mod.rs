//! LLR register programming per ASIC generation.
//!
//! The controller drives every generation through [`LlrHardware`]. The
//! shared sequence of field updates lives in the trait's default methods;
//! a generation supplies its register map, interrupt bits and the pieces
//! that genuinely differ (timeout registers, reuse-timing support).
//!
//! # Usage
//!
//! ```ignore
//! let hw = platform::llr_hardware(Generation::Cassini, csr, 0, 0)?;
//! hw.config(&LlrRegisterConfig::default())?;
//! hw.enable()?;
//! ```

use alloc::sync::Arc;
use core::fmt;

use crate::hal::csr::{CsrAccess, CsrAccessExt, CsrError};
use crate::hal::interrupt::{INTR_FLAG_WORDS, IntrSource};
use crate::hw::{self, LlrRegs, pml};

pub mod emulator;

/// ASIC generations carrying an LLR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Generation {
    /// Switch ASIC, four links per port
    Rosetta,
    /// NIC ASIC, one link per port
    Cassini,
}

impl Generation {
    pub const fn name(&self) -> &'static str {
        match self {
            Generation::Rosetta => "rosetta",
            Generation::Cassini => "cassini",
        }
    }

    /// Number of ports carrying an LLR block.
    pub const fn max_ports(&self) -> u8 {
        match self {
            Generation::Rosetta => hw::rosetta::MAX_PORTS,
            Generation::Cassini => hw::cassini::MAX_PORTS,
        }
    }

    /// Number of LLR links per port.
    pub const fn max_links(&self) -> u8 {
        match self {
            Generation::Rosetta => hw::rosetta::MAX_LINKS,
            Generation::Cassini => hw::cassini::MAX_LINKS,
        }
    }

    /// Register map for `link` of `port`. Both must be in range.
    pub const fn regs(&self, port: u8, link: u8) -> LlrRegs {
        match self {
            Generation::Rosetta => hw::rosetta::regs(port, link),
            Generation::Cassini => hw::cassini::regs(),
        }
    }

    /// Interrupt source `intr` of `link` on `port`, if the generation
    /// wires it.
    pub const fn intr_source(&self, intr: LlrIntr, port: u8, link: u8) -> Option<IntrSource> {
        match self {
            Generation::Rosetta => {
                let bit = match intr {
                    LlrIntr::SetupUnexpLoopTime => hw::rosetta::err_flg_word3_llr_unexp_loop_time(link),
                    LlrIntr::SetupLoopTime => hw::rosetta::err_flg_word3_llr_loop_time(link),
                    LlrIntr::StartInitComplete => hw::rosetta::err_flg_word3_llr_init_complete(link),
                };
                Some(IntrSource::new(port, [0, 0, 0, bit.set(1)]))
            }
            Generation::Cassini => match intr {
                LlrIntr::SetupUnexpLoopTime => None,
                LlrIntr::SetupLoopTime => Some(IntrSource::new(
                    port,
                    [hw::cassini::ERR_FLG_LLR_LOOP_TIME_0.set(1), 0, 0, 0],
                )),
                LlrIntr::StartInitComplete => Some(IntrSource::new(
                    port,
                    [hw::cassini::ERR_FLG_LLR_INIT_COMPLETE_0.set(1), 0, 0, 0],
                )),
            },
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The three hardware events the LLR sequencer waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LlrIntr {
    SetupUnexpLoopTime,
    SetupLoopTime,
    StartInitComplete,
}

impl LlrIntr {
    pub const COUNT: usize = 3;
    pub const ALL: [LlrIntr; Self::COUNT] = [
        LlrIntr::SetupUnexpLoopTime,
        LlrIntr::SetupLoopTime,
        LlrIntr::StartInitComplete,
    ];

    pub const fn index(&self) -> usize {
        *self as usize
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            LlrIntr::SetupUnexpLoopTime => "setup-unexp-loop-time",
            LlrIntr::SetupLoopTime => "setup-loop-time",
            LlrIntr::StartInitComplete => "start-init-complete",
        }
    }
}

/// Hardware link-down behavior encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HwLinkDownBehavior {
    #[default]
    Discard,
    Block,
    BestEffort,
}

impl HwLinkDownBehavior {
    pub const fn raw(&self) -> u64 {
        match self {
            HwLinkDownBehavior::Discard => pml::LINK_DN_BEHAVIOR_T_LD_DISCARD,
            HwLinkDownBehavior::Block => pml::LINK_DN_BEHAVIOR_T_LD_BLOCK,
            HwLinkDownBehavior::BestEffort => pml::LINK_DN_BEHAVIOR_T_LD_BEST_EFFORT,
        }
    }
}

/// State reported by the LLR hardware state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwLlrState {
    Off,
    Init,
    Advance,
    Halt,
    Replay,
    Discard,
    Unknown(u64),
}

impl HwLlrState {
    pub const fn from_raw(raw: u64) -> Self {
        match raw {
            pml::LLR_STATE_T_OFF => HwLlrState::Off,
            pml::LLR_STATE_T_INIT => HwLlrState::Init,
            pml::LLR_STATE_T_ADVANCE => HwLlrState::Advance,
            pml::LLR_STATE_T_HALT => HwLlrState::Halt,
            pml::LLR_STATE_T_REPLAY => HwLlrState::Replay,
            pml::LLR_STATE_T_DISCARD => HwLlrState::Discard,
            other => HwLlrState::Unknown(other),
        }
    }

    pub const fn raw(&self) -> u64 {
        match self {
            HwLlrState::Off => pml::LLR_STATE_T_OFF,
            HwLlrState::Init => pml::LLR_STATE_T_INIT,
            HwLlrState::Advance => pml::LLR_STATE_T_ADVANCE,
            HwLlrState::Halt => pml::LLR_STATE_T_HALT,
            HwLlrState::Replay => pml::LLR_STATE_T_REPLAY,
            HwLlrState::Discard => pml::LLR_STATE_T_DISCARD,
            HwLlrState::Unknown(raw) => *raw,
        }
    }
}

/// Static LLR parameters written by [`LlrHardware::config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlrRegisterConfig {
    pub size: u64,
    pub lossless_when_off: bool,
    pub link_down_behavior: HwLinkDownBehavior,
    pub filter_ctl_frames: bool,
    pub ctl_frame_smac: u64,
    pub ctl_frame_ethertype: u64,
    pub retry_threshold: u64,
    pub allow_re_init: bool,
    pub replay_ct_max: u64,
    pub replay_timer_max: u64,
}

impl Default for LlrRegisterConfig {
    fn default() -> Self {
        Self {
            size: 1,
            lossless_when_off: true,
            link_down_behavior: HwLinkDownBehavior::Discard,
            filter_ctl_frames: true,
            ctl_frame_smac: 0,
            ctl_frame_ethertype: 0x88B6,
            retry_threshold: 2,
            allow_re_init: false,
            replay_ct_max: 0xFF,
            replay_timer_max: 15500,
        }
    }
}

/// Replay buffer capacity in 64-byte data quanta and 32-byte sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capacity {
    pub data: u64,
    pub seq: u64,
}

/// Errors from [`llr_hardware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    /// The generation was not compiled in
    Unsupported(Generation),
    /// Port index beyond the generation's port count
    PortOutOfRange { port: u8, max: u8 },
    /// Link index beyond the generation's link count
    LinkOutOfRange { link: u8, max: u8 },
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Unsupported(generation) => write!(f, "{} support not built", generation),
            PlatformError::PortOutOfRange { port, max } => {
                write!(f, "port {} out of range (max {})", port, max)
            }
            PlatformError::LinkOutOfRange { link, max } => {
                write!(f, "link {} out of range (max {})", link, max)
            }
        }
    }
}

/// Generation-specific LLR register programming for one link of a port.
///
/// Every operation is a read-modify-write of the affected fields followed
/// by a flush, so it has landed in hardware when the call returns.
pub trait LlrHardware: Send + Sync {
    fn generation(&self) -> Generation;

    fn port(&self) -> u8;

    fn link(&self) -> u8;

    fn csr(&self) -> &dyn CsrAccess;

    fn regs(&self) -> &LlrRegs;

    /// Program the link-down and data-age timeouts.
    fn timeouts_set(&self) -> Result<(), CsrError>;

    /// Whether cached loop timing may be reused to skip measurement.
    fn supports_reuse_timing(&self) -> bool;

    fn intr_source(&self, intr: LlrIntr) -> Option<IntrSource> {
        self.generation().intr_source(intr, self.port(), self.link())
    }

    /// Park the link in discard mode at bring-up.
    fn link_init(&self) -> Result<(), CsrError> {
        log::debug!("{} llr{}.{}: link init", self.generation(), self.port(), self.link());
        self.discard()
    }

    /// Start ordered-set generation and loop-time measurement.
    fn enable(&self) -> Result<(), CsrError> {
        let regs = self.regs();
        let csr = self.csr();

        log::debug!("{} llr{}.{}: enable", self.generation(), self.port(), self.link());

        csr.modify64(regs.cfg_tx_pcs_subport, |v| pml::CFG_PCS_SUBPORT_ENABLE_CTL_OS.update(v, 1))?;
        csr.modify64(regs.cfg_rx_pcs_subport, |v| pml::CFG_PCS_SUBPORT_ENABLE_CTL_OS.update(v, 1))?;
        csr.modify64(regs.cfg_llr_cf_rates, |v| {
            pml::CFG_LLR_CF_RATES_LOOP_TIMING_PERIOD.update(v, pml::LOOP_TIMING_PERIOD)
        })?;
        csr.modify64(regs.cfg_llr_subport, |v| pml::CFG_LLR_SUBPORT_ENABLE_LOOP_TIMING.update(v, 1))?;
        csr.flush64(regs.cfg_llr_subport)
    }

    fn loop_time_stop(&self) -> Result<(), CsrError> {
        let regs = self.regs();

        log::debug!("{} llr{}.{}: loop time stop", self.generation(), self.port(), self.link());

        self.csr()
            .modify64(regs.cfg_llr_subport, |v| pml::CFG_LLR_SUBPORT_ENABLE_LOOP_TIMING.update(v, 0))?;
        self.csr().flush64(regs.cfg_llr_subport)
    }

    fn ordered_sets_stop(&self) -> Result<(), CsrError> {
        let regs = self.regs();
        let csr = self.csr();

        log::debug!("{} llr{}.{}: ordered sets stop", self.generation(), self.port(), self.link());

        csr.modify64(regs.cfg_rx_pcs_subport, |v| pml::CFG_PCS_SUBPORT_ENABLE_CTL_OS.update(v, 0))?;
        csr.modify64(regs.cfg_tx_pcs_subport, |v| pml::CFG_PCS_SUBPORT_ENABLE_CTL_OS.update(v, 0))?;
        csr.flush64(regs.cfg_tx_pcs_subport)
    }

    /// Turn the LLR engine on.
    fn on(&self) -> Result<(), CsrError> {
        let regs = self.regs();
        let csr = self.csr();

        log::debug!("{} llr{}.{}: on", self.generation(), self.port(), self.link());

        // must match the link's restart-lock settings
        csr.modify64(regs.cfg_rx_pcs, |v| {
            let v = pml::CFG_RX_PCS_RESTART_LOCK_ON_BAD_CWS.update(v, 0);
            pml::CFG_RX_PCS_RESTART_LOCK_ON_BAD_AMS.update(v, 1)
        })?;
        csr.modify64(regs.cfg_llr_subport, |v| pml::CFG_LLR_SUBPORT_LLR_MODE.update(v, pml::LLR_MODE_ON))?;
        csr.flush64(regs.cfg_llr_subport)
    }

    fn off(&self) -> Result<(), CsrError> {
        let regs = self.regs();

        log::debug!("{} llr{}.{}: off", self.generation(), self.port(), self.link());

        self.csr()
            .modify64(regs.cfg_llr_subport, |v| pml::CFG_LLR_SUBPORT_LLR_MODE.update(v, pml::LLR_MODE_OFF))?;
        self.csr().flush64(regs.cfg_llr_subport)
    }

    fn discard(&self) -> Result<(), CsrError> {
        let regs = self.regs();

        log::debug!("{} llr{}.{}: discard", self.generation(), self.port(), self.link());

        self.csr().modify64(regs.cfg_llr_subport, |v| {
            pml::CFG_LLR_SUBPORT_LINK_DOWN_BEHAVIOR.update(v, HwLinkDownBehavior::Discard.raw())
        })?;
        self.csr().flush64(regs.cfg_llr_subport)
    }

    /// Write the static LLR configuration. Leaves loop timing and the
    /// engine off.
    fn config(&self, cfg: &LlrRegisterConfig) -> Result<(), CsrError> {
        let regs = self.regs();
        let csr = self.csr();

        log::debug!("{} llr{}.{}: config", self.generation(), self.port(), self.link());

        csr.modify64(regs.cfg_llr, |v| {
            let v = pml::CFG_LLR_SIZE.update(v, cfg.size);
            let v = pml::CFG_LLR_ACK_NACK_ERR_CHECK.update(v, 1);
            pml::CFG_LLR_PREAMBLE_SEQ_CHECK.update(v, 1)
        })?;

        csr.modify64(regs.cfg_llr_subport, |v| {
            let v = pml::CFG_LLR_SUBPORT_FILTER_LOSSLESS_WHEN_OFF.update(v, cfg.lossless_when_off as u64);
            let v = pml::CFG_LLR_SUBPORT_LINK_DOWN_BEHAVIOR.update(v, cfg.link_down_behavior.raw());
            let v = pml::CFG_LLR_SUBPORT_FILTER_CTL_FRAMES.update(v, cfg.filter_ctl_frames as u64);
            let v = pml::CFG_LLR_SUBPORT_ENABLE_LOOP_TIMING.update(v, 0);
            let v = pml::CFG_LLR_SUBPORT_LLR_MODE.update(v, pml::LLR_MODE_OFF);
            pml::CFG_LLR_SUBPORT_MAX_STARVATION_LIMIT.update(v, pml::MAX_STARVATION_LIMIT)
        })?;

        csr.modify64(regs.cfg_llr_cf_smac, |v| {
            pml::CFG_LLR_CF_SMAC_CTL_FRAME_SMAC.update(v, cfg.ctl_frame_smac)
        })?;
        csr.modify64(regs.cfg_llr_cf_etype, |v| {
            pml::CFG_LLR_CF_ETYPE_CTL_FRAME_ETHERTYPE.update(v, cfg.ctl_frame_ethertype)
        })?;

        csr.modify64(regs.cfg_llr_sm, |v| {
            let v = pml::CFG_LLR_SM_RETRY_THRESHOLD.update(v, cfg.retry_threshold);
            let v = pml::CFG_LLR_SM_ALLOW_RE_INIT.update(v, cfg.allow_re_init as u64);
            let v = pml::CFG_LLR_SM_REPLAY_CT_MAX.update(v, cfg.replay_ct_max);
            pml::CFG_LLR_SM_REPLAY_TIMER_MAX.update(v, cfg.replay_timer_max)
        })?;

        self.timeouts_set()
    }

    fn capacity_set(&self, cap: Capacity) -> Result<(), CsrError> {
        let regs = self.regs();

        log::debug!(
            "{} llr{}.{}: capacity set (data = {}, seq = {})",
            self.generation(),
            self.port(),
            self.link(),
            cap.data,
            cap.seq
        );

        let value = pml::CFG_LLR_CAPACITY_MAX_DATA.set(cap.data) | pml::CFG_LLR_CAPACITY_MAX_SEQ.set(cap.seq);
        self.csr().write64(regs.cfg_llr_capacity, value)?;
        self.csr().flush64(regs.cfg_llr_capacity)
    }

    /// Reprogram the replay limits derived from the measured loop time.
    fn replay_set(&self, replay_ct_max: u64, replay_timer_max: u64) -> Result<(), CsrError> {
        let regs = self.regs();

        log::debug!(
            "{} llr{}.{}: replay set (ct_max = {}, timer_max = {})",
            self.generation(),
            self.port(),
            self.link(),
            replay_ct_max,
            replay_timer_max
        );

        self.csr().modify64(regs.cfg_llr_sm, |v| {
            let v = pml::CFG_LLR_SM_REPLAY_CT_MAX.update(v, replay_ct_max);
            pml::CFG_LLR_SM_REPLAY_TIMER_MAX.update(v, replay_timer_max)
        })?;
        self.csr().flush64(regs.cfg_llr_sm)
    }

    /// Reset the loop-time status so the next reading is fresh.
    fn loop_time_clear(&self) -> Result<(), CsrError> {
        let regs = self.regs();
        self.csr().write64(regs.sts_llr_loop_time, 0)?;
        self.csr().flush64(regs.sts_llr_loop_time)
    }

    /// Last measured loop time in nanoseconds, zero if none yet.
    fn loop_time_read(&self) -> Result<u64, CsrError> {
        let value = self.csr().read64(self.regs().sts_llr_loop_time)?;
        Ok(pml::STS_LLR_LOOP_TIME_LOOP_TIME.get(value))
    }

    fn llr_state(&self) -> Result<HwLlrState, CsrError> {
        let value = self.csr().read64(self.regs().sts_llr)?;
        Ok(HwLlrState::from_raw(pml::STS_LLR_LLR_STATE.get(value)))
    }

    /// Acknowledge latched flags of `intr`.
    fn intr_flags_clear(&self, intr: LlrIntr) -> Result<(), CsrError> {
        let Some(source) = self.intr_source(intr) else {
            return Ok(());
        };
        let regs = self.regs();
        for (word, bits) in source.flags.iter().enumerate().filter(|(_, bits)| **bits != 0) {
            self.csr().write64(regs.err_flg_clr_word(word), *bits)?;
        }
        self.csr().flush64(regs.err_flg_clr_word(INTR_FLAG_WORDS - 1))
    }

    /// True if any flag of `intr` is currently latched.
    fn intr_flags_pending(&self, intr: LlrIntr) -> Result<bool, CsrError> {
        let Some(source) = self.intr_source(intr) else {
            return Ok(false);
        };
        let regs = self.regs();
        for (word, bits) in source.flags.iter().enumerate() {
            if *bits != 0 && self.csr().read64(regs.err_flg_word(word))? & bits != 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// Generation selection based on Cargo features
cfg_if::cfg_if! {
    if #[cfg(all(feature = "rosetta", feature = "cassini"))] {
        pub mod cassini;
        pub mod rosetta;
        pub use cassini::CassiniLlr;
        pub use rosetta::RosettaLlr;
    } else if #[cfg(feature = "rosetta")] {
        pub mod rosetta;
        pub use rosetta::RosettaLlr;
    } else if #[cfg(feature = "cassini")] {
        pub mod cassini;
        pub use cassini::CassiniLlr;
    } else {
        compile_error!(
            "No ASIC generation selected!\n\
            Use: cargo build --features rosetta\n\
            Or:  cargo build --features cassini"
        );
    }
}

/// Build the LLR programming interface for `link` of `port` on a
/// `generation` device.
pub fn llr_hardware(
    generation: Generation,
    csr: Arc<dyn CsrAccess>,
    port: u8,
    link: u8,
) -> Result<Arc<dyn LlrHardware>, PlatformError> {
    let max = generation.max_ports();
    if port >= max {
        return Err(PlatformError::PortOutOfRange { port, max });
    }
    let max = generation.max_links();
    if link >= max {
        return Err(PlatformError::LinkOutOfRange { link, max });
    }

    match generation {
        #[cfg(feature = "rosetta")]
        Generation::Rosetta => Ok(Arc::new(RosettaLlr::new(csr, port, link))),
        #[cfg(feature = "cassini")]
        Generation::Cassini => Ok(Arc::new(CassiniLlr::new(csr))),
        #[allow(unreachable_patterns)]
        other => {
            let _ = csr;
            Err(PlatformError::Unsupported(other))
        }
    }
}
