//! Rosetta LLR programming.

use alloc::sync::Arc;

use super::{Generation, LlrHardware};
use crate::hal::csr::{CsrAccess, CsrAccessExt, CsrError};
use crate::hw::{LlrRegs, pml, rosetta};

/// One LLR subport of a Rosetta port.
pub struct RosettaLlr {
    csr: Arc<dyn CsrAccess>,
    port: u8,
    link: u8,
    regs: LlrRegs,
}

impl RosettaLlr {
    /// `port` and `link` must be below [`rosetta::MAX_PORTS`] and
    /// [`rosetta::MAX_LINKS`].
    pub fn new(csr: Arc<dyn CsrAccess>, port: u8, link: u8) -> Self {
        Self {
            csr,
            port,
            link,
            regs: rosetta::regs(port, link),
        }
    }
}

impl LlrHardware for RosettaLlr {
    fn generation(&self) -> Generation {
        Generation::Rosetta
    }

    fn port(&self) -> u8 {
        self.port
    }

    fn link(&self) -> u8 {
        self.link
    }

    fn csr(&self) -> &dyn CsrAccess {
        self.csr.as_ref()
    }

    fn regs(&self) -> &LlrRegs {
        &self.regs
    }

    // Split across two registers on this generation.
    fn timeouts_set(&self) -> Result<(), CsrError> {
        let timeouts_0 = rosetta::cfg_llr_timeouts_0(self.port, self.link);
        let timeouts_1 = rosetta::cfg_llr_timeouts_1(self.port, self.link);

        self.csr.modify64(timeouts_0, |v| {
            pml::CFG_LLR_TIMEOUTS_PCS_LINK_DN_TIMER_MAX.update(v, pml::PCS_LINK_DN_TIMER_MAX)
        })?;
        self.csr.modify64(timeouts_1, |v| {
            pml::CFG_LLR_TIMEOUTS_1_DATA_AGE_TIMER_MAX.update(v, pml::DATA_AGE_TIMER_MAX)
        })?;
        self.csr.flush64(timeouts_1)
    }

    fn supports_reuse_timing(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::LlrIntr;
    use crate::platform::emulator::LlrEmulator;

    #[test]
    fn interrupts_use_word3_per_subport() {
        let emu = Arc::new(LlrEmulator::new(Generation::Rosetta));
        let hw = RosettaLlr::new(emu, 5, 2);
        let source = hw.intr_source(LlrIntr::SetupLoopTime).unwrap();
        assert_eq!(source.port, 5);
        assert_eq!(source.flags[..3], [0, 0, 0]);
        assert_eq!(source.flags[3], 1 << 10);
        assert!(hw.intr_source(LlrIntr::SetupUnexpLoopTime).is_some());
    }

    #[test]
    fn timeouts_written_to_both_registers() {
        let emu = Arc::new(LlrEmulator::new(Generation::Rosetta));
        let hw = RosettaLlr::new(emu.clone(), 0, 1);
        hw.timeouts_set().unwrap();
        assert_eq!(emu.reg(rosetta::cfg_llr_timeouts_0(0, 1)), 0x389A_CA00);
        assert_eq!(emu.reg(rosetta::cfg_llr_timeouts_1(0, 1)), 0xEE6B_2800);
        assert_eq!(emu.reg(rosetta::cfg_llr_timeouts_0(0, 0)), 0);
    }

    #[test]
    fn ports_do_not_share_registers() {
        let emu = Arc::new(LlrEmulator::new(Generation::Rosetta));
        let port0 = RosettaLlr::new(emu.clone(), 0, 3);
        let port1 = RosettaLlr::new(emu.clone(), 1, 3);
        port0.on().unwrap();
        port1.off().unwrap();

        let mode = |port| pml::CFG_LLR_SUBPORT_LLR_MODE.get(emu.reg(rosetta::cfg_llr_subport(port, 3)));
        assert_eq!(mode(0), pml::LLR_MODE_ON);
        assert_eq!(mode(1), pml::LLR_MODE_OFF);
        assert_ne!(port0.regs().err_flg, port1.regs().err_flg);
        assert_ne!(port0.regs().cfg_llr, port1.regs().cfg_llr);
    }

    #[test]
    fn ordered_sets_stop_clears_both_directions() {
        let emu = Arc::new(LlrEmulator::new(Generation::Rosetta));
        let hw = RosettaLlr::new(emu.clone(), 2, 0);
        hw.enable().unwrap();
        hw.ordered_sets_stop().unwrap();
        assert_eq!(pml::CFG_PCS_SUBPORT_ENABLE_CTL_OS.get(emu.reg(rosetta::cfg_tx_pcs_subport(2, 0))), 0);
        assert_eq!(pml::CFG_PCS_SUBPORT_ENABLE_CTL_OS.get(emu.reg(rosetta::cfg_rx_pcs_subport(2, 0))), 0);
        assert_eq!(emu.flush_count(rosetta::cfg_tx_pcs_subport(2, 0)), 1);
    }
}
