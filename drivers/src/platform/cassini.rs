//! Cassini LLR programming.

use alloc::sync::Arc;

use super::{Generation, LlrHardware};
use crate::hal::csr::{CsrAccess, CsrAccessExt, CsrError};
use crate::hw::{LlrRegs, cassini, pml};

/// The single LLR link of a Cassini port.
pub struct CassiniLlr {
    csr: Arc<dyn CsrAccess>,
    regs: LlrRegs,
}

impl CassiniLlr {
    pub fn new(csr: Arc<dyn CsrAccess>) -> Self {
        Self {
            csr,
            regs: cassini::regs(),
        }
    }
}

impl LlrHardware for CassiniLlr {
    fn generation(&self) -> Generation {
        Generation::Cassini
    }

    fn port(&self) -> u8 {
        0
    }

    fn link(&self) -> u8 {
        0
    }

    fn csr(&self) -> &dyn CsrAccess {
        self.csr.as_ref()
    }

    fn regs(&self) -> &LlrRegs {
        &self.regs
    }

    fn timeouts_set(&self) -> Result<(), CsrError> {
        self.csr.modify64(cassini::CFG_LLR_TIMEOUTS, |v| {
            let v = pml::CFG_LLR_TIMEOUTS_DATA_AGE_TIMER_MAX.update(v, pml::DATA_AGE_TIMER_MAX);
            pml::CFG_LLR_TIMEOUTS_PCS_LINK_DN_TIMER_MAX.update(v, pml::PCS_LINK_DN_TIMER_MAX)
        })?;
        self.csr.flush64(cassini::CFG_LLR_TIMEOUTS)
    }

    fn supports_reuse_timing(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::emulator::LlrEmulator;
    use crate::platform::{HwLinkDownBehavior, LlrIntr, LlrRegisterConfig};

    #[test]
    fn no_unexpected_loop_time_source() {
        let emu = Arc::new(LlrEmulator::new(Generation::Cassini));
        let hw = CassiniLlr::new(emu);
        assert!(hw.intr_source(LlrIntr::SetupUnexpLoopTime).is_none());
        assert_eq!(hw.intr_source(LlrIntr::SetupLoopTime).unwrap().flags[0], 1 << 20);
        assert!(!hw.intr_flags_pending(LlrIntr::SetupUnexpLoopTime).unwrap());
    }

    #[test]
    fn config_programs_every_field() {
        let emu = Arc::new(LlrEmulator::new(Generation::Cassini));
        let hw = CassiniLlr::new(emu.clone());
        let cfg = LlrRegisterConfig {
            link_down_behavior: HwLinkDownBehavior::BestEffort,
            ..LlrRegisterConfig::default()
        };
        hw.config(&cfg).unwrap();

        let subport = emu.reg(cassini::CFG_LLR_SUBPORT);
        assert_eq!(pml::CFG_LLR_SUBPORT_LINK_DOWN_BEHAVIOR.get(subport), 2);
        assert_eq!(pml::CFG_LLR_SUBPORT_MAX_STARVATION_LIMIT.get(subport), 1550);
        assert_eq!(pml::CFG_LLR_SUBPORT_LLR_MODE.get(subport), pml::LLR_MODE_OFF);
        assert_eq!(pml::CFG_LLR_CF_ETYPE_CTL_FRAME_ETHERTYPE.get(emu.reg(cassini::CFG_LLR_CF_ETYPE)), 0x88B6);

        let sm = emu.reg(cassini::CFG_LLR_SM);
        assert_eq!(pml::CFG_LLR_SM_RETRY_THRESHOLD.get(sm), 2);
        assert_eq!(pml::CFG_LLR_SM_REPLAY_CT_MAX.get(sm), 0xFF);
        assert_eq!(pml::CFG_LLR_SM_REPLAY_TIMER_MAX.get(sm), 15500);

        let timeouts = emu.reg(cassini::CFG_LLR_TIMEOUTS);
        assert_eq!(pml::CFG_LLR_TIMEOUTS_DATA_AGE_TIMER_MAX.get(timeouts), 0xEE6B_2800);
        assert_eq!(pml::CFG_LLR_TIMEOUTS_PCS_LINK_DN_TIMER_MAX.get(timeouts), 0x389A_CA00);
    }

    #[test]
    fn on_then_off_toggles_mode_only() {
        let emu = Arc::new(LlrEmulator::new(Generation::Cassini));
        let hw = CassiniLlr::new(emu.clone());
        hw.enable().unwrap();
        hw.on().unwrap();
        let subport = emu.reg(cassini::CFG_LLR_SUBPORT);
        assert_eq!(pml::CFG_LLR_SUBPORT_LLR_MODE.get(subport), pml::LLR_MODE_ON);
        assert_eq!(pml::CFG_LLR_SUBPORT_ENABLE_LOOP_TIMING.get(subport), 1);

        hw.off().unwrap();
        let subport = emu.reg(cassini::CFG_LLR_SUBPORT);
        assert_eq!(pml::CFG_LLR_SUBPORT_LLR_MODE.get(subport), pml::LLR_MODE_OFF);
        assert_eq!(pml::CFG_LLR_SUBPORT_ENABLE_LOOP_TIMING.get(subport), 1);
    }
}
