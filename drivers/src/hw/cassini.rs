//! Cassini (NIC) PML register map.
//!
//! A single port with one LLR link. Interrupts live in error-flag word 0 and there
//! is no unexpected-loop-time source.

use super::LlrRegs;
use crate::hal::csr::CsrAddr;
use common::reg::Field;

pub const MAX_PORTS: u8 = 1;
pub const MAX_LINKS: u8 = 1;

pub const PML_BASE: CsrAddr = 0x0080_0000;

pub const ERR_FLG: CsrAddr = PML_BASE + 0x0008;
pub const ERR_FLG_CLR: CsrAddr = PML_BASE + 0x0028;

pub const CFG_RX_PCS: CsrAddr = PML_BASE + 0x0100;
pub const CFG_TX_PCS_SUBPORT: CsrAddr = PML_BASE + 0x0108;
pub const CFG_RX_PCS_SUBPORT: CsrAddr = PML_BASE + 0x0110;
pub const CFG_LLR: CsrAddr = PML_BASE + 0x0200;
pub const CFG_LLR_CF_SMAC: CsrAddr = PML_BASE + 0x0208;
pub const CFG_LLR_CF_ETYPE: CsrAddr = PML_BASE + 0x0210;
pub const CFG_LLR_CF_RATES: CsrAddr = PML_BASE + 0x0218;
pub const CFG_LLR_SUBPORT: CsrAddr = PML_BASE + 0x0220;
pub const CFG_LLR_CAPACITY: CsrAddr = PML_BASE + 0x0228;
pub const CFG_LLR_SM: CsrAddr = PML_BASE + 0x0230;
pub const CFG_LLR_TIMEOUTS: CsrAddr = PML_BASE + 0x0238;
pub const STS_LLR: CsrAddr = PML_BASE + 0x0400;
pub const STS_LLR_LOOP_TIME: CsrAddr = PML_BASE + 0x0408;

// ERR_FLG word 0
pub const ERR_FLG_LLR_LOOP_TIME_0: Field = Field::bit(20);
pub const ERR_FLG_LLR_INIT_COMPLETE_0: Field = Field::bit(21);

pub const fn regs() -> LlrRegs {
    LlrRegs {
        cfg_llr: CFG_LLR,
        cfg_rx_pcs: CFG_RX_PCS,
        cfg_llr_cf_smac: CFG_LLR_CF_SMAC,
        cfg_llr_cf_etype: CFG_LLR_CF_ETYPE,
        cfg_tx_pcs_subport: CFG_TX_PCS_SUBPORT,
        cfg_rx_pcs_subport: CFG_RX_PCS_SUBPORT,
        cfg_llr_cf_rates: CFG_LLR_CF_RATES,
        cfg_llr_subport: CFG_LLR_SUBPORT,
        cfg_llr_capacity: CFG_LLR_CAPACITY,
        cfg_llr_sm: CFG_LLR_SM,
        sts_llr: STS_LLR,
        sts_llr_loop_time: STS_LLR_LOOP_TIME,
        err_flg: ERR_FLG,
        err_flg_clr: ERR_FLG_CLR,
    }
}
