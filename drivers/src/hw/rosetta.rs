//! Rosetta (switch) PML register map.
//!
//! Every port has its own PML block, `PORT_STRIDE` apart, with four LLR
//! subports. Interrupts live in error-flag word 3 of the port's block.

use super::LlrRegs;
use crate::hal::csr::CsrAddr;
use common::reg::Field;

pub const MAX_PORTS: u8 = 32;
pub const MAX_LINKS: u8 = 4;

pub const PML_BASE: CsrAddr = 0x0200_0000;
pub const PORT_STRIDE: CsrAddr = 0x0001_0000;

pub const fn pml_base(port: u8) -> CsrAddr {
    PML_BASE + PORT_STRIDE * port as CsrAddr
}

pub const fn err_flg(port: u8) -> CsrAddr {
    pml_base(port) + 0x0010
}

pub const fn err_flg_clr(port: u8) -> CsrAddr {
    pml_base(port) + 0x0030
}

pub const fn cfg_rx_pcs(port: u8) -> CsrAddr {
    pml_base(port) + 0x0180
}

pub const fn cfg_llr(port: u8) -> CsrAddr {
    pml_base(port) + 0x0400
}

pub const fn cfg_llr_cf_smac(port: u8) -> CsrAddr {
    pml_base(port) + 0x0410
}

pub const fn cfg_llr_cf_etype(port: u8) -> CsrAddr {
    pml_base(port) + 0x0418
}

const fn subport(port: u8, base: CsrAddr, link: u8) -> CsrAddr {
    pml_base(port) + base + 8 * link as CsrAddr
}

pub const fn cfg_tx_pcs_subport(port: u8, link: u8) -> CsrAddr {
    subport(port, 0x0140, link)
}

pub const fn cfg_rx_pcs_subport(port: u8, link: u8) -> CsrAddr {
    subport(port, 0x01A0, link)
}

pub const fn cfg_llr_cf_rates(port: u8, link: u8) -> CsrAddr {
    subport(port, 0x0440, link)
}

pub const fn cfg_llr_subport(port: u8, link: u8) -> CsrAddr {
    subport(port, 0x0460, link)
}

pub const fn cfg_llr_capacity(port: u8, link: u8) -> CsrAddr {
    subport(port, 0x0480, link)
}

pub const fn cfg_llr_sm(port: u8, link: u8) -> CsrAddr {
    subport(port, 0x04A0, link)
}

pub const fn cfg_llr_timeouts_0(port: u8, link: u8) -> CsrAddr {
    subport(port, 0x04C0, link)
}

pub const fn cfg_llr_timeouts_1(port: u8, link: u8) -> CsrAddr {
    subport(port, 0x04E0, link)
}

pub const fn sts_llr(port: u8, link: u8) -> CsrAddr {
    subport(port, 0x0800, link)
}

pub const fn sts_llr_loop_time(port: u8, link: u8) -> CsrAddr {
    subport(port, 0x0820, link)
}

// ERR_FLG word 3
pub const fn err_flg_word3_llr_loop_time(link: u8) -> Field {
    Field::bit(8 + link as u32)
}

pub const fn err_flg_word3_llr_unexp_loop_time(link: u8) -> Field {
    Field::bit(12 + link as u32)
}

pub const fn err_flg_word3_llr_init_complete(link: u8) -> Field {
    Field::bit(16 + link as u32)
}

pub const fn regs(port: u8, link: u8) -> LlrRegs {
    LlrRegs {
        cfg_llr: cfg_llr(port),
        cfg_rx_pcs: cfg_rx_pcs(port),
        cfg_llr_cf_smac: cfg_llr_cf_smac(port),
        cfg_llr_cf_etype: cfg_llr_cf_etype(port),
        cfg_tx_pcs_subport: cfg_tx_pcs_subport(port, link),
        cfg_rx_pcs_subport: cfg_rx_pcs_subport(port, link),
        cfg_llr_cf_rates: cfg_llr_cf_rates(port, link),
        cfg_llr_subport: cfg_llr_subport(port, link),
        cfg_llr_capacity: cfg_llr_capacity(port, link),
        cfg_llr_sm: cfg_llr_sm(port, link),
        sts_llr: sts_llr(port, link),
        sts_llr_loop_time: sts_llr_loop_time(port, link),
        err_flg: err_flg(port),
        err_flg_clr: err_flg_clr(port),
    }
}
