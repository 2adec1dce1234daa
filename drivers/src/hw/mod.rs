//! Register maps for the port PML (physical media layer) LLR block.
//!
//! Field layout is shared by every generation ([`pml`]); addresses and
//! interrupt bit positions differ ([`rosetta`], [`cassini`]).

use crate::hal::csr::CsrAddr;

pub mod cassini;
pub mod pml;
pub mod rosetta;

/// Addresses of the registers one link programs.
///
/// Port-wide registers are shared by all links of one port; subport
/// registers are indexed by link. No address is shared between ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlrRegs {
    pub cfg_llr: CsrAddr,
    pub cfg_rx_pcs: CsrAddr,
    pub cfg_llr_cf_smac: CsrAddr,
    pub cfg_llr_cf_etype: CsrAddr,
    pub cfg_tx_pcs_subport: CsrAddr,
    pub cfg_rx_pcs_subport: CsrAddr,
    pub cfg_llr_cf_rates: CsrAddr,
    pub cfg_llr_subport: CsrAddr,
    pub cfg_llr_capacity: CsrAddr,
    pub cfg_llr_sm: CsrAddr,
    pub sts_llr: CsrAddr,
    pub sts_llr_loop_time: CsrAddr,
    /// First of the four error-flag words
    pub err_flg: CsrAddr,
    /// First of the four write-1-to-clear error-flag words
    pub err_flg_clr: CsrAddr,
}

impl LlrRegs {
    /// Address of error-flag word `word`.
    pub const fn err_flg_word(&self, word: usize) -> CsrAddr {
        self.err_flg + 8 * word as CsrAddr
    }

    /// Address of clear word `word`.
    pub const fn err_flg_clr_word(&self, word: usize) -> CsrAddr {
        self.err_flg_clr + 8 * word as CsrAddr
    }
}
