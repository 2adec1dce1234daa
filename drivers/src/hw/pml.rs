//! PML register field layout.

use common::reg::Field;

// CFG_LLR (port)
pub const CFG_LLR_SIZE: Field = Field::new(0, 2);
pub const CFG_LLR_ACK_NACK_ERR_CHECK: Field = Field::bit(4);
pub const CFG_LLR_PREAMBLE_SEQ_CHECK: Field = Field::bit(5);

// CFG_RX_PCS (port)
pub const CFG_RX_PCS_RESTART_LOCK_ON_BAD_CWS: Field = Field::bit(2);
pub const CFG_RX_PCS_RESTART_LOCK_ON_BAD_AMS: Field = Field::bit(3);

// CFG_LLR_CF_SMAC / CFG_LLR_CF_ETYPE (port)
pub const CFG_LLR_CF_SMAC_CTL_FRAME_SMAC: Field = Field::new(0, 48);
pub const CFG_LLR_CF_ETYPE_CTL_FRAME_ETHERTYPE: Field = Field::new(0, 16);

// CFG_{TX,RX}_PCS_SUBPORT
pub const CFG_PCS_SUBPORT_ENABLE_CTL_OS: Field = Field::bit(4);

// CFG_LLR_CF_RATES
pub const CFG_LLR_CF_RATES_LOOP_TIMING_PERIOD: Field = Field::new(0, 32);

// CFG_LLR_SUBPORT
pub const CFG_LLR_SUBPORT_ENABLE_LOOP_TIMING: Field = Field::bit(0);
pub const CFG_LLR_SUBPORT_LLR_MODE: Field = Field::new(1, 2);
pub const CFG_LLR_SUBPORT_LINK_DOWN_BEHAVIOR: Field = Field::new(4, 2);
pub const CFG_LLR_SUBPORT_FILTER_LOSSLESS_WHEN_OFF: Field = Field::bit(8);
pub const CFG_LLR_SUBPORT_FILTER_CTL_FRAMES: Field = Field::bit(9);
pub const CFG_LLR_SUBPORT_MAX_STARVATION_LIMIT: Field = Field::new(16, 16);

// CFG_LLR_CAPACITY
pub const CFG_LLR_CAPACITY_MAX_DATA: Field = Field::new(0, 12);
pub const CFG_LLR_CAPACITY_MAX_SEQ: Field = Field::new(16, 12);

// CFG_LLR_SM
pub const CFG_LLR_SM_RETRY_THRESHOLD: Field = Field::new(0, 8);
pub const CFG_LLR_SM_ALLOW_RE_INIT: Field = Field::bit(8);
pub const CFG_LLR_SM_REPLAY_CT_MAX: Field = Field::new(16, 8);
pub const CFG_LLR_SM_REPLAY_TIMER_MAX: Field = Field::new(32, 16);

// CFG_LLR_TIMEOUTS*
pub const CFG_LLR_TIMEOUTS_PCS_LINK_DN_TIMER_MAX: Field = Field::new(0, 32);
pub const CFG_LLR_TIMEOUTS_DATA_AGE_TIMER_MAX: Field = Field::new(32, 32);
pub const CFG_LLR_TIMEOUTS_1_DATA_AGE_TIMER_MAX: Field = Field::new(0, 32);

// STS_LLR / STS_LLR_LOOP_TIME
pub const STS_LLR_LLR_STATE: Field = Field::new(0, 3);
pub const STS_LLR_LOOP_TIME_LOOP_TIME: Field = Field::new(0, 32);

// LLR_MODE values
pub const LLR_MODE_OFF: u64 = 0;
pub const LLR_MODE_ON: u64 = 2;

// LINK_DN_BEHAVIOR_T
pub const LINK_DN_BEHAVIOR_T_LD_DISCARD: u64 = 0;
pub const LINK_DN_BEHAVIOR_T_LD_BLOCK: u64 = 1;
pub const LINK_DN_BEHAVIOR_T_LD_BEST_EFFORT: u64 = 2;

// LLR_STATE_T
pub const LLR_STATE_T_OFF: u64 = 0;
pub const LLR_STATE_T_INIT: u64 = 1;
pub const LLR_STATE_T_ADVANCE: u64 = 2;
pub const LLR_STATE_T_HALT: u64 = 3;
pub const LLR_STATE_T_REPLAY: u64 = 4;
pub const LLR_STATE_T_DISCARD: u64 = 5;

/// Reset value of the loop timing period.
pub const LOOP_TIMING_PERIOD: u64 = 1000;
/// Matches the replay timer reset value.
pub const MAX_STARVATION_LIMIT: u64 = 1550;
pub const PCS_LINK_DN_TIMER_MAX: u64 = 0x389A_CA00;
pub const DATA_AGE_TIMER_MAX: u64 = 0xEE6B_2800;
