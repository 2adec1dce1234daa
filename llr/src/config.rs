//! Caller configuration, policy and link capabilities, and the hardware
//! settings derived from them.

use core::fmt;

use bitflags::bitflags;
use drivers::platform::{HwLinkDownBehavior, LlrRegisterConfig};

use crate::error::{LlrError, Result};

pub const LLR_CONFIG_MAGIC: u32 = 0x636c_6c72;
pub const LLR_CONFIG_VER: u32 = 1;
pub const LLR_POLICY_MAGIC: u32 = 0x636c_6c72;
pub const LLR_POLICY_VER: u32 = 1;

/// Substituted for out-of-range phase timeouts.
pub const DEFAULT_TIMEOUT_MS: u32 = 3000;
/// Longest accepted phase timeout.
pub const MAX_TIMEOUT_MS: u32 = 180_000;

/// What the link does with traffic while it is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkDownBehavior {
    #[default]
    Discard,
    Block,
    BestEffort,
}

impl LinkDownBehavior {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LinkDownBehavior::Discard => "discard",
            LinkDownBehavior::Block => "block",
            LinkDownBehavior::BestEffort => "best-effort",
        }
    }

    const fn hw(&self) -> HwLinkDownBehavior {
        match self {
            LinkDownBehavior::Discard => HwLinkDownBehavior::Discard,
            LinkDownBehavior::Block => HwLinkDownBehavior::Block,
            LinkDownBehavior::BestEffort => HwLinkDownBehavior::BestEffort,
        }
    }
}

impl fmt::Display for LinkDownBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied LLR configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlrConfig {
    pub magic: u32,
    pub ver: u32,
    pub size: u32,
    pub mode: u32,
    pub setup_timeout_ms: u32,
    pub start_timeout_ms: u32,
    pub link_dn_behavior: LinkDownBehavior,
    pub options: u32,
}

impl Default for LlrConfig {
    fn default() -> Self {
        Self {
            magic: LLR_CONFIG_MAGIC,
            ver: LLR_CONFIG_VER,
            size: core::mem::size_of::<Self>() as u32,
            mode: 0,
            setup_timeout_ms: DEFAULT_TIMEOUT_MS,
            start_timeout_ms: DEFAULT_TIMEOUT_MS,
            link_dn_behavior: LinkDownBehavior::Discard,
            options: 0,
        }
    }
}

impl LlrConfig {
    pub fn validate(&self) -> Result<()> {
        if self.magic != LLR_CONFIG_MAGIC {
            return Err(LlrError::InvalidArgument("config magic"));
        }
        if self.ver != LLR_CONFIG_VER {
            return Err(LlrError::InvalidArgument("config version"));
        }
        Ok(())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PolicyOptions: u32 {
        /// Re-arm instead of failing when a phase times out.
        const INFINITE_START_TRIES = 1 << 0;
    }
}

/// Caller-supplied retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlrPolicy {
    pub magic: u32,
    pub ver: u32,
    pub size: u32,
    pub options: PolicyOptions,
}

impl Default for LlrPolicy {
    fn default() -> Self {
        Self {
            magic: LLR_POLICY_MAGIC,
            ver: LLR_POLICY_VER,
            size: core::mem::size_of::<Self>() as u32,
            options: PolicyOptions::empty(),
        }
    }
}

impl LlrPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.magic != LLR_POLICY_MAGIC {
            return Err(LlrError::InvalidArgument("policy magic"));
        }
        if self.ver != LLR_POLICY_VER {
            return Err(LlrError::InvalidArgument("policy version"));
        }
        Ok(())
    }

    pub fn infinite_tries(&self) -> bool {
        self.options.contains(PolicyOptions::INFINITE_START_TRIES)
    }
}

/// Accepted phase timeout for `ms`, or `None` if it is out of range and
/// [`DEFAULT_TIMEOUT_MS`] must be used instead.
pub const fn checked_timeout_ms(ms: u32) -> Option<u32> {
    if ms == 0 || ms > MAX_TIMEOUT_MS {
        None
    } else {
        Some(ms)
    }
}

bitflags! {
    /// Link technologies; a link runs exactly one.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TechMap: u32 {
        const CK_400G = 1 << 0;
        const CK_200G = 1 << 1;
        const CK_100G = 1 << 2;
        const BS_200G = 1 << 3;
        const CD_100G = 1 << 4;
        const CD_50G = 1 << 5;
        const BJ_100G = 1 << 6;
    }
}

impl TechMap {
    const RATES: [(TechMap, u64); 7] = [
        (TechMap::CK_400G, 50),
        (TechMap::CK_200G, 25),
        (TechMap::CK_100G, 13),
        (TechMap::BS_200G, 25),
        (TechMap::CD_100G, 13),
        (TechMap::CD_50G, 7),
        (TechMap::BJ_100G, 13),
    ];

    /// Line rate in bytes per nanosecond; `None` unless exactly one
    /// technology is set.
    pub fn bytes_per_ns(&self) -> Option<u64> {
        if self.bits().count_ones() != 1 {
            return None;
        }
        Self::RATES.iter().find(|(tech, _)| tech == self).map(|(_, rate)| *rate)
    }
}

/// How many links share the port's replay buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Furcation {
    #[default]
    X1,
    X2,
    X4,
}

impl Furcation {
    /// Largest capacity one link may claim, in buffer quanta.
    pub const fn max_capacity(&self) -> u64 {
        match self {
            Furcation::X1 => 0x800,
            Furcation::X2 => 0x400,
            Furcation::X4 => 0x200,
        }
    }
}

/// Link properties supplied by the link layer before setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkCaps {
    pub tech_map: TechMap,
    pub furcation: Furcation,
    /// Switch-to-switch link; always gets the full buffer.
    pub fabric_link: bool,
}

impl LinkCaps {
    pub const fn new(tech_map: TechMap, furcation: Furcation, fabric_link: bool) -> Self {
        Self {
            tech_map,
            furcation,
            fabric_link,
        }
    }
}

/// Hardware parameters derived from configuration and link capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LlrSettings {
    pub regs: LlrRegisterConfig,
    pub bytes_per_ns: u64,
    pub max_cap_data: u64,
    pub max_cap_seq: u64,
    pub fabric_link: bool,
}

impl LlrSettings {
    /// Static register settings for `config`.
    pub fn from_config(config: &LlrConfig) -> Self {
        Self {
            regs: LlrRegisterConfig {
                link_down_behavior: config.link_dn_behavior.hw(),
                ..LlrRegisterConfig::default()
            },
            ..Self::default()
        }
    }

    /// Fill in the rate and capacity limits from `caps`.
    pub fn apply_link_caps(&mut self, caps: &LinkCaps) -> Result<()> {
        self.bytes_per_ns = caps
            .tech_map
            .bytes_per_ns()
            .ok_or(LlrError::InvalidArgument("tech map"))?;
        self.fabric_link = caps.fabric_link;
        if caps.fabric_link {
            self.max_cap_data = Furcation::X1.max_capacity();
            self.max_cap_seq = Furcation::X1.max_capacity();
        } else {
            self.max_cap_data = caps.furcation.max_capacity();
            self.max_cap_seq = caps.furcation.max_capacity();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tech_map_needs_exactly_one_bit() {
        assert_eq!(TechMap::CK_400G.bytes_per_ns(), Some(50));
        assert_eq!(TechMap::CD_50G.bytes_per_ns(), Some(7));
        assert_eq!(TechMap::empty().bytes_per_ns(), None);
        assert_eq!((TechMap::CK_400G | TechMap::CK_200G).bytes_per_ns(), None);
    }

    #[test]
    fn timeout_range() {
        assert_eq!(checked_timeout_ms(0), None);
        assert_eq!(checked_timeout_ms(1), Some(1));
        assert_eq!(checked_timeout_ms(MAX_TIMEOUT_MS), Some(MAX_TIMEOUT_MS));
        assert_eq!(checked_timeout_ms(MAX_TIMEOUT_MS + 1), None);
    }

    #[test]
    fn magic_and_version_checked() {
        assert!(LlrConfig::default().validate().is_ok());
        let bad = LlrConfig {
            ver: 2,
            ..LlrConfig::default()
        };
        assert_eq!(bad.validate(), Err(LlrError::InvalidArgument("config version")));
        let bad = LlrPolicy {
            magic: 0,
            ..LlrPolicy::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn link_caps_limits() {
        let mut settings = LlrSettings::from_config(&LlrConfig::default());
        settings
            .apply_link_caps(&LinkCaps::new(TechMap::BS_200G, Furcation::X4, false))
            .unwrap();
        assert_eq!(settings.bytes_per_ns, 25);
        assert_eq!(settings.max_cap_data, 0x200);

        settings
            .apply_link_caps(&LinkCaps::new(TechMap::CK_100G, Furcation::X4, true))
            .unwrap();
        assert_eq!(settings.max_cap_data, 0x800);
        assert_eq!(settings.max_cap_seq, 0x800);

        let bad = LinkCaps::new(TechMap::empty(), Furcation::X1, false);
        assert!(settings.apply_link_caps(&bad).is_err());
    }
}
