//! In-memory LLR block.
//!
//! Models just enough of a device for the controller to run end to end
//! without silicon: a sparse register file, per-port write-1-to-clear
//! error flags, loop-time and LLR-state status registers, and a flag-word
//! interrupt controller. With auto-respond on, enabling loop timing raises
//! the loop-time interrupt and turning the engine on raises init-complete.
//! Writes to chosen registers can be made to fail.

use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::vec::Vec;

use spin::Mutex;

use super::{Generation, LlrIntr};
use crate::hal::csr::{CsrAccess, CsrAddr, CsrError};
use crate::hal::interrupt::{FlagInterruptController, INTR_FLAG_WORDS, IntrError, IntrHandler, IntrSource};
use crate::hw::{LlrRegs, pml};

/// Loop time reported when nothing was scripted.
pub const DEFAULT_LOOP_TIME_NS: u64 = 1200;

struct Registration {
    source: IntrSource,
    handler: IntrHandler,
    enabled: bool,
    enables: u32,
}

#[derive(Default)]
struct LinkModel {
    loop_time: u64,
    readings: VecDeque<u64>,
    forced_state: Option<u64>,
}

struct EmuState {
    regs: BTreeMap<CsrAddr, u64>,
    writes: BTreeMap<CsrAddr, u32>,
    flushes: BTreeMap<CsrAddr, u32>,
    write_faults: BTreeSet<CsrAddr>,
    links: Vec<LinkModel>,
    intrs: Vec<Registration>,
    auto_respond: bool,
    fail_enables: bool,
}

/// Emulated LLR-capable device, every port and link of its generation.
pub struct LlrEmulator {
    generation: Generation,
    /// Indexed by `port * max_links + link`
    link_regs: Vec<LlrRegs>,
    state: Mutex<EmuState>,
}

impl LlrEmulator {
    pub fn new(generation: Generation) -> Self {
        let max_links = generation.max_links();
        let link_regs: Vec<LlrRegs> = (0..generation.max_ports())
            .flat_map(move |port| (0..max_links).map(move |link| generation.regs(port, link)))
            .collect();
        let links = link_regs
            .iter()
            .map(|_| LinkModel {
                loop_time: DEFAULT_LOOP_TIME_NS,
                ..LinkModel::default()
            })
            .collect();

        Self {
            generation,
            link_regs,
            state: Mutex::new(EmuState {
                regs: BTreeMap::new(),
                writes: BTreeMap::new(),
                flushes: BTreeMap::new(),
                write_faults: BTreeSet::new(),
                links,
                intrs: Vec::new(),
                auto_respond: false,
                fail_enables: false,
            }),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Raise loop-time and init-complete on their own when the
    /// controller kicks the hardware.
    pub fn set_auto_respond(&self, on: bool) {
        self.state.lock().auto_respond = on;
    }

    /// Make every subsequent interrupt enable fail.
    pub fn set_fail_enables(&self, fail: bool) {
        self.state.lock().fail_enables = fail;
    }

    /// Make writes to `addr` fail with [`CsrError::DeviceGone`], or work
    /// again.
    pub fn set_write_fault(&self, addr: CsrAddr, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.write_faults.insert(addr);
        } else {
            state.write_faults.remove(&addr);
        }
    }

    fn slot(&self, port: u8, link: u8) -> Option<usize> {
        let max_links = self.generation.max_links();
        (port < self.generation.max_ports() && link < max_links)
            .then(|| port as usize * max_links as usize + link as usize)
    }

    fn with_link(&self, port: u8, link: u8, f: impl FnOnce(&mut LinkModel)) {
        if let Some(slot) = self.slot(port, link) {
            f(&mut self.state.lock().links[slot]);
        }
    }

    /// Steady-state loop time reported for `link` of `port`.
    pub fn set_loop_time(&self, port: u8, link: u8, ns: u64) {
        self.with_link(port, link, |model| model.loop_time = ns);
    }

    /// Readings returned, in order, before falling back to the steady
    /// loop time. Zero readings model "not measured yet".
    pub fn push_loop_time_readings(&self, port: u8, link: u8, readings: impl IntoIterator<Item = u64>) {
        self.with_link(port, link, |model| model.readings.extend(readings));
    }

    /// Pin the hardware LLR state of a link; `None` follows the LLR mode.
    pub fn force_llr_state(&self, port: u8, link: u8, state: Option<u64>) {
        self.with_link(port, link, |model| model.forced_state = state);
    }

    /// Current register contents (zero if never written).
    pub fn reg(&self, addr: CsrAddr) -> u64 {
        self.state.lock().regs.get(&addr).copied().unwrap_or(0)
    }

    pub fn set_reg(&self, addr: CsrAddr, value: u64) {
        self.state.lock().regs.insert(addr, value);
    }

    pub fn write_count(&self, addr: CsrAddr) -> u32 {
        self.state.lock().writes.get(&addr).copied().unwrap_or(0)
    }

    pub fn flush_count(&self, addr: CsrAddr) -> u32 {
        self.state.lock().flushes.get(&addr).copied().unwrap_or(0)
    }

    pub fn is_registered(&self, source: &IntrSource) -> bool {
        self.state.lock().intrs.iter().any(|r| r.source == *source)
    }

    pub fn registered_count(&self) -> usize {
        self.state.lock().intrs.len()
    }

    pub fn is_enabled(&self, source: &IntrSource) -> bool {
        self.state.lock().intrs.iter().any(|r| r.source == *source && r.enabled)
    }

    /// Number of disabled-to-enabled transitions of a source.
    pub fn enable_count(&self, source: &IntrSource) -> u32 {
        self.state
            .lock()
            .intrs
            .iter()
            .find(|r| r.source == *source)
            .map_or(0, |r| r.enables)
    }

    /// Latch `intr` of `link` on `port` and run its handler if enabled.
    pub fn raise(&self, port: u8, link: u8, intr: LlrIntr) -> bool {
        match self.generation.intr_source(intr, port, link) {
            Some(source) => self.raise_source(&source),
            None => false,
        }
    }

    /// Latch the flag words of `source` in its port's error-flag block and
    /// run every enabled matching handler.
    ///
    /// Returns `true` if at least one handler ran. Handlers are called
    /// with the emulator unlocked.
    pub fn raise_source(&self, source: &IntrSource) -> bool {
        let handlers: Vec<IntrHandler> = {
            let mut state = self.state.lock();
            if let Some(regs) = self.slot(source.port, 0).map(|slot| self.link_regs[slot]) {
                for (word, bits) in source.flags.iter().enumerate() {
                    *state.regs.entry(regs.err_flg_word(word)).or_insert(0) |= bits;
                }
            }
            state
                .intrs
                .iter()
                .filter(|r| r.enabled && r.source.matches(source.port, &source.flags))
                .map(|r| r.handler.clone())
                .collect()
        };

        for handler in &handlers {
            handler(&source.flags);
        }
        !handlers.is_empty()
    }

    fn slot_of(&self, pick: impl Fn(&LlrRegs) -> CsrAddr, addr: CsrAddr) -> Option<usize> {
        self.link_regs.iter().position(|regs| pick(regs) == addr)
    }

    /// Error-flag word cleared by a write to `addr`, if it is a clear word.
    fn err_flg_cleared_by(&self, addr: CsrAddr) -> Option<CsrAddr> {
        let max_links = self.generation.max_links().max(1) as usize;
        self.link_regs.iter().step_by(max_links).find_map(|regs| {
            (0..INTR_FLAG_WORDS)
                .find(|&word| regs.err_flg_clr_word(word) == addr)
                .map(|word| regs.err_flg_word(word))
        })
    }

    fn port_link(&self, slot: usize) -> (u8, u8) {
        let max_links = self.generation.max_links() as usize;
        ((slot / max_links) as u8, (slot % max_links) as u8)
    }
}

impl CsrAccess for LlrEmulator {
    fn read64(&self, addr: CsrAddr) -> Result<u64, CsrError> {
        if addr % 8 != 0 {
            return Err(CsrError::Unaligned(addr));
        }

        let mut state = self.state.lock();

        if let Some(slot) = self.slot_of(|r| r.sts_llr_loop_time, addr) {
            let model = &mut state.links[slot];
            let ns = model.readings.pop_front().unwrap_or(model.loop_time);
            return Ok(pml::STS_LLR_LOOP_TIME_LOOP_TIME.set(ns));
        }

        if let Some(slot) = self.slot_of(|r| r.sts_llr, addr) {
            let subport = state.regs.get(&self.link_regs[slot].cfg_llr_subport).copied().unwrap_or(0);
            let raw = state.links[slot].forced_state.unwrap_or(
                if pml::CFG_LLR_SUBPORT_LLR_MODE.get(subport) == pml::LLR_MODE_ON {
                    pml::LLR_STATE_T_ADVANCE
                } else {
                    pml::LLR_STATE_T_OFF
                },
            );
            return Ok(pml::STS_LLR_LLR_STATE.set(raw));
        }

        Ok(state.regs.get(&addr).copied().unwrap_or(0))
    }

    fn write64(&self, addr: CsrAddr, value: u64) -> Result<(), CsrError> {
        if addr % 8 != 0 {
            return Err(CsrError::Unaligned(addr));
        }

        let mut raise: Vec<(u8, u8, LlrIntr)> = Vec::new();
        {
            let mut state = self.state.lock();
            if state.write_faults.contains(&addr) {
                return Err(CsrError::DeviceGone);
            }
            *state.writes.entry(addr).or_insert(0) += 1;

            if let Some(flags) = self.err_flg_cleared_by(addr) {
                *state.regs.entry(flags).or_insert(0) &= !value;
                return Ok(());
            }

            let old = state.regs.insert(addr, value).unwrap_or(0);

            if state.auto_respond {
                if let Some(slot) = self.slot_of(|r| r.cfg_llr_subport, addr) {
                    let (port, link) = self.port_link(slot);
                    let timing = pml::CFG_LLR_SUBPORT_ENABLE_LOOP_TIMING;
                    let mode = pml::CFG_LLR_SUBPORT_LLR_MODE;
                    if timing.get(old) == 0 && timing.get(value) == 1 {
                        raise.push((port, link, LlrIntr::SetupLoopTime));
                    }
                    if mode.get(old) != pml::LLR_MODE_ON && mode.get(value) == pml::LLR_MODE_ON {
                        raise.push((port, link, LlrIntr::StartInitComplete));
                    }
                }
            }
        }

        for (port, link, intr) in raise {
            log::debug!(
                "{} emulator: auto raise {} (port = {}, link = {})",
                self.generation,
                intr.as_str(),
                port,
                link
            );
            self.raise(port, link, intr);
        }
        Ok(())
    }

    // Writes land immediately; a dummy read would consume scripted readings.
    fn flush64(&self, addr: CsrAddr) -> Result<(), CsrError> {
        if addr % 8 != 0 {
            return Err(CsrError::Unaligned(addr));
        }
        *self.state.lock().flushes.entry(addr).or_insert(0) += 1;
        Ok(())
    }
}

impl FlagInterruptController for LlrEmulator {
    fn register(&self, source: &IntrSource, handler: IntrHandler) -> Result<(), IntrError> {
        let mut state = self.state.lock();
        if state.intrs.iter().any(|r| r.source == *source) {
            return Err(IntrError::AlreadyRegistered);
        }
        state.intrs.push(Registration {
            source: *source,
            handler,
            enabled: false,
            enables: 0,
        });
        Ok(())
    }

    fn unregister(&self, source: &IntrSource) -> Result<(), IntrError> {
        let mut state = self.state.lock();
        let before = state.intrs.len();
        state.intrs.retain(|r| r.source != *source);
        if state.intrs.len() == before {
            return Err(IntrError::NotRegistered);
        }
        Ok(())
    }

    fn enable(&self, source: &IntrSource) -> Result<(), IntrError> {
        let mut state = self.state.lock();
        if state.fail_enables {
            return Err(IntrError::Hardware);
        }
        let reg = state
            .intrs
            .iter_mut()
            .find(|r| r.source == *source)
            .ok_or(IntrError::NotRegistered)?;
        if !reg.enabled {
            reg.enabled = true;
            reg.enables += 1;
        }
        Ok(())
    }

    fn disable(&self, source: &IntrSource) -> Result<(), IntrError> {
        let mut state = self.state.lock();
        let reg = state
            .intrs
            .iter_mut()
            .find(|r| r.source == *source)
            .ok_or(IntrError::NotRegistered)?;
        reg.enabled = false;
        Ok(())
    }
}
