#![allow(dead_code)]

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use drivers::platform::emulator::LlrEmulator;
use llr::{
    Furcation, Generation, InfoMap, LinkCaps, Llr, LlrConfig, LlrData, LlrDevice, LlrRegistry, LlrState,
    SetupCallback, StartCallback, TechMap,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub emu: Arc<LlrEmulator>,
    pub registry: LlrRegistry,
}

impl Harness {
    pub fn new(generation: Generation) -> Self {
        let emu = Arc::new(LlrEmulator::new(generation));
        let registry = LlrRegistry::new();
        let device = LlrDevice::new(0, generation, emu.clone(), emu.clone()).unwrap();
        registry.device_add(device).unwrap();
        Self { emu, registry }
    }

    /// Instance on `link` of group 0, configured with the given timeouts.
    pub fn configured(&self, link: u8, setup_timeout_ms: u32, start_timeout_ms: u32) -> Arc<Llr> {
        self.configured_in(0, link, setup_timeout_ms, start_timeout_ms)
    }

    pub fn configured_in(&self, grp: u8, link: u8, setup_timeout_ms: u32, start_timeout_ms: u32) -> Arc<Llr> {
        let llr = self.registry.new_llr(0, grp, link).unwrap();
        llr.link_caps_set(LinkCaps::new(TechMap::CK_400G, Furcation::X1, false));
        llr.config_set(&LlrConfig {
            setup_timeout_ms,
            start_timeout_ms,
            ..LlrConfig::default()
        })
        .unwrap();
        llr
    }
}

/// Collects callback invocations.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<(LlrState, InfoMap, LlrData)>>,
    cond: Condvar,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, state: LlrState, info_map: InfoMap, data: LlrData) {
        self.events.lock().unwrap().push((state, info_map, data));
        self.cond.notify_all();
    }

    pub fn setup_callback(self: &Arc<Self>) -> SetupCallback {
        let rec = self.clone();
        Box::new(move |state, info_map, data| rec.push(state, info_map, data))
    }

    pub fn start_callback(self: &Arc<Self>) -> StartCallback {
        let rec = self.clone();
        Box::new(move |state, info_map| rec.push(state, info_map, LlrData::default()))
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn states(&self) -> Vec<LlrState> {
        self.events.lock().unwrap().iter().map(|e| e.0).collect()
    }

    /// Wait for at least `n` events and return them all.
    pub fn wait(&self, n: usize) -> Vec<(LlrState, InfoMap, LlrData)> {
        let deadline = Instant::now() + WAIT;
        let mut events = self.events.lock().unwrap();
        while events.len() < n {
            let now = Instant::now();
            assert!(now < deadline, "timed out waiting for {} callbacks, got {}", n, events.len());
            events = self.cond.wait_timeout(events, deadline - now).unwrap().0;
        }
        events.clone()
    }
}

pub fn wait_state(llr: &Llr, state: LlrState) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if llr.state() == state {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

/// Run start on an auto-responding emulator and wait for `Running`.
pub fn start_ok(h: &Harness, llr: &Arc<Llr>) {
    h.emu.set_auto_respond(true);
    let rec = Recorder::new();
    llr.start(rec.start_callback()).unwrap();
    assert_eq!(rec.wait(1)[0].0, LlrState::Running);
}

/// Run setup on an auto-responding emulator and wait for `Setup`.
pub fn setup_ok(h: &Harness, llr: &Arc<Llr>) -> LlrData {
    h.emu.set_auto_respond(true);
    let rec = Recorder::new();
    llr.setup(llr::SetupFlags::empty(), rec.setup_callback()).unwrap();
    let events = rec.wait(1);
    assert_eq!(events[0].0, LlrState::Setup);
    events[0].2
}
