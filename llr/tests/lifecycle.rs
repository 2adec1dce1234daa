mod harness;

use std::sync::Arc;

use harness::{Harness, Recorder, setup_ok, start_ok, wait_state};
use drivers::hw::pml;
use drivers::platform::{HwLlrState, LlrIntr};
use drivers::IntrError;
use llr::{
    FailCause, Furcation, Generation, InfoMap, LinkCaps, LlrCounter, LlrDevice, LlrError, LlrState, SetupFlags,
    StopFlags, TechMap,
};

fn capacity_reg(h: &Harness, link: u8) -> (u64, u64) {
    let value = h.emu.reg(h.emu.generation().regs(0, link).cfg_llr_capacity);
    (
        pml::CFG_LLR_CAPACITY_MAX_DATA.get(value),
        pml::CFG_LLR_CAPACITY_MAX_SEQ.get(value),
    )
}

fn llr_mode(h: &Harness, grp: u8, link: u8) -> u64 {
    pml::CFG_LLR_SUBPORT_LLR_MODE.get(h.emu.reg(h.emu.generation().regs(grp, link).cfg_llr_subport))
}

#[test]
fn setup_start_stop() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.configured(1, 3000, 3000);

    let data = setup_ok(&h, &llr);
    assert_eq!(llr.state(), LlrState::Setup);
    assert_eq!(llr.info_map(), InfoMap::CONFIG | InfoMap::SETUP);
    assert!(llr.is_data_valid());
    assert_eq!(data, llr.data_get());
    assert_eq!(data.loop_time.average, 1200);
    assert_eq!(data.loop_time.min, 1200);
    assert_eq!(data.loop_time.calculated, 240);

    // 1200 ns * 50 B/ns + 2 * 9216 = 78432 bytes
    assert_eq!(capacity_reg(&h, 1), (1226, 0x800));

    assert_eq!(
        llr.setup(SetupFlags::empty(), Recorder::new().setup_callback()).unwrap_err(),
        LlrError::AlreadyInState(LlrState::Setup)
    );

    let rec = Recorder::new();
    llr.start(rec.start_callback()).unwrap();
    let events = rec.wait(1);
    assert_eq!(events[0].0, LlrState::Running);
    assert_eq!(llr.state(), LlrState::Running);
    assert!(llr.info_map().contains(InfoMap::RUNNING));
    assert!(!llr.info_map().contains(InfoMap::STARTING));

    let subport = h.emu.reg(Generation::Rosetta.regs(0, 1).cfg_llr_subport);
    assert_eq!(pml::CFG_LLR_SUBPORT_LLR_MODE.get(subport), pml::LLR_MODE_ON);
    let sm = h.emu.reg(Generation::Rosetta.regs(0, 1).cfg_llr_sm);
    assert_eq!(pml::CFG_LLR_SM_REPLAY_TIMER_MAX.get(sm), 4100);
    assert_eq!(pml::CFG_LLR_SM_REPLAY_CT_MAX.get(sm), 0xFE);

    assert_eq!(
        llr.start(Recorder::new().start_callback()).unwrap_err(),
        LlrError::AlreadyInState(LlrState::Running)
    );

    llr.stop().unwrap();
    assert_eq!(llr.state(), LlrState::Configured);
    assert_eq!(llr.info_map(), InfoMap::CONFIG);
    assert_eq!(llr.last_fail_cause().0, FailCause::COMMAND);
    assert!(llr.is_data_valid());

    let subport = h.emu.reg(Generation::Rosetta.regs(0, 1).cfg_llr_subport);
    assert_eq!(pml::CFG_LLR_SUBPORT_LLR_MODE.get(subport), pml::LLR_MODE_OFF);

    assert_eq!(llr.counter_get(LlrCounter::SetupCmd), 1);
    assert_eq!(llr.counter_get(LlrCounter::Setup), 1);
    assert_eq!(llr.counter_get(LlrCounter::StartCmd), 1);
    assert_eq!(llr.counter_get(LlrCounter::Running), 1);
    assert_eq!(llr.counter_get(LlrCounter::StopCmd), 1);

    // stopping an idle instance is a no-op
    llr.stop().unwrap();
    assert_eq!(llr.counter_get(LlrCounter::StopCmd), 1);
}

#[test]
fn phase_commands_check_state() {
    let h = Harness::new(Generation::Cassini);
    let llr = h.registry.new_llr(0, 0, 0).unwrap();

    assert_eq!(
        llr.setup(SetupFlags::empty(), Recorder::new().setup_callback()).unwrap_err(),
        LlrError::InvalidState(LlrState::New)
    );
    assert_eq!(
        llr.start(Recorder::new().start_callback()).unwrap_err(),
        LlrError::InvalidState(LlrState::New)
    );

    llr.config_set(&llr::LlrConfig::default()).unwrap();
    assert_eq!(
        llr.start(Recorder::new().start_callback()).unwrap_err(),
        LlrError::InvalidState(LlrState::Configured)
    );
}

#[test]
fn config_set_refused_while_setting_up() {
    let h = Harness::new(Generation::Cassini);
    let llr = h.configured(0, 3000, 3000);

    llr.setup(SetupFlags::empty(), Recorder::new().setup_callback()).unwrap();
    assert_eq!(llr.state(), LlrState::SettingUp);
    assert_eq!(
        llr.config_set(&llr::LlrConfig::default()).unwrap_err(),
        LlrError::InvalidState(LlrState::SettingUp)
    );
    llr.stop().unwrap();
}

#[test]
fn bad_tech_map_reverts_to_configured() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.configured(0, 3000, 3000);
    llr.link_caps_set(LinkCaps::new(TechMap::CK_400G | TechMap::CD_50G, Furcation::X1, false));

    let rec = Recorder::new();
    assert!(matches!(
        llr.setup(SetupFlags::empty(), rec.setup_callback()),
        Err(LlrError::InvalidArgument(_))
    ));
    assert_eq!(llr.state(), LlrState::Configured);
    assert_eq!(llr.last_fail_cause().0, FailCause::SETUP_CONFIG);
    assert!(llr.last_fail_cause().1.is_some());
    assert_eq!(llr.counter_get(LlrCounter::SetupFail), 1);
    assert_eq!(rec.count(), 0);
}

#[test]
fn setup_interrupt_failure_ends_setup() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.configured(0, 3000, 3000);
    h.emu.set_fail_enables(true);

    let rec = Recorder::new();
    llr.setup(SetupFlags::empty(), rec.setup_callback()).unwrap();
    let events = rec.wait(1);
    assert_eq!(events[0].0, LlrState::Configured);
    assert_eq!(llr.state(), LlrState::Configured);
    assert_eq!(llr.last_fail_cause().0, FailCause::SETUP_INTR_ENABLE);
    assert!(!llr.info_map().contains(InfoMap::SETTING_UP));
}

#[test]
fn start_interrupt_failure_returns_to_setup() {
    let h = Harness::new(Generation::Cassini);
    let llr = h.configured(0, 3000, 3000);
    setup_ok(&h, &llr);
    h.emu.set_fail_enables(true);

    let rec = Recorder::new();
    llr.start(rec.start_callback()).unwrap();
    assert_eq!(rec.wait(1)[0].0, LlrState::Setup);
    assert_eq!(llr.state(), LlrState::Setup);
    assert_eq!(llr.last_fail_cause().0, FailCause::START_INTR_ENABLE);
}

#[test]
fn zero_loop_time_readings_are_retried() {
    let h = Harness::new(Generation::Cassini);
    let llr = h.configured(0, 3000, 3000);
    h.emu.push_loop_time_readings(0, 0, [0, 0, 0, 900, 0, 1000]);
    h.emu.set_loop_time(0, 0, 1100);

    let data = setup_ok(&h, &llr);
    assert_eq!(data.loop_time.min, 900);
    assert_eq!(data.loop_time.max, 1100);
    // 900 + 1000 + 8 * 1100 = 10700
    assert_eq!(data.loop_time.average, 1070);
}

#[test]
fn furcation_and_fabric_limit_capacity() {
    let h = Harness::new(Generation::Rosetta);

    let llr = h.configured(0, 3000, 3000);
    llr.link_caps_set(LinkCaps::new(TechMap::CK_400G, Furcation::X4, false));
    setup_ok(&h, &llr);
    assert_eq!(capacity_reg(&h, 0), (0x200, 0x200));

    let fabric = h.configured(1, 3000, 3000);
    fabric.link_caps_set(LinkCaps::new(TechMap::CD_50G, Furcation::X4, true));
    setup_ok(&h, &fabric);
    assert_eq!(capacity_reg(&h, 1), (0x800, 0x800));
}

#[test]
fn reuse_timing_skips_measurement() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.configured(2, 3000, 3000);
    let source = Generation::Rosetta.intr_source(LlrIntr::SetupLoopTime, 0, 2).unwrap();

    let first = setup_ok(&h, &llr);
    assert_eq!(h.emu.enable_count(&source), 1);
    llr.stop().unwrap();
    assert_eq!(llr.state(), LlrState::Configured);

    h.emu.set_loop_time(0, 2, 5000);
    let rec = Recorder::new();
    llr.setup(SetupFlags::REUSE_TIMING, rec.setup_callback()).unwrap();
    let events = rec.wait(1);
    assert_eq!(events[0].0, LlrState::Setup);
    assert_eq!(events[0].2, first);
    assert_eq!(h.emu.enable_count(&source), 1);
}

#[test]
fn reuse_timing_needs_generation_support() {
    let h = Harness::new(Generation::Cassini);
    let llr = h.configured(0, 3000, 3000);
    let source = Generation::Cassini.intr_source(LlrIntr::SetupLoopTime, 0, 0).unwrap();

    setup_ok(&h, &llr);
    llr.stop().unwrap();

    h.emu.set_loop_time(0, 0, 2000);
    let rec = Recorder::new();
    llr.setup(SetupFlags::REUSE_TIMING, rec.setup_callback()).unwrap();
    let events = rec.wait(1);
    assert_eq!(events[0].2.loop_time.average, 2000);
    assert_eq!(h.emu.enable_count(&source), 2);
}

#[test]
fn stop_can_clear_setup_data() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.configured(0, 3000, 3000);
    setup_ok(&h, &llr);

    llr.stop_with(StopFlags::CLEAR_SETUP).unwrap();
    assert_eq!(llr.state(), LlrState::Configured);
    assert!(!llr.is_data_valid());
    assert_eq!(llr.data_get(), llr::LlrData::default());
}

#[test]
fn start_fails_when_hardware_does_not_advance() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.configured(0, 3000, 3000);
    setup_ok(&h, &llr);
    h.emu.force_llr_state(0, 0, Some(HwLlrState::Halt.raw()));

    let rec = Recorder::new();
    llr.start(rec.start_callback()).unwrap();
    assert_eq!(rec.wait(1)[0].0, LlrState::StartFail);
    assert!(wait_state(&llr, LlrState::Setup));
    assert_eq!(llr.last_fail_cause().0, FailCause::START_NOT_ADVANCING);
    assert_eq!(llr.counter_get(LlrCounter::StartFail), 1);

    // a later start can still succeed
    h.emu.force_llr_state(0, 0, None);
    let rec = Recorder::new();
    llr.start(rec.start_callback()).unwrap();
    assert_eq!(rec.wait(1)[0].0, LlrState::Running);
}

#[test]
fn callback_can_chain_start() {
    let h = Harness::new(Generation::Cassini);
    let llr = h.configured(0, 3000, 3000);
    h.emu.set_auto_respond(true);

    let rec = Recorder::new();
    let start_rec = rec.clone();
    let weak = Arc::downgrade(&llr);
    llr.setup(
        SetupFlags::empty(),
        Box::new(move |state, _, _| {
            assert_eq!(state, LlrState::Setup);
            if let Some(llr) = weak.upgrade() {
                llr.start(start_rec.start_callback()).unwrap();
            }
        }),
    )
    .unwrap();

    assert_eq!(rec.wait(1)[0].0, LlrState::Running);
    assert_eq!(llr.state(), LlrState::Running);
}

#[test]
fn stop_from_callback_runs_inline() {
    let h = Harness::new(Generation::Cassini);
    let llr = h.configured(0, 3000, 3000);
    h.emu.set_auto_respond(true);

    let rec = Recorder::new();
    let done = rec.clone();
    let weak = Arc::downgrade(&llr);
    llr.setup(
        SetupFlags::empty(),
        Box::new(move |state, info_map, data| {
            if let Some(llr) = weak.upgrade() {
                llr.stop().unwrap();
                assert_eq!(llr.state(), LlrState::Configured);
            }
            done.setup_callback()(state, info_map, data);
        }),
    )
    .unwrap();

    assert_eq!(rec.wait(1)[0].0, LlrState::Setup);
    assert_eq!(llr.state(), LlrState::Configured);
}

#[test]
fn capacity_clamps_at_furcation_limit() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.configured(0, 3000, 3000);
    llr.link_caps_set(LinkCaps::new(TechMap::CK_400G, Furcation::X4, false));

    // one quantum below, exactly at and past the 0x200 limit
    for (ns, data) in [(285, 0x1FF), (286, 0x200), (288, 0x200)] {
        h.emu.set_loop_time(0, 0, ns);
        let data_got = setup_ok(&h, &llr);
        assert_eq!(data_got.loop_time.average, ns);
        assert_eq!(capacity_reg(&h, 0), (data, 0x200), "loop time {}", ns);
        llr.stop().unwrap();
    }
}

#[test]
fn groups_on_one_device_are_independent() {
    let h = Harness::new(Generation::Rosetta);
    let a = h.configured_in(1, 2, 3000, 3000);
    let b = h.configured_in(2, 2, 3000, 3000);
    assert_eq!(h.emu.registered_count(), 6);

    h.emu.set_loop_time(1, 2, 1000);
    h.emu.set_loop_time(2, 2, 2000);
    assert_eq!(setup_ok(&h, &a).loop_time.average, 1000);
    start_ok(&h, &a);
    assert_eq!(llr_mode(&h, 1, 2), pml::LLR_MODE_ON);
    assert_eq!(llr_mode(&h, 2, 2), pml::LLR_MODE_OFF);
    assert_eq!(b.state(), LlrState::Configured);

    assert_eq!(setup_ok(&h, &b).loop_time.average, 2000);
    start_ok(&h, &b);
    assert_eq!(a.data_get().loop_time.average, 1000);

    a.stop().unwrap();
    assert_eq!(llr_mode(&h, 1, 2), pml::LLR_MODE_OFF);
    assert_eq!(llr_mode(&h, 2, 2), pml::LLR_MODE_ON);
    assert_eq!(b.state(), LlrState::Running);

    h.registry.del(0, 1, 2).unwrap();
    let source = Generation::Rosetta.intr_source(LlrIntr::SetupLoopTime, 2, 2).unwrap();
    assert!(h.emu.is_registered(&source));
    assert_eq!(h.emu.registered_count(), 3);
    assert_eq!(b.state(), LlrState::Running);
}

#[test]
fn failed_new_leaves_live_link_alone() {
    let h = Harness::new(Generation::Rosetta);
    // a second device on the same register space claims the same sources
    let twin = LlrDevice::new(1, Generation::Rosetta, h.emu.clone(), h.emu.clone()).unwrap();
    h.registry.device_add(twin).unwrap();

    let llr = h.configured(0, 3000, 3000);
    setup_ok(&h, &llr);
    start_ok(&h, &llr);
    let writes = h.emu.write_count(Generation::Rosetta.regs(0, 0).cfg_llr_subport);

    assert_eq!(
        h.registry.new_llr(1, 0, 0).unwrap_err(),
        LlrError::Interrupt(IntrError::AlreadyRegistered)
    );
    assert_eq!(llr_mode(&h, 0, 0), pml::LLR_MODE_ON);
    assert_eq!(h.emu.write_count(Generation::Rosetta.regs(0, 0).cfg_llr_subport), writes);
    assert_eq!(h.emu.registered_count(), 3);
    assert_eq!(llr.state(), LlrState::Running);
    assert_eq!(h.registry.get(1, 0, 0).unwrap_err(), LlrError::NotFound);
}

#[test]
fn stop_turns_link_off_despite_register_fault() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.configured(1, 3000, 3000);
    setup_ok(&h, &llr);
    start_ok(&h, &llr);

    let regs = Generation::Rosetta.regs(0, 1);
    h.emu.set_write_fault(regs.cfg_rx_pcs_subport, true);
    llr.stop().unwrap();

    assert_eq!(llr.state(), LlrState::Configured);
    let subport = h.emu.reg(regs.cfg_llr_subport);
    assert_eq!(pml::CFG_LLR_SUBPORT_LLR_MODE.get(subport), pml::LLR_MODE_OFF);
    assert_eq!(pml::CFG_LLR_SUBPORT_ENABLE_LOOP_TIMING.get(subport), 0);
    assert_eq!(pml::CFG_LLR_SUBPORT_LINK_DOWN_BEHAVIOR.get(subport), pml::LINK_DN_BEHAVIOR_T_LD_DISCARD);
}
