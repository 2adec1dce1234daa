mod harness;

use std::sync::Arc;

use harness::Harness;
use drivers::platform::LlrIntr;
use llr::config::MAX_TIMEOUT_MS;
use llr::{Generation, InfoMap, LlrConfig, LlrDevice, LlrError, LlrState};

#[test]
fn new_is_unique_per_key() {
    let h = Harness::new(Generation::Rosetta);

    let llr = h.registry.new_llr(0, 1, 2).unwrap();
    assert_eq!(llr.state(), LlrState::New);
    assert_eq!(llr.info_map(), InfoMap::empty());
    assert_eq!(h.registry.new_llr(0, 1, 2).unwrap_err(), LlrError::AlreadyExists);

    // same link in another group is a different instance
    assert!(h.registry.new_llr(0, 2, 2).is_ok());
    assert_eq!(h.registry.keys().len(), 2);
}

#[test]
fn get_after_del_is_not_found() {
    let h = Harness::new(Generation::Rosetta);

    assert_eq!(h.registry.get(0, 0, 0).unwrap_err(), LlrError::NotFound);
    let llr = h.registry.new_llr(0, 0, 0).unwrap();
    assert!(Arc::ptr_eq(&llr, &h.registry.get(0, 0, 0).unwrap()));

    h.registry.del(0, 0, 0).unwrap();
    assert_eq!(h.registry.get(0, 0, 0).unwrap_err(), LlrError::NotFound);
    assert_eq!(h.registry.del(0, 0, 0).unwrap_err(), LlrError::NotFound);

    // the key can be reused
    assert!(h.registry.new_llr(0, 0, 0).is_ok());
}

#[test]
fn new_checks_device_group_and_link() {
    let h = Harness::new(Generation::Cassini);

    assert_eq!(h.registry.new_llr(1, 0, 0).unwrap_err(), LlrError::NotFound);
    assert_eq!(h.registry.new_llr(0, 0, 1).unwrap_err(), LlrError::InvalidArgument("link"));
    assert_eq!(h.registry.new_llr(0, 1, 0).unwrap_err(), LlrError::InvalidArgument("group"));
    assert!(h.registry.new_llr(0, 0, 0).is_ok());
}

#[test]
fn interrupts_follow_instance_lifetime() {
    let h = Harness::new(Generation::Rosetta);
    let source = Generation::Rosetta.intr_source(LlrIntr::SetupLoopTime, 0, 3).unwrap();

    h.registry.new_llr(0, 0, 3).unwrap();
    assert_eq!(h.emu.registered_count(), 3);
    assert!(h.emu.is_registered(&source));

    h.registry.del(0, 0, 3).unwrap();
    assert_eq!(h.emu.registered_count(), 0);
    assert!(!h.emu.raise(0, 3, LlrIntr::SetupLoopTime));
}

#[test]
fn cassini_has_no_unexpected_loop_time_source() {
    let h = Harness::new(Generation::Cassini);
    h.registry.new_llr(0, 0, 0).unwrap();
    assert_eq!(h.emu.registered_count(), 2);
}

#[test]
fn device_table() {
    let h = Harness::new(Generation::Rosetta);
    let dup = LlrDevice::new(0, Generation::Rosetta, h.emu.clone(), h.emu.clone()).unwrap();
    assert_eq!(h.registry.device_add(dup).unwrap_err(), LlrError::AlreadyExists);

    h.registry.new_llr(0, 0, 0).unwrap();
    assert_eq!(h.registry.device_del(0).unwrap_err(), LlrError::Busy);
    h.registry.del(0, 0, 0).unwrap();
    h.registry.device_del(0).unwrap();
    assert!(h.registry.device(0).is_none());
    assert_eq!(h.registry.device_del(0).unwrap_err(), LlrError::NotFound);
}

#[test]
fn config_set_is_idempotent() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.registry.new_llr(0, 0, 0).unwrap();

    assert!(matches!(llr.config_get(), Err(LlrError::InvalidState(LlrState::New))));

    let config = LlrConfig::default();
    llr.config_set(&config).unwrap();
    llr.config_set(&config).unwrap();
    assert_eq!(llr.state(), LlrState::Configured);
    assert_eq!(llr.info_map(), InfoMap::CONFIG);
    assert_eq!(llr.config_get().unwrap(), config);
    assert_eq!(llr.counter_get(llr::LlrCounter::Configured), 2);
}

#[test]
fn config_rejects_bad_header() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.registry.new_llr(0, 0, 0).unwrap();

    let bad = LlrConfig {
        magic: 0x1234,
        ..LlrConfig::default()
    };
    assert!(matches!(llr.config_set(&bad), Err(LlrError::InvalidArgument(_))));
    assert_eq!(llr.state(), LlrState::New);
}

#[test]
fn config_clamps_timeouts() {
    let h = Harness::new(Generation::Rosetta);
    let llr = h.registry.new_llr(0, 0, 0).unwrap();

    llr.config_set(&LlrConfig {
        setup_timeout_ms: 0,
        start_timeout_ms: MAX_TIMEOUT_MS + 1,
        ..LlrConfig::default()
    })
    .unwrap();
    let stored = llr.config_get().unwrap();
    assert_eq!(stored.setup_timeout_ms, 3000);
    assert_eq!(stored.start_timeout_ms, 3000);

    llr.config_set(&LlrConfig {
        setup_timeout_ms: MAX_TIMEOUT_MS,
        start_timeout_ms: 1,
        ..LlrConfig::default()
    })
    .unwrap();
    let stored = llr.config_get().unwrap();
    assert_eq!(stored.setup_timeout_ms, MAX_TIMEOUT_MS);
    assert_eq!(stored.start_timeout_ms, 1);
}

#[test]
fn policy_is_validated() {
    let h = Harness::new(Generation::Cassini);
    let llr = h.registry.new_llr(0, 0, 0).unwrap();

    let policy = llr::LlrPolicy {
        options: llr::PolicyOptions::INFINITE_START_TRIES,
        ..llr::LlrPolicy::default()
    };
    llr.policy_set(&policy).unwrap();
    assert_eq!(llr.policy_get(), policy);

    let bad = llr::LlrPolicy {
        ver: 9,
        ..policy
    };
    assert!(llr.policy_set(&bad).is_err());
    assert_eq!(llr.policy_get(), policy);
}
