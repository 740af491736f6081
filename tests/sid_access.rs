//! SID communication: register routing, readback, open bus, auto-detect,
//! DAC passthrough, FM routing, digi injection and reset supervision

mod common;

use common::Rig;
use sidbridge::config::index;
use sidbridge::{
    BridgeTimings, BusLines, ChipKind, ConfigBlock, ConfigStore, DacMode, RebootKind,
    SecondChipAddress, SimulatedBus, StereoFrame, Technique,
};

fn sealed(edits: &[(usize, u8)]) -> ConfigBlock {
    let mut config = ConfigBlock::defaults();
    for &(i, v) in edits {
        config.set(i, v);
    }
    config.seal();
    config
}

fn dual_chip(address: SecondChipAddress) -> ConfigBlock {
    sealed(&[
        (index::SID2_TYPE, ChipKind::Mos8580 as u8),
        (index::SID2_ADDRESS, address.config_value()),
    ])
}

#[test]
fn second_chip_routed_at_every_address() {
    for address in SecondChipAddress::ALL {
        let mut bus = SimulatedBus::new();
        bus.write_with(address.primary_lines(), 0x04, 0x11)
            .write_with(address.host_lines(), 0x04, 0x22);
        let mut rig = Rig::with(bus, dual_chip(address), BridgeTimings::default());
        rig.run_script();
        rig.settle();

        let (a, b) = (rig.engine.chip_a().writes(), rig.engine.chip_b().writes());
        if address == SecondChipAddress::Mirror {
            assert_eq!(a, &[(0x04, 0x11), (0x04, 0x22)], "{address:?}");
            assert_eq!(b, a, "{address:?}");
        } else {
            assert_eq!(a, &[(0x04, 0x11)], "{address:?}");
            assert_eq!(b, &[(0x04, 0x22)], "{address:?}");
        }
    }
}

#[test]
fn single_chip_ignores_second_address() {
    let mut bus = SimulatedBus::new();
    bus.write_with(BusLines::CHIP_SELECT | BusLines::A8, 0x04, 0x11);
    let mut rig = Rig::new(bus);
    rig.run_script();
    rig.settle();

    assert_eq!(rig.engine.chip_a().writes(), &[(0x04, 0x11)]);
    assert!(rig.engine.chip_b().writes().is_empty());
}

#[test]
fn write_only_registers_read_open_bus_until_decay() {
    let timings = BridgeTimings {
        open_bus_ttl: 5,
        ..BridgeTimings::default()
    };
    let mut bus = SimulatedBus::new();
    bus.write(0x05, 0x42).read(0x00).idle(10).read(0x00);
    let mut rig = Rig::with(bus, ConfigBlock::defaults(), timings);
    rig.run_script();

    assert_eq!(rig.response(1), Some(0x42));
    assert_eq!(rig.response(12), Some(0x00));
}

#[test]
fn readback_registers_bypass_open_bus() {
    let mut bus = SimulatedBus::new();
    bus.write(0x05, 0x42).read(0x1B).read(0x1C).read(0x00);
    let mut rig = Rig::new(bus);
    rig.run_script();

    assert_eq!(rig.response(1), Some(0x00));
    assert_eq!(rig.response(2), Some(0x00));
    assert_eq!(rig.response(3), Some(0x42));
}

/// Arm the probe and read the oscillator register twice
fn probe() -> SimulatedBus {
    let mut bus = SimulatedBus::new();
    bus.write(0x0E, 0xFF)
        .write(0x0F, 0xFF)
        .write(0x12, 0xFF)
        .write(0x12, 0x20)
        .read(0x1B)
        .read(0x1B);
    bus
}

#[test]
fn auto_detect_answers_configured_model() {
    let mut rig = Rig::new(probe());
    rig.run_script();
    assert_eq!(rig.response(4), Some(2));
    assert_eq!(rig.response(5), Some(0));

    let config = sealed(&[(index::SID1_TYPE, ChipKind::Mos6581 as u8)]);
    let mut rig = Rig::with(probe(), config, BridgeTimings::default());
    rig.run_script();
    assert_eq!(rig.response(4), Some(3));
}

#[test]
fn auto_detect_needs_noise_setup() {
    let mut bus = SimulatedBus::new();
    bus.write(0x0E, 0x10).write(0x0F, 0xFF).write(0x12, 0xFF).write(0x12, 0x20).read(0x1B);
    let mut rig = Rig::new(bus);
    rig.run_script();
    assert_eq!(rig.response(4), Some(0));
}

#[test]
fn dac_mode_bypasses_chip_models() {
    let mut bus = SimulatedBus::new();
    bus.write(0x1F, 0xFC).write(0x18, 0xC0).write(0x04, 0x11);
    let mut rig = Rig::new(bus);
    rig.run_script();

    let shared = rig.sampler.shared().clone();
    assert_eq!(shared.dac_mode(), DacMode::Mono8);
    assert_eq!(shared.dac_latch(), (64 << 7, 64 << 7));

    rig.settle();
    shared.request_sample();
    rig.engine.poll();
    assert_eq!(
        rig.engine.sink().frames().last(),
        Some(&StereoFrame::new(8192, 8192))
    );
    assert!(rig.engine.chip_a().writes().is_empty());
    assert_eq!(rig.engine.chip_a().clocked(), 0);

    rig.sampler.bus_mut().write(0x1F, 0xFA).write(0x04, 0x22);
    rig.run_script();
    rig.settle();
    assert_eq!(shared.dac_mode(), DacMode::Off);
    assert_eq!(rig.engine.chip_a().writes(), &[(0x04, 0x22)]);
}

#[test]
fn stereo_dac_latches_both_channels() {
    let mut bus = SimulatedBus::new();
    bus.write(0x1F, 0xFB).write(0x18, 0x00).write(0x19, 0xFF);
    let mut rig = Rig::new(bus);
    rig.run_script();

    assert_eq!(rig.sampler.shared().dac_latch(), (-128 << 7, 127 << 7));
}

#[test]
fn reboot_sentinel_only_in_mono_dac() {
    let mut bus = SimulatedBus::new();
    bus.write(0x1F, 0xF9);
    let mut rig = Rig::new(bus);
    rig.run_script();
    assert_eq!(rig.engine.poll(), None);

    rig.sampler.bus_mut().write(0x1F, 0xFC).write(0x1F, 0xF9);
    rig.run_script();
    assert_eq!(rig.engine.poll(), Some(RebootKind::Soft));
}

#[test]
fn fm_writes_reach_fm_model() {
    let config = sealed(&[
        (index::SID2_TYPE, ChipKind::Fm as u8),
        (index::SID2_ADDRESS, SecondChipAddress::D420.config_value()),
    ]);
    let fm = BusLines::CHIP_SELECT | BusLines::A5;
    let mut bus = SimulatedBus::new();
    bus.write_with(fm, 0x00, 0x20).write_with(fm, 0x10, 0x71).write(0x04, 0x11);
    let mut rig = Rig::with(bus, config, BridgeTimings::default());
    rig.run_script();
    rig.settle();

    assert_eq!(rig.engine.fm().writes(), &[(0, 0x20), (1, 0x71)]);
    assert!(rig.engine.chip_b().writes().is_empty());
    assert_eq!(rig.engine.chip_a().writes(), &[(0x04, 0x11)]);
    assert_eq!(rig.engine.chip_b().clocked(), 0);
}

#[test]
fn fm_status_reads_alternate() {
    let config = sealed(&[
        (index::SID2_TYPE, ChipKind::FmWithStatus as u8),
        (index::SID2_ADDRESS, SecondChipAddress::D420.config_value()),
    ]);
    let fm = BusLines::CHIP_SELECT | BusLines::A5;
    let mut bus = SimulatedBus::new();
    bus.read_with(fm, 0x00)
        .read_with(fm, 0x00)
        .read_with(fm, 0x00)
        .read_with(fm, 0x01);
    let mut rig = Rig::with(bus, config, BridgeTimings::default());
    rig.run_script();

    assert_eq!(rig.sampler.bus().driven_values(), vec![0x00, 0xC0, 0x00, 0xFF]);
}

#[test]
fn fm_sample_trick_latches_values() {
    let config = sealed(&[
        (index::SID2_TYPE, ChipKind::Fm as u8),
        (index::SID2_ADDRESS, SecondChipAddress::D420.config_value()),
    ]);
    let fm = BusLines::CHIP_SELECT | BusLines::A5;
    let mut bus = SimulatedBus::new();
    bus.write_with(fm, 0x00, 0x01)
        .write_with(fm, 0x10, 0x04)
        .write_with(fm, 0x00, 0xA0)
        .write_with(fm, 0x10, 0x40)
        .write_with(fm, 0x00, 0xA1)
        .write_with(fm, 0x10, 0x20);
    let mut rig = Rig::with(bus, config, BridgeTimings::default());
    rig.run_script();

    assert_eq!(rig.sampler.shared().fm_hack(), (128 | 3, [0x40, 0x20]));
}

#[test]
fn test_bit_digi_forces_voice_output() {
    let config = sealed(&[(index::DIGIDETECT, 1)]);
    let mut bus = SimulatedBus::new();
    bus.write(0x04, 0x11)
        .idle(10)
        .write(0x04, 0x09)
        .idle(2)
        .write(0x04, 0x01)
        .write(0x00, 0x5A);
    let mut rig = Rig::with(bus, config, BridgeTimings::default());
    rig.run_script();
    rig.settle();

    let expected = (((0x5A - 128) << 8) & !3) | Technique::TestBit.id() as i32;
    assert_eq!(rig.engine.chip_a().forced(), [expected, 0, 0]);
    assert_eq!(rig.engine.chip_a().writes().len(), 4);
}

#[test]
fn digi_detection_off_by_default() {
    let mut bus = SimulatedBus::new();
    bus.write(0x04, 0x11).write(0x04, 0x09).write(0x04, 0x01).write(0x00, 0x5A);
    let mut rig = Rig::new(bus);
    rig.run_script();
    rig.settle();

    assert_eq!(rig.engine.chip_a().forced(), [0, 0, 0]);
}

fn reset_timings() -> BridgeTimings {
    BridgeTimings {
        reset_fade_after: 4,
        soft_reset_after: 20,
        timing_change_after: 50,
        factory_reset_after: 100,
        ..BridgeTimings::default()
    }
}

fn hold(cycles: usize) -> Rig {
    let mut bus = SimulatedBus::new();
    bus.hold_reset(cycles).idle(1);
    let mut rig = Rig::with(bus, ConfigBlock::defaults(), reset_timings());
    rig.run_script();
    rig
}

#[test]
fn short_reset_pulse_is_ignored() {
    let mut rig = hold(10);
    assert!(rig.sampler.shared().take_fade_out());
    assert_eq!(rig.engine.poll(), None);
}

#[test]
fn fade_requested_on_every_held_cycle() {
    let mut bus = SimulatedBus::new();
    bus.hold_reset(10);
    let mut rig = Rig::with(bus, ConfigBlock::defaults(), reset_timings());
    rig.step(4);
    assert!(!rig.sampler.shared().take_fade_out());
    for _ in 0..6 {
        rig.step(1);
        assert!(rig.sampler.shared().take_fade_out());
    }
}

#[test]
fn held_reset_requests_soft_reboot() {
    let mut rig = hold(25);
    assert_eq!(rig.engine.poll(), Some(RebootKind::Soft));
    let stored = rig.store.lock().load_config_bytes().unwrap();
    assert_eq!(ConfigBlock::from_bytes(stored), ConfigBlock::defaults());
}

#[test]
fn long_reset_advances_timing_preset() {
    let mut rig = hold(60);
    assert_eq!(rig.engine.poll(), Some(RebootKind::TimingChange));

    let stored = ConfigBlock::validated(rig.store.lock().load_config_bytes().unwrap()).unwrap();
    assert_eq!(stored.get(index::USE_TIMINGS), 1);
    assert_eq!(stored.get(index::CUSTOM_TIMING_READBUS), 7);
    assert_eq!(stored.get(index::CUSTOM_TIMING_PHI2), 11);
}

#[test]
fn very_long_reset_restores_factory_defaults() {
    let mut rig = hold(120);
    assert_eq!(rig.engine.poll(), Some(RebootKind::FactoryReset));

    let stored = rig.store.lock().load_config_bytes().unwrap();
    assert_eq!(ConfigBlock::from_bytes(stored), ConfigBlock::factory_reset());
}
