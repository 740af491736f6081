//! Property tests: every captured write reaches its chip once, in bus order,
//! however the engine's polling interleaves with the bus

mod common;

use common::Rig;
use proptest::prelude::*;
use sidbridge::config::index;
use sidbridge::{BridgeTimings, ChipKind, ConfigBlock, SecondChipAddress, SimulatedBus};

fn dual_chip() -> ConfigBlock {
    let mut config = ConfigBlock::defaults();
    config.set(index::SID2_TYPE, ChipKind::Mos8580 as u8);
    config.set(index::SID2_ADDRESS, SecondChipAddress::D420.config_value());
    config.seal();
    config
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn writes_reach_each_chip_in_order(
        writes in prop::collection::vec((any::<bool>(), 0u8..=0x18, any::<u8>(), 0usize..3), 1..120),
        polls in prop::collection::vec(any::<bool>(), 0..400),
    ) {
        let address = SecondChipAddress::D420;
        let mut bus = SimulatedBus::new();
        let mut expected_a = Vec::new();
        let mut expected_b = Vec::new();
        for &(second, register, value, gap) in &writes {
            if second {
                bus.write_with(address.host_lines(), register, value);
                expected_b.push((register, value));
            } else {
                bus.write_with(address.primary_lines(), register, value);
                expected_a.push((register, value));
            }
            bus.idle(gap);
        }

        let mut rig = Rig::with(bus, dual_chip(), BridgeTimings::default());
        let mut cycle = 0;
        while !rig.sampler.bus().is_exhausted() {
            rig.sampler.step();
            if polls.get(cycle).copied().unwrap_or(false) {
                rig.engine.poll();
                prop_assert!(rig.engine.emulated_cycle() <= rig.sampler.host_cycle());
            }
            cycle += 1;
        }
        rig.settle();

        prop_assert_eq!(rig.engine.chip_a().writes(), expected_a.as_slice());
        prop_assert_eq!(rig.engine.chip_b().writes(), expected_b.as_slice());
        prop_assert_eq!(rig.engine.emulated_cycle(), rig.sampler.host_cycle());
    }

    #[test]
    fn models_clocked_to_host_cycle(idle in 1usize..2000) {
        let mut bus = SimulatedBus::new();
        bus.write(0x04, 0x11).idle(idle);
        let mut rig = Rig::with(bus, dual_chip(), BridgeTimings::default());
        rig.run_script();
        rig.settle();

        let now = rig.sampler.host_cycle();
        prop_assert_eq!(rig.engine.chip_a().clocked(), now);
        prop_assert_eq!(rig.engine.chip_b().clocked(), now);
    }
}
