//! Shared rig for the integration tests: a bus sampler on a scripted bus
//! wired to an engine with recording chip models.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use sidbridge::{
    assemble_with_timings, BridgeImages, BridgeTimings, BusSampler, ConfigBlock, EmulationEngine,
    MemoryStore, NullChip, NullFm, SharedStore, SimulatedBus, VecSink,
};

/// Launcher: load address $C000, code `LDX #0; RTS`
pub const LAUNCHER: [u8; 5] = [0x00, 0xC0, 0xA2, 0x00, 0x60];
/// Configuration tool: load address $0801, two NOPs
pub const CONFIG_TOOL: [u8; 4] = [0x01, 0x08, 0xEA, 0xEA];

pub struct Rig {
    pub sampler: BusSampler<SimulatedBus>,
    pub engine: EmulationEngine<NullChip, NullFm, VecSink>,
    pub store: SharedStore,
}

impl Rig {
    pub fn new(bus: SimulatedBus) -> Self {
        Self::with(bus, ConfigBlock::defaults(), BridgeTimings::default())
    }

    pub fn with(bus: SimulatedBus, config: ConfigBlock, timings: BridgeTimings) -> Self {
        Self::with_images(bus, config, timings, BridgeImages::new(LAUNCHER.to_vec(), CONFIG_TOOL.to_vec()))
    }

    pub fn with_images(
        bus: SimulatedBus,
        config: ConfigBlock,
        timings: BridgeTimings,
        images: BridgeImages,
    ) -> Self {
        let store: SharedStore = Arc::new(Mutex::new(MemoryStore::with_config(&config)));
        let (sampler, engine) = assemble_with_timings(
            bus,
            NullChip::default(),
            NullChip::default(),
            NullFm::default(),
            VecSink::new(),
            Arc::clone(&store),
            images,
            timings,
        )
        .expect("rig assembles");
        Rig {
            sampler,
            engine,
            store,
        }
    }

    /// Step the sampler through every scripted cycle
    pub fn run_script(&mut self) {
        while !self.sampler.bus().is_exhausted() {
            self.sampler.step();
        }
    }

    /// Step the sampler `n` host cycles
    pub fn step(&mut self, n: usize) {
        for _ in 0..n {
            self.sampler.step();
        }
    }

    /// Poll the engine until it has caught up with the sampler
    pub fn settle(&mut self) {
        for _ in 0..10_000 {
            self.engine.poll();
            if self.engine.emulated_cycle() >= self.sampler.host_cycle() {
                self.engine.poll();
                return;
            }
        }
    }

    /// Byte the bridge drove in answer to script cycle `cycle`
    pub fn response(&self, cycle: usize) -> Option<u8> {
        self.sampler.bus().response_at(cycle)
    }
}

/// Script the three redirect reads that hand the bus to TRANSFER
pub fn redirect_reads(bus: &mut SimulatedBus) {
    bus.read(0x1D).read(0x1E).read(0x1F);
}

/// Bytes driven for reads of `register`, in order
pub fn driven_for(bus: &SimulatedBus, register: u8) -> Vec<u8> {
    bus.driven()
        .iter()
        .filter(|d| d.address == register)
        .map(|d| d.value)
        .collect()
}
