//! Bus Sampler & Protocol State Machine
//!
//! The bus sampler services the host bus twice per host cycle. Every
//! [`BusSampler::step`] is one host cycle:
//!
//! 1. wait for the low half-cycle, release the data lines driven in the
//!    previous cycle, run the per-cycle bookkeeping (host cycle counter,
//!    sample cadence, open-bus decay) and the mode's low-phase work;
//! 2. wait for the high half-cycle, let the signals settle for the
//!    calibrated phi2 delay, sample the bus and hand the access to the
//!    handler of the current [`BridgeMode`].
//!
//! The three handlers live in their own modules: [`sid`] (chip emulation,
//! the default), [`transfer`] (program injection) and [`configure`]
//! (device configuration).

mod configure;
mod decode;
mod program;
mod sid;
mod transfer;

pub use decode::decode_chip;

use std::sync::Arc;

use crate::bus::{BusPort, BusSnapshot, Phase};
use crate::config::{BusDelays, BusSettings};
use crate::digi::DigiDetector;
use crate::paddle::PaddleSampler;
use crate::queue::QueueProducer;
use crate::shared::SharedState;
use crate::store::SharedStore;
use crate::timing::{BridgeTimings, SampleCadence};
use crate::{BridgeError, Result};

use configure::ConfigSession;
use program::ProgramBuffer;
use sid::{FmBusState, ResetSupervisor};
use transfer::TransferState;

/// Redirect budget restored by reset, CONFIGURATION and launches
const LAUNCH_BUDGET: u8 = 2;

/// Active protocol on the 32-register window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMode {
    /// Normal chip emulation
    SidCommunication,
    /// Serving the bootstrap loader and a program to the host CPU
    Transfer,
    /// Streaming and editing the configuration
    Configuration,
}

/// Program images served in TRANSFER mode
///
/// Both images start with their 2-byte little-endian load address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeImages {
    launcher: Vec<u8>,
    config_tool: Vec<u8>,
}

impl BridgeImages {
    /// Launcher and configuration tool
    pub fn new(launcher: Vec<u8>, config_tool: Vec<u8>) -> Self {
        BridgeImages {
            launcher,
            config_tool,
        }
    }

    /// Launcher image
    pub fn launcher(&self) -> &[u8] {
        &self.launcher
    }

    /// Configuration tool image
    pub fn config_tool(&self) -> &[u8] {
        &self.config_tool
    }

    /// Launcher load address
    pub fn launcher_address(&self) -> u16 {
        load_address(&self.launcher)
    }

    fn validate(&self) -> Result<()> {
        if self.launcher.len() < 3 {
            return Err(BridgeError::InvalidArgument(format!(
                "launcher image needs a load address and code, got {} bytes",
                self.launcher.len()
            )));
        }
        if self.config_tool.len() < 3 || self.config_tool.len() > crate::constants::PROGRAM_BUFFER_SIZE
        {
            return Err(BridgeError::PayloadSize(format!(
                "configuration tool image of {} bytes",
                self.config_tool.len()
            )));
        }
        Ok(())
    }
}

/// Little-endian load address at the start of a program image
fn load_address(image: &[u8]) -> u16 {
    u16::from_le_bytes([
        image.first().copied().unwrap_or(0),
        image.get(1).copied().unwrap_or(0),
    ])
}

/// Bus-side real-time loop
pub struct BusSampler<B: BusPort> {
    bus: B,
    producer: QueueProducer,
    shared: Arc<SharedState>,
    store: SharedStore,
    images: BridgeImages,
    timings: BridgeTimings,
    stored_delays: BusDelays,
    settings: BusSettings,

    mode: BridgeMode,
    /// Cycles left before TRANSFER/CONFIGURATION falls back
    mode_timer: i32,
    host_cycle: u64,
    cadence: SampleCadence,
    driving: bool,

    open_bus: u8,
    open_bus_ttl: u32,
    launch_budget: u8,
    redirect_reads: u8,

    reset: ResetSupervisor,
    fm: FmBusState,
    digi: DigiDetector,
    paddle: PaddleSampler,
    transfer: TransferState,
    session: ConfigSession,
    program: ProgramBuffer,
}

impl<B: BusPort> BusSampler<B> {
    /// Create the sampler in SID communication mode
    ///
    /// # Arguments
    ///
    /// * `bus` - Host bus binding
    /// * `producer` - Producer half of the command queue
    /// * `shared` - State shared with the emulation engine
    /// * `store` - Persistence collaborator (locked only at parked points)
    /// * `images` - Launcher and configuration tool images
    /// * `timings` - Calibrated cycle windows
    /// * `stored_delays` - Bus delays persisted by the last calibration
    ///
    /// # Errors
    ///
    /// Returns an error if an image is too short or does not fit the
    /// program buffer.
    pub fn new(
        bus: B,
        producer: QueueProducer,
        shared: Arc<SharedState>,
        store: SharedStore,
        images: BridgeImages,
        timings: BridgeTimings,
        stored_delays: BusDelays,
    ) -> Result<Self> {
        images.validate()?;

        let config = shared.config();
        let settings = config.bus_settings(stored_delays);
        let registers = shared.registers();
        for reg in [0x19, 0x1A, 0x1B, 0x1C] {
            registers.store(crate::registers::ChipId::A, reg, 0);
            registers.store(crate::registers::ChipId::B, reg, 0);
        }

        let mut sampler = BusSampler {
            bus,
            producer,
            shared,
            store,
            transfer: TransferState::new(&images),
            program: ProgramBuffer::new(images.config_tool()),
            images,
            timings,
            stored_delays,
            settings,
            mode: BridgeMode::SidCommunication,
            mode_timer: 0,
            host_cycle: 0,
            cadence: SampleCadence::new(config.host_clock()),
            driving: false,
            open_bus: 0,
            open_bus_ttl: 0,
            launch_budget: LAUNCH_BUDGET,
            redirect_reads: 0,
            reset: ResetSupervisor::default(),
            fm: FmBusState::default(),
            digi: DigiDetector::new(&timings),
            paddle: PaddleSampler::new(),
            session: ConfigSession::new(config),
        };
        sampler.enter_sid_communication();
        Ok(sampler)
    }

    /// Service the bus forever
    pub fn run(&mut self) -> ! {
        loop {
            self.step();
        }
    }

    /// Service one host cycle
    pub fn step(&mut self) {
        let low = self.bus.wait_for_phase(Phase::Low);
        let released = self.release_data();

        if self.mode == BridgeMode::SidCommunication && released && self.redirect_reads == 3 {
            self.enter_transfer();
        }

        self.advance_host_cycle();
        if self.mode == BridgeMode::SidCommunication {
            self.supervise_reset(low.reset_asserted());
        }

        self.bus.wait_for_phase(Phase::High);
        self.bus.delay(self.settings.delays.phi2);
        let snapshot = self.bus.sample();

        match self.mode {
            BridgeMode::SidCommunication => self.sid_access(snapshot),
            BridgeMode::Transfer => self.transfer_access(snapshot),
            BridgeMode::Configuration => self.configure_access(snapshot),
        }
    }

    /// Current protocol mode
    pub fn mode(&self) -> BridgeMode {
        self.mode
    }

    /// Host cycles serviced so far
    pub fn host_cycle(&self) -> u64 {
        self.host_cycle
    }

    /// Active bus-side settings
    pub fn settings(&self) -> &BusSettings {
        &self.settings
    }

    /// Remaining launch redirects
    pub fn launch_budget(&self) -> u8 {
        self.launch_budget
    }

    /// Shared state
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Bus binding
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable bus binding (tests extend simulated scripts)
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    // ---- shared per-cycle work --------------------------------------------

    /// Bookkeeping run once per host cycle in every mode
    fn advance_host_cycle(&mut self) {
        if let Some(level) = self.shared.take_published_sample() {
            self.bus.set_audio_level(level);
        }

        self.host_cycle += 1;
        self.shared.set_host_cycle(self.host_cycle);
        if self.cadence.clock() {
            self.shared.request_sample();
        }

        if self.open_bus_ttl == 0 {
            self.open_bus = 0;
        } else {
            self.open_bus_ttl -= 1;
        }
    }

    #[inline]
    fn drive(&mut self, value: u8) {
        self.bus.drive_data(value);
        self.driving = true;
    }

    /// Release the data lines if they were driven. Returns true if they were.
    #[inline]
    fn release_data(&mut self) -> bool {
        if self.driving {
            self.bus.release_data();
            self.driving = false;
            true
        } else {
            false
        }
    }

    /// Data byte of a write, latched after the read-bus delay
    #[inline]
    fn latch_write_data(&mut self) -> BusSnapshot {
        self.bus.delay(self.settings.delays.read_bus);
        self.bus.sample()
    }

    // ---- mode transitions -------------------------------------------------

    fn enter_sid_communication(&mut self) {
        self.mode = BridgeMode::SidCommunication;
        self.mode_timer = 0;
        self.redirect_reads = 0;
        self.reset.clear_total();

        let launch = self.program.take_launch();
        if launch.is_none() {
            self.program.restore(self.images.config_tool());
        }
        self.transfer = TransferState::new(&self.images);
        log::debug!("bridge: SID communication (launch pending: {})", launch.is_some());
    }

    fn enter_transfer(&mut self) {
        self.mode = BridgeMode::Transfer;
        self.mode_timer = self.timings.transfer_mode_cycles as i32;
        self.launch_budget = self.launch_budget.saturating_sub(1);
        log::debug!("bridge: TRANSFER ({} bytes queued)", self.program.len());
    }

    fn enter_configuration(&mut self) {
        self.mode = BridgeMode::Configuration;
        self.mode_timer = self.timings.config_mode_cycles as i32;
        self.launch_budget = LAUNCH_BUDGET;
        self.session.resume(self.shared.config());
        log::debug!("bridge: CONFIGURATION");
    }
}
