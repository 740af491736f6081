//! Emulation Engine
//!
//! Consumer side of the bridge. Each [`EmulationEngine::poll`]:
//!
//! 1. handles a pending reboot request and configuration changes,
//! 2. drains queued events up to the model's current cycle, then advances
//!    the model(s) to the next event or to "now" (the bus sampler's host
//!    cycle) and refreshes the oscillator/envelope readback,
//! 3. answers an outstanding sample request: one frame from DAC, FM or the
//!    chip models, the analog level through the de-click ramp, the status
//!    brightness, and the frame offered to the audio sink,
//! 4. smooths pending paddle measurements into registers 0x19/0x1A.
//!
//! Events are replayed strictly in queue order, so every model sees its own
//! writes in host-cycle order.

mod mixer;
mod ramp;

pub use mixer::{brightness, dac_frame, fm_trick_sample, output_level, OutputMixer};
pub use ramp::DeClickRamp;

use std::sync::Arc;

use crate::config::{ChipVariant, ConfigBlock, EngineSettings, SecondChipAddress};
use crate::constants::{AUDIO_RATE, REGISTER_COUNT, REG_ENV3, REG_OSC3, REG_POT_X, REG_POT_Y, VOICES};
use crate::paddle::PaddleSmoother;
use crate::queue::{CommandEvent, QueueConsumer, TargetChip};
use crate::registers::ChipId;
use crate::shared::{DacMode, RebootKind, SharedState};
use crate::sink::AudioSink;
use crate::store::SharedStore;
use crate::timing::BridgeTimings;

/// Output sampling method requested from a chip model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// Take the nearest cycle's output
    Fast,
    /// Linear interpolation between cycles
    #[default]
    Interpolate,
    /// Band-limited resampling
    Resample,
}

/// External sound-chip model
///
/// The bridge treats the model as a stateful black box advanced in host
/// cycles.
pub trait ChipModel: Send {
    /// Write a register
    fn write(&mut self, register: u8, value: u8);

    /// Read a register
    fn read(&mut self, register: u8) -> u8;

    /// Advance by `cycles` host cycles
    fn clock(&mut self, cycles: u32);

    /// Current output sample
    fn output(&mut self) -> i32;

    /// Copy the register readback into `buffer`
    fn read_registers(&self, buffer: &mut [u8; REGISTER_COUNT]);

    /// Reset the model
    fn reset(&mut self);

    /// Select the emulated variant
    fn set_chip_model(&mut self, variant: ChipVariant);

    /// Configure output sampling
    fn set_sampling_parameters(&mut self, clock_hz: u32, mode: SamplingMode, sample_rate: u32);

    /// Override voice output with a PCM sample; 0 returns the voice to synthesis
    fn force_digi_output(&mut self, voice: usize, sample: i32);
}

/// External FM synthesis model
pub trait FmModel: Send {
    /// Write `value` to `port` (0 = address, 1 = data)
    fn write(&mut self, port: u8, value: u8);

    /// Render one output sample
    fn update_one_sample(&mut self) -> i32;
}

/// Hardware reboot
pub trait Watchdog {
    /// Reboot the device. Returns only on hosts that cannot reboot.
    fn reboot(&mut self, kind: RebootKind);
}

/// Chip model that records writes and outputs silence
#[derive(Debug, Clone, Default)]
pub struct NullChip {
    registers: [u8; REGISTER_COUNT],
    writes: Vec<(u8, u8)>,
    clocked: u64,
    forced: [i32; VOICES],
    variant: Option<ChipVariant>,
    resets: usize,
}

impl NullChip {
    /// Every register write, in order
    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    /// Total cycles clocked
    pub fn clocked(&self) -> u64 {
        self.clocked
    }

    /// Forced digi value of each voice
    pub fn forced(&self) -> [i32; VOICES] {
        self.forced
    }

    /// Variant last selected
    pub fn variant(&self) -> Option<ChipVariant> {
        self.variant
    }

    /// Number of resets
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Set readback values reported by [`ChipModel::read_registers`]
    pub fn set_readback(&mut self, osc3: u8, env3: u8) {
        self.registers[REG_OSC3 as usize] = osc3;
        self.registers[REG_ENV3 as usize] = env3;
    }
}

impl ChipModel for NullChip {
    fn write(&mut self, register: u8, value: u8) {
        self.writes.push((register, value));
        if (register as usize) < REG_POT_X as usize {
            self.registers[register as usize] = value;
        }
    }

    fn read(&mut self, register: u8) -> u8 {
        self.registers[(register & 0x1F) as usize]
    }

    fn clock(&mut self, cycles: u32) {
        self.clocked += cycles as u64;
    }

    fn output(&mut self) -> i32 {
        0
    }

    fn read_registers(&self, buffer: &mut [u8; REGISTER_COUNT]) {
        buffer.copy_from_slice(&self.registers);
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.registers = [0; REGISTER_COUNT];
    }

    fn set_chip_model(&mut self, variant: ChipVariant) {
        self.variant = Some(variant);
    }

    fn set_sampling_parameters(&mut self, _clock_hz: u32, _mode: SamplingMode, _sample_rate: u32) {}

    fn force_digi_output(&mut self, voice: usize, sample: i32) {
        if let Some(slot) = self.forced.get_mut(voice) {
            *slot = sample;
        }
    }
}

/// FM model that records writes and outputs silence
#[derive(Debug, Clone, Default)]
pub struct NullFm {
    writes: Vec<(u8, u8)>,
}

impl NullFm {
    /// Every port write, in order
    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }
}

impl FmModel for NullFm {
    fn write(&mut self, port: u8, value: u8) {
        self.writes.push((port, value));
    }

    fn update_one_sample(&mut self) -> i32 {
        0
    }
}

/// Watchdog that only records reboot requests
#[derive(Debug, Clone, Default)]
pub struct NullWatchdog {
    reboots: Vec<RebootKind>,
}

impl NullWatchdog {
    /// Reboots requested so far
    pub fn reboots(&self) -> &[RebootKind] {
        &self.reboots
    }
}

impl Watchdog for NullWatchdog {
    fn reboot(&mut self, kind: RebootKind) {
        self.reboots.push(kind);
    }
}

/// Consumer-side loop
pub struct EmulationEngine<C: ChipModel, F: FmModel, S: AudioSink> {
    chip_a: C,
    chip_b: C,
    fm: F,
    sink: S,
    consumer: QueueConsumer,
    shared: Arc<SharedState>,
    store: SharedStore,
    timings: BridgeTimings,

    settings: EngineSettings,
    config_epoch: u32,
    mixer: OutputMixer,
    ramp: DeClickRamp,
    paddles: PaddleSmoother,
    /// Host cycle the models have been clocked to
    emulated_cycle: u64,
    frames: u64,
}

impl<C: ChipModel, F: FmModel, S: AudioSink> EmulationEngine<C, F, S> {
    /// Create the engine and configure the models from the shared configuration
    ///
    /// # Arguments
    ///
    /// * `chip_a` / `chip_b` - Chip models
    /// * `fm` - FM model (driven only when chip B is configured as FM)
    /// * `sink` - Audio sink
    /// * `consumer` - Consumer half of the command queue
    /// * `shared` - State shared with the bus sampler
    /// * `store` - Persistence collaborator (reboot-time saves)
    /// * `timings` - Calibrated cycle windows
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chip_a: C,
        chip_b: C,
        fm: F,
        sink: S,
        consumer: QueueConsumer,
        shared: Arc<SharedState>,
        store: SharedStore,
        timings: BridgeTimings,
    ) -> Self {
        let config = shared.config();
        let settings = config.engine_settings();
        let mut engine = EmulationEngine {
            chip_a,
            chip_b,
            fm,
            sink,
            consumer,
            config_epoch: shared.config_epoch(),
            shared,
            store,
            timings,
            settings,
            mixer: OutputMixer::new(settings.mix),
            ramp: DeClickRamp::new(),
            paddles: PaddleSmoother::new(),
            emulated_cycle: 0,
            frames: 0,
        };
        engine.configure_models();
        engine
    }

    /// Run until a reboot request reaches a watchdog that returns
    pub fn run<W: Watchdog>(&mut self, watchdog: &mut W) -> RebootKind {
        loop {
            if let Some(kind) = self.poll() {
                watchdog.reboot(kind);
                return kind;
            }
        }
    }

    /// One pass of the engine loop
    ///
    /// Returns the reboot the engine prepared (configuration persisted), if
    /// the bus sampler requested one.
    pub fn poll(&mut self) -> Option<RebootKind> {
        if let Some(kind) = self.shared.take_reboot() {
            self.prepare_reboot(kind);
            return Some(kind);
        }

        let epoch = self.shared.config_epoch();
        if epoch != self.config_epoch {
            self.config_epoch = epoch;
            self.reconfigure();
        }

        if self.shared.take_fade_out() {
            self.ramp.fade_to_mid();
        }

        self.drain_and_clock();

        if self.shared.sample_requested() {
            self.render_sample();
        }

        if let Some((x, y)) = self.shared.take_paddles() {
            if let Some((x, y)) = self.paddles.update(self.settings.paddle_filter, x, y) {
                let registers = self.shared.registers();
                registers.store(ChipId::A, REG_POT_X, x);
                registers.store(ChipId::A, REG_POT_Y, y);
            }
        }
        None
    }

    /// Active engine settings
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Host cycle the models have been advanced to
    pub fn emulated_cycle(&self) -> u64 {
        self.emulated_cycle
    }

    /// Frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Chip A model
    pub fn chip_a(&self) -> &C {
        &self.chip_a
    }

    /// Chip B model
    pub fn chip_b(&self) -> &C {
        &self.chip_b
    }

    /// FM model
    pub fn fm(&self) -> &F {
        &self.fm
    }

    /// Audio sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable audio sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn configure_models(&mut self) {
        let s = self.settings;
        self.chip_a.set_chip_model(s.chip_a);
        self.chip_b.set_chip_model(s.chip_b);
        self.chip_a
            .set_sampling_parameters(s.host_clock, SamplingMode::Interpolate, AUDIO_RATE);
        self.chip_b
            .set_sampling_parameters(s.host_clock, SamplingMode::Interpolate, AUDIO_RATE);
        self.mixer.set_levels(s.mix);
    }

    fn reconfigure(&mut self) {
        let previous: SecondChipAddress = self.settings.second_chip;
        self.settings = self.shared.config().engine_settings();
        self.configure_models();
        if self.settings.second_chip != previous {
            self.chip_b.reset();
        }
        self.shared.clear_digi();
        log::debug!(
            "engine reconfigured: {:?} + {:?}, {} Hz",
            self.settings.chip_a,
            self.settings.chip_b_kind,
            self.settings.host_clock
        );
    }

    fn drain_and_clock(&mut self) {
        let now = self.shared.host_cycle();
        let mut target = now;

        while let Some(event) = self.consumer.peek() {
            if event.host_cycle > self.emulated_cycle {
                target = event.host_cycle.min(now);
                break;
            }
            self.consumer.pop();
            self.apply(event);
        }

        if target <= self.emulated_cycle {
            return;
        }
        let delta = target - self.emulated_cycle;
        self.emulated_cycle = target;

        if self.shared.dac_mode() != DacMode::Off {
            return;
        }

        if self.settings.digi_detect {
            for voice in 0..VOICES {
                let forced = self
                    .shared
                    .active_digi(voice, now, self.timings.digi_active_cycles)
                    .map_or(0, |(sample, technique)| {
                        (((sample as i32 - 128) << 8) & !3) | technique.id() as i32
                    });
                self.chip_a.force_digi_output(voice, forced);
            }
        }

        let cycles = delta.min(u32::MAX as u64) as u32;
        self.chip_a.clock(cycles);
        if self.settings.fm_mode == 0 {
            self.chip_b.clock(cycles);
        }

        let mut buffer = [0u8; REGISTER_COUNT];
        let registers = self.shared.registers();
        self.chip_a.read_registers(&mut buffer);
        registers.refresh_readback(ChipId::A, [buffer[REG_OSC3 as usize], buffer[REG_ENV3 as usize]]);
        self.chip_b.read_registers(&mut buffer);
        registers.refresh_readback(ChipId::B, [buffer[REG_OSC3 as usize], buffer[REG_ENV3 as usize]]);
    }

    fn apply(&mut self, event: CommandEvent) {
        let dac = self.shared.dac_mode() != DacMode::Off;
        match event.target {
            TargetChip::ChipA => {
                if dac {
                    return;
                }
                self.chip_a.write(event.register, event.value);
                if self.settings.mirror {
                    self.chip_b.write(event.register, event.value);
                }
            }
            TargetChip::ChipB => self.chip_b.write(event.register, event.value),
            TargetChip::FmLow | TargetChip::FmHigh => {
                if self.settings.fm_mode > 0 {
                    let port = event.target.fm_port().unwrap_or(0);
                    self.fm.write(port, event.value);
                } else {
                    self.chip_b.write(event.register, event.value);
                }
            }
        }
    }

    fn render_sample(&mut self) {
        let frame = if self.shared.dac_mode() != DacMode::Off {
            dac_frame(self.shared.dac_latch())
        } else if self.settings.fm_mode > 0 {
            let mut fm = self.fm.update_one_sample();
            let (enable, values) = self.shared.fm_hack();
            if enable != 0 {
                fm = fm_trick_sample(values);
            }
            self.mixer.mix(self.chip_a.output(), fm)
        } else {
            self.mixer.mix(self.chip_a.output(), self.chip_b.output())
        };

        let level = self.ramp.apply(output_level(frame));
        self.shared
            .publish_sample(level.max(0) as u16, brightness(frame));
        self.sink.try_push(frame);
        self.frames += 1;
    }

    fn prepare_reboot(&mut self, kind: RebootKind) {
        let config = match kind {
            RebootKind::Soft => None,
            RebootKind::TimingChange => {
                let mut config = self.shared.config();
                config.advance_timing_preset();
                Some(config)
            }
            RebootKind::FactoryReset => Some(ConfigBlock::factory_reset()),
        };

        if let Some(config) = config {
            if let Err(e) = self.store.lock().save_config(&config) {
                log::warn!("configuration save before reboot failed: {e}");
            }
        }
        log::warn!("rebooting ({kind:?})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CommandQueue;
    use crate::sink::VecSink;
    use crate::store::MemoryStore;
    use parking_lot::Mutex;

    fn engine() -> (
        crate::queue::QueueProducer,
        Arc<SharedState>,
        EmulationEngine<NullChip, NullFm, VecSink>,
    ) {
        let shared = Arc::new(SharedState::new(&ConfigBlock::defaults()));
        let (producer, consumer) = CommandQueue::new(64).unwrap().split();
        let store: SharedStore = Arc::new(Mutex::new(MemoryStore::new()));
        let engine = EmulationEngine::new(
            NullChip::default(),
            NullChip::default(),
            NullFm::default(),
            VecSink::new(),
            consumer,
            Arc::clone(&shared),
            store,
            BridgeTimings::default(),
        );
        (producer, shared, engine)
    }

    #[test]
    fn test_events_wait_for_their_cycle() {
        let (mut producer, shared, mut engine) = engine();
        producer.push(CommandEvent::new(10, TargetChip::ChipA, 0x04, 0x11));
        producer.push(CommandEvent::new(10, TargetChip::ChipA, 0x05, 0x22));
        producer.push(CommandEvent::new(40, TargetChip::ChipA, 0x06, 0x33));
        shared.set_host_cycle(50);

        engine.poll();
        assert!(engine.chip_a().writes().is_empty());
        assert_eq!(engine.emulated_cycle(), 10);

        engine.poll();
        assert_eq!(engine.chip_a().writes(), &[(0x04, 0x11), (0x05, 0x22)]);
        assert_eq!(engine.emulated_cycle(), 40);

        engine.poll();
        assert_eq!(engine.chip_a().writes().len(), 3);
        assert_eq!(engine.emulated_cycle(), 50);
        assert_eq!(engine.chip_a().clocked(), 50);
    }

    #[test]
    fn test_readback_refreshed_after_clock() {
        let (_producer, shared, mut engine) = engine();
        engine.chip_a.set_readback(0x5A, 0xA5);
        shared.set_host_cycle(5);
        engine.poll();
        assert_eq!(shared.registers().readback(ChipId::A, REG_OSC3), 0x5A);
        assert_eq!(shared.registers().readback(ChipId::A, REG_ENV3), 0xA5);
    }

    #[test]
    fn test_sample_request_feeds_sink() {
        let (_producer, shared, mut engine) = engine();
        shared.request_sample();
        engine.poll();
        assert_eq!(engine.frames(), 1);
        assert_eq!(engine.sink().frames().len(), 1);
        // The power-up fade starts from the bottom of the range
        assert_eq!(shared.take_published_sample(), Some(0));
    }

    #[test]
    fn test_paddles_reach_registers() {
        let (_producer, shared, mut engine) = engine();
        // Factory defaults use the raw filter
        shared.offer_paddles(100, 150);
        engine.poll();
        assert_eq!(shared.registers().readback(ChipId::A, REG_POT_X), 100);
        assert_eq!(shared.registers().readback(ChipId::A, REG_POT_Y), 150);
        assert_eq!(shared.take_paddles(), None);
    }

    #[test]
    fn test_factory_reset_persists_defaults() {
        let (_producer, shared, mut engine) = engine();
        shared.request_reboot(RebootKind::FactoryReset);
        let mut watchdog = NullWatchdog::default();
        assert_eq!(engine.run(&mut watchdog), RebootKind::FactoryReset);
        assert_eq!(watchdog.reboots(), &[RebootKind::FactoryReset]);
        let saved = crate::store::load_config_or_default(&mut *engine.store.lock());
        assert_eq!(saved, ConfigBlock::factory_reset());
    }
}
