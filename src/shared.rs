//! Cross-core Shared State
//!
//! Every scalar crossing between the bus sampler and the emulation engine
//! lives here, each field documented with its writer. Apart from the
//! command queue nothing else is shared.
//!
//! The configuration bytes are the one multi-byte structure: the bus sampler
//! rewrites them only in CONFIGURATION mode and announces a finished block by
//! bumping `config_epoch` after a full half-cycle wait. The engine re-reads
//! the block when it sees a new epoch.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::config::{ConfigBlock, CONFIG_SIZE};
use crate::constants::VOICES;
use crate::digi::{DigiCapture, Technique};
use crate::registers::{ChipId, RegisterFile};

/// Sample exchange: no request outstanding
const SAMPLE_IDLE: u32 = 0xFFFF;
/// Sample exchange: bus sampler asks for a sample
const SAMPLE_REQUESTED: u32 = 0xFFFE;

/// `captured_at` value of a voice that never captured
const NEVER: u64 = u64::MAX;

/// Reboot request raised by the bus sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootKind {
    /// Plain watchdog reboot
    Soft,
    /// Switch to the next bus timing preset, save, reboot
    TimingChange,
    /// Restore factory defaults, save, reboot
    FactoryReset,
}

impl RebootKind {
    fn code(self) -> u8 {
        match self {
            RebootKind::Soft => 1,
            RebootKind::TimingChange => 2,
            RebootKind::FactoryReset => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RebootKind::Soft),
            2 => Some(RebootKind::TimingChange),
            3 => Some(RebootKind::FactoryReset),
            _ => None,
        }
    }
}

/// DAC passthrough mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DacMode {
    /// Normal chip emulation
    Off = 0,
    /// 0x18 drives both channels
    Mono8 = 1,
    /// 0x18 drives left, 0x19 drives right
    Stereo8 = 2,
}

impl DacMode {
    fn from_code(code: u8) -> Self {
        match code {
            1 => DacMode::Mono8,
            2 => DacMode::Stereo8,
            _ => DacMode::Off,
        }
    }
}

/// Latest digi capture of one voice
#[derive(Debug)]
struct DigiSlot {
    /// Writer: bus sampler (published last, Release)
    captured_at: AtomicU64,
    /// Writer: bus sampler
    sample: AtomicU8,
    /// Writer: bus sampler
    technique: AtomicU8,
}

impl DigiSlot {
    fn new() -> Self {
        DigiSlot {
            captured_at: AtomicU64::new(NEVER),
            sample: AtomicU8::new(0),
            technique: AtomicU8::new(0),
        }
    }
}

/// State shared between the two real-time loops
#[derive(Debug)]
pub struct SharedState {
    /// Monotonic host cycle count. Writer: bus sampler.
    host_cycle: AtomicU64,
    /// Sample exchange word. Bus sampler writes `SAMPLE_REQUESTED` and
    /// `SAMPLE_IDLE`; the engine answers a request with a level below both.
    sample_exchange: AtomicU32,
    /// Status brightness of the last sample. Writer: engine.
    brightness: AtomicU32,
    /// Current DAC mode. Writer: bus sampler.
    dac_mode: AtomicU8,
    /// DAC latches. Writer: bus sampler.
    dac_left: AtomicI32,
    dac_right: AtomicI32,
    /// Per-voice digi captures. Writer: bus sampler.
    digi: [DigiSlot; VOICES],
    /// Bumped after every configuration apply. Writer: bus sampler.
    config_epoch: AtomicU32,
    /// Configuration bytes. Writer: bus sampler, only while parked.
    config: [AtomicU8; CONFIG_SIZE],
    /// Pending reboot. Set by the bus sampler, taken by the engine.
    reboot: AtomicU8,
    /// Fade-out request (reset held). Set by the bus sampler, taken by the engine.
    fade_out: AtomicBool,
    /// Paddle measurement handoff. Writer: bus sampler.
    pot_x: AtomicU8,
    pot_y: AtomicU8,
    /// Set by the bus sampler with a fresh measurement, cleared by the engine.
    pot_pending: AtomicBool,
    /// FM sample trick: enable bits. Writer: bus sampler.
    fm_hack: AtomicU8,
    /// FM sample trick: latched sample bytes. Writer: bus sampler.
    fm_hack_values: [AtomicU8; 2],
    /// Shadow registers (see [`RegisterFile`] for per-index writers)
    registers: RegisterFile,
}

impl SharedState {
    /// Create the shared state for an initial configuration
    pub fn new(config: &ConfigBlock) -> Self {
        let state = SharedState {
            host_cycle: AtomicU64::new(0),
            sample_exchange: AtomicU32::new(SAMPLE_IDLE),
            brightness: AtomicU32::new(0),
            dac_mode: AtomicU8::new(DacMode::Off as u8),
            dac_left: AtomicI32::new(0),
            dac_right: AtomicI32::new(0),
            digi: std::array::from_fn(|_| DigiSlot::new()),
            config_epoch: AtomicU32::new(0),
            config: std::array::from_fn(|i| AtomicU8::new(config.get(i))),
            reboot: AtomicU8::new(0),
            fade_out: AtomicBool::new(false),
            pot_x: AtomicU8::new(0),
            pot_y: AtomicU8::new(0),
            pot_pending: AtomicBool::new(false),
            fm_hack: AtomicU8::new(0),
            fm_hack_values: [AtomicU8::new(0), AtomicU8::new(0)],
            registers: RegisterFile::new(),
        };
        state.refresh_model_detect(config);
        state
    }

    /// Shadow registers
    #[inline]
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    // ---- host cycle -------------------------------------------------------

    /// Current host cycle count
    #[inline]
    pub fn host_cycle(&self) -> u64 {
        self.host_cycle.load(Ordering::Acquire)
    }

    /// Publish the host cycle count (bus sampler)
    #[inline]
    pub fn set_host_cycle(&self, cycle: u64) {
        self.host_cycle.store(cycle, Ordering::Release);
    }

    // ---- sample exchange --------------------------------------------------

    /// Ask the engine for the next sample (bus sampler)
    #[inline]
    pub fn request_sample(&self) {
        self.sample_exchange.store(SAMPLE_REQUESTED, Ordering::Release);
    }

    /// True while a sample request is outstanding (engine)
    #[inline]
    pub fn sample_requested(&self) -> bool {
        self.sample_exchange.load(Ordering::Acquire) == SAMPLE_REQUESTED
    }

    /// Answer a request with an output level (engine)
    #[inline]
    pub fn publish_sample(&self, level: u16, brightness: u32) {
        self.brightness.store(brightness, Ordering::Relaxed);
        let level = (level as u32).min(SAMPLE_REQUESTED - 1);
        // Only answer if the request is still the current one.
        let _ = self.sample_exchange.compare_exchange(
            SAMPLE_REQUESTED,
            level,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }

    /// Take a published level for the analog output (bus sampler)
    #[inline]
    pub fn take_published_sample(&self) -> Option<u16> {
        let value = self.sample_exchange.load(Ordering::Acquire);
        if value < SAMPLE_REQUESTED {
            self.sample_exchange.store(SAMPLE_IDLE, Ordering::Release);
            Some(value as u16)
        } else {
            None
        }
    }

    /// Brightness of the most recent sample
    pub fn brightness(&self) -> u32 {
        self.brightness.load(Ordering::Relaxed)
    }

    // ---- DAC --------------------------------------------------------------

    /// Current DAC mode
    #[inline]
    pub fn dac_mode(&self) -> DacMode {
        DacMode::from_code(self.dac_mode.load(Ordering::Acquire))
    }

    /// Switch DAC mode (bus sampler)
    pub fn set_dac_mode(&self, mode: DacMode) {
        self.dac_mode.store(mode as u8, Ordering::Release);
    }

    /// Latch a DAC write to register 0x18/0x19 (bus sampler)
    ///
    /// Returns false when the register is not a DAC register in the current mode.
    #[inline]
    pub fn latch_dac(&self, register: u8, value: u8) -> bool {
        let sample = (value as i32 - 128) << 7;
        match (self.dac_mode(), register) {
            (DacMode::Mono8, 0x18) => {
                self.dac_left.store(sample, Ordering::Relaxed);
                self.dac_right.store(sample, Ordering::Relaxed);
                true
            }
            (DacMode::Stereo8, 0x18) => {
                self.dac_left.store(sample, Ordering::Relaxed);
                true
            }
            (DacMode::Stereo8, 0x19) => {
                self.dac_right.store(sample, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Current DAC latch pair
    #[inline]
    pub fn dac_latch(&self) -> (i32, i32) {
        (
            self.dac_left.load(Ordering::Relaxed),
            self.dac_right.load(Ordering::Relaxed),
        )
    }

    // ---- digi -------------------------------------------------------------

    /// Publish a digi capture (bus sampler)
    #[inline]
    pub fn publish_digi(&self, capture: &DigiCapture, now: u64) {
        let slot = &self.digi[capture.voice];
        slot.sample.store(capture.sample, Ordering::Relaxed);
        slot.technique.store(capture.technique as u8, Ordering::Relaxed);
        slot.captured_at.store(now, Ordering::Release);
    }

    /// Sample and technique of a voice captured within `window` cycles of `now`
    #[inline]
    pub fn active_digi(&self, voice: usize, now: u64, window: u64) -> Option<(u8, Technique)> {
        let slot = &self.digi[voice];
        let at = slot.captured_at.load(Ordering::Acquire);
        if at == NEVER || now.saturating_sub(at) > window {
            return None;
        }
        let technique = Technique::from_id(slot.technique.load(Ordering::Relaxed))?;
        Some((slot.sample.load(Ordering::Relaxed), technique))
    }

    /// Forget every digi capture
    pub fn clear_digi(&self) {
        for slot in &self.digi {
            slot.captured_at.store(NEVER, Ordering::Release);
        }
    }

    // ---- configuration ----------------------------------------------------

    /// Configuration epoch
    #[inline]
    pub fn config_epoch(&self) -> u32 {
        self.config_epoch.load(Ordering::Acquire)
    }

    /// Current configuration bytes
    pub fn config(&self) -> ConfigBlock {
        let mut bytes = [0u8; CONFIG_SIZE];
        for (dst, src) in bytes.iter_mut().zip(self.config.iter()) {
            *dst = src.load(Ordering::Relaxed);
        }
        ConfigBlock::from_bytes(bytes)
    }

    /// Replace the configuration and announce it (bus sampler, parked)
    pub fn apply_config(&self, config: &ConfigBlock) {
        for (dst, &src) in self.config.iter().zip(config.as_bytes().iter()) {
            dst.store(src, Ordering::Relaxed);
        }
        self.refresh_model_detect(config);
        self.config_epoch.fetch_add(1, Ordering::AcqRel);
    }

    fn refresh_model_detect(&self, config: &ConfigBlock) {
        self.registers
            .set_model_detect_value(ChipId::A, config.sid1_kind().model_detect_value());
        self.registers
            .set_model_detect_value(ChipId::B, config.sid2_kind().model_detect_value());
    }

    // ---- reboot / fade ----------------------------------------------------

    /// Raise a reboot request (bus sampler). A stronger request wins.
    pub fn request_reboot(&self, kind: RebootKind) {
        self.reboot.fetch_max(kind.code(), Ordering::AcqRel);
    }

    /// Take the pending reboot request (engine)
    pub fn take_reboot(&self) -> Option<RebootKind> {
        RebootKind::from_code(self.reboot.swap(0, Ordering::AcqRel))
    }

    /// Ask the engine to fade the output to mid level (bus sampler)
    #[inline]
    pub fn request_fade_out(&self) {
        self.fade_out.store(true, Ordering::Release);
    }

    /// Take the fade-out request (engine)
    #[inline]
    pub fn take_fade_out(&self) -> bool {
        self.fade_out.swap(false, Ordering::AcqRel)
    }

    // ---- paddles ----------------------------------------------------------

    /// Hand a measurement to the engine unless one is still pending (bus sampler)
    pub fn offer_paddles(&self, x: u8, y: u8) {
        if self.pot_pending.load(Ordering::Acquire) {
            return;
        }
        self.pot_x.store(x, Ordering::Relaxed);
        self.pot_y.store(y, Ordering::Relaxed);
        self.pot_pending.store(true, Ordering::Release);
    }

    /// Take a pending measurement (engine)
    pub fn take_paddles(&self) -> Option<(u8, u8)> {
        if !self.pot_pending.load(Ordering::Acquire) {
            return None;
        }
        let taken = (
            self.pot_x.load(Ordering::Relaxed),
            self.pot_y.load(Ordering::Relaxed),
        );
        self.pot_pending.store(false, Ordering::Release);
        Some(taken)
    }

    // ---- FM sample trick --------------------------------------------------

    /// Update the FM sample-trick latch (bus sampler)
    #[inline]
    pub fn set_fm_hack(&self, enable: u8, values: [u8; 2]) {
        self.fm_hack_values[0].store(values[0], Ordering::Relaxed);
        self.fm_hack_values[1].store(values[1], Ordering::Relaxed);
        self.fm_hack.store(enable, Ordering::Release);
    }

    /// FM sample-trick latch: (enable bits, sample bytes)
    #[inline]
    pub fn fm_hack(&self) -> (u8, [u8; 2]) {
        let enable = self.fm_hack.load(Ordering::Acquire);
        (
            enable,
            [
                self.fm_hack_values[0].load(Ordering::Relaxed),
                self.fm_hack_values[1].load(Ordering::Relaxed),
            ],
        )
    }
}
