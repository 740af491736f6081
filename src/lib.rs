//! SID Bus Bridge
//!
//! Real-time bridge that lets a dual-core microcontroller impersonate a
//! MOS6581/8580 sound chip on a home computer's expansion bus.
//!
//! Two never-blocking loops cooperate:
//!
//! - [`BusSampler`] samples the host bus twice per host cycle, answers reads
//!   within the host's response window and captures writes into the
//!   [`CommandQueue`]. It owns the three-mode protocol state machine
//!   ([`BridgeMode`]) that multiplexes chip emulation with program delivery
//!   and device configuration on the same 32 registers.
//! - [`EmulationEngine`] drains the queue in host-cycle order, clocks the
//!   external chip model(s) and produces one audio frame per sample period.
//!
//! Everything crossing between the two loops lives in [`SharedState`] or in
//! the lock-free queue. The chip model, the FM model and the audio sink are
//! external collaborators reached through the [`ChipModel`], [`FmModel`] and
//! [`AudioSink`] traits.
//!
//! # Features
//! - Half-cycle bus protocol: register reads, open-bus decay, chip auto-detect
//! - Second chip on six selectable addresses (or pseudo-stereo mirror), FM option
//! - Program injection (TRANSFER) and device configuration (CONFIGURATION)
//! - Test-bit and pulse-width digi-playback detection
//! - Paddle/mouse sampling with median/EMA smoothing
//! - DAC passthrough modes and reset-line supervision
//!
//! # Quick start
//! ```no_run
//! use sidbridge::{
//!     assemble, BridgeImages, MemoryStore, NullChip, NullFm, NullSink, SharedStore, SimulatedBus,
//! };
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! let store: SharedStore = Arc::new(Mutex::new(MemoryStore::new()));
//! let images = BridgeImages::new(vec![0x00, 0xC0, 0x60], vec![0x01, 0x08, 0x00]);
//! let (mut sampler, mut engine) = assemble(
//!     SimulatedBus::new(),
//!     NullChip::default(),
//!     NullChip::default(),
//!     NullFm::default(),
//!     NullSink,
//!     store,
//!     images,
//! )
//! .unwrap();
//! sampler.step();
//! engine.poll();
//! ```

#![warn(missing_docs)]

pub mod bridge; // Bus Sampler & protocol state machine
pub mod bus; // Host bus abstraction (GPIO + simulated)
pub mod config; // Configuration block and derived settings
pub mod constants;
pub mod digi; // Digi-playback detection automata
pub mod engine; // Emulation engine (consumer side)
pub mod paddle; // Paddle/mouse sampling and smoothing
pub mod queue; // Lock-free command queue
pub mod registers; // Shadow register file
pub mod shared; // Cross-core shared state
pub mod sink; // Audio sinks
pub mod store; // Persistence collaborators
pub mod timing; // Calibrated cycle-count windows, sample cadence

use std::sync::Arc;

/// Error types for bridge setup and persistence
///
/// Nothing in this enum is ever reported to the host: the real-time loops
/// resolve every failure locally. Errors surface only on the setup side
/// (store access, queue construction, profile parsing).
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    /// IO error from the filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration block failed its integrity check
    #[error("Configuration integrity failure: {0}")]
    ConfigIntegrity(String),

    /// Program slot outside the directory
    #[error("Program slot {0} out of range")]
    SlotOutOfRange(u8),

    /// Program image does not fit its slot or buffer
    #[error("Payload size error: {0}")]
    PayloadSize(String),

    /// Invalid construction argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// WAV capture error
    #[error("Audio file write error: {0}")]
    AudioFile(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for BridgeError {
    /// Converts a String into `BridgeError::Other`.
    fn from(msg: String) -> Self {
        BridgeError::Other(msg)
    }
}

impl From<&str> for BridgeError {
    /// Converts a string slice into `BridgeError::Other`.
    fn from(msg: &str) -> Self {
        BridgeError::Other(msg.to_string())
    }
}

/// Result type for bridge setup operations
pub type Result<T> = std::result::Result<T, BridgeError>;

// Public API exports
pub use bridge::{BridgeImages, BridgeMode, BusSampler};
pub use bus::{BusLines, BusPort, BusSnapshot, GpioBus, GpioPort, Phase, SimulatedBus};
pub use config::{
    BusDelays, BusSettings, ChipKind, ChipVariant, ConfigBlock, EngineSettings, MixLevels,
    PaddleFilter, SecondChipAddress,
};
pub use digi::{DigiCapture, DigiDetector, Technique};
pub use engine::{
    ChipModel, DeClickRamp, EmulationEngine, FmModel, NullChip, NullFm, NullWatchdog, OutputMixer,
    SamplingMode, Watchdog,
};
pub use paddle::{PaddleAction, PaddleSampler, PaddleSmoother};
pub use queue::{CommandEvent, CommandQueue, QueueConsumer, QueueProducer, TargetChip};
pub use registers::{ChipId, RegisterFile};
pub use shared::{DacMode, RebootKind, SharedState};
pub use sink::{AudioSink, NullSink, StereoFrame, VecSink, WavSink};
pub use store::{
    ConfigStore, DirectoryEntry, JsonFileStore, MemoryStore, ProgramDirectory, ProgramStore,
    SharedStore, Storage,
};
pub use timing::{BridgeTimings, SampleCadence};

/// Wire a bus sampler and an emulation engine around one shared state
///
/// Loads the configuration (falling back to factory defaults on an integrity
/// failure) and the bus timings from `store`, creates the command queue and
/// the shared state, and hands back both loops ready to run on their cores.
///
/// # Arguments
///
/// * `bus` - Host bus binding used by the sampler
/// * `chip_a` / `chip_b` - External chip models
/// * `fm` - External FM model (used only when chip B is configured as FM)
/// * `sink` - Audio sink fed at the sample cadence
/// * `store` - Shared persistence collaborator
/// * `images` - Launcher and configuration-tool images served in TRANSFER mode
#[allow(clippy::too_many_arguments)]
pub fn assemble<B, C, F, S>(
    bus: B,
    chip_a: C,
    chip_b: C,
    fm: F,
    sink: S,
    store: SharedStore,
    images: BridgeImages,
) -> Result<(BusSampler<B>, EmulationEngine<C, F, S>)>
where
    B: BusPort,
    C: ChipModel,
    F: FmModel,
    S: AudioSink,
{
    assemble_with_timings(
        bus,
        chip_a,
        chip_b,
        fm,
        sink,
        store,
        images,
        BridgeTimings::default(),
    )
}

/// [`assemble`] with an explicit board timing profile
#[allow(clippy::too_many_arguments)]
pub fn assemble_with_timings<B, C, F, S>(
    bus: B,
    chip_a: C,
    chip_b: C,
    fm: F,
    sink: S,
    store: SharedStore,
    images: BridgeImages,
    timings: BridgeTimings,
) -> Result<(BusSampler<B>, EmulationEngine<C, F, S>)>
where
    B: BusPort,
    C: ChipModel,
    F: FmModel,
    S: AudioSink,
{
    let (config, stored_delays) = {
        let mut guard = store.lock();
        let config = store::load_config_or_default(&mut *guard);
        (config, guard.load_bus_delays())
    };

    let shared = Arc::new(SharedState::new(&config));
    let (producer, consumer) = CommandQueue::with_default_capacity()?.split();

    let sampler = BusSampler::new(
        bus,
        producer,
        Arc::clone(&shared),
        Arc::clone(&store),
        images,
        timings,
        stored_delays,
    )?;
    let engine = EmulationEngine::new(
        chip_a,
        chip_b,
        fm,
        sink,
        consumer,
        shared,
        store,
        timings,
    );

    log::info!(
        "bridge assembled: chip A {:?}, chip B {:?} at {:?}",
        config.sid1_kind(),
        config.sid2_kind(),
        config.second_chip_address()
    );

    Ok((sampler, engine))
}
