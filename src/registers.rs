//! Shadow Register File
//!
//! Two 34-byte blocks, one per emulated chip: 32 host-visible registers
//! followed by the auto-detect step and the model-detect value.
//!
//! Write ownership is split by index:
//! - 0x00..=0x18, auto-detect bytes: bus sampler (captured host writes)
//! - 0x19..=0x1A: bus sampler in raw paddle mode, engine in smoothed modes
//! - 0x1B..=0x1C: engine (readback refresh after every clock advance)
//!
//! Every byte is an independent relaxed atomic; readers may observe a
//! stale value, never a torn one.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::constants::{REGISTER_COUNT, REG_ENV3, REG_OSC3};

/// Bytes per chip block (registers + two auto-detect bytes)
pub const BLOCK_SIZE: usize = REGISTER_COUNT + 2;

const AUTO_DETECT_STEP: usize = REGISTER_COUNT;
const MODEL_DETECT_VALUE: usize = REGISTER_COUNT + 1;

/// Emulated chip instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipId {
    /// Primary chip
    A,
    /// Second chip (alias address, mirror, or FM)
    B,
}

impl ChipId {
    #[inline]
    fn block(self) -> usize {
        match self {
            ChipId::A => 0,
            ChipId::B => 1,
        }
    }
}

/// Shadow registers of both chips
#[derive(Debug)]
pub struct RegisterFile {
    blocks: [[AtomicU8; BLOCK_SIZE]; 2],
}

impl RegisterFile {
    /// Create a zeroed register file
    pub fn new() -> Self {
        RegisterFile {
            blocks: [
                std::array::from_fn(|_| AtomicU8::new(0)),
                std::array::from_fn(|_| AtomicU8::new(0)),
            ],
        }
    }

    /// Value served to a host read of `register`
    #[inline]
    pub fn readback(&self, chip: ChipId, register: u8) -> u8 {
        self.blocks[chip.block()][(register & 0x1F) as usize].load(Ordering::Relaxed)
    }

    /// Record a host write (or a readback value)
    #[inline]
    pub fn store(&self, chip: ChipId, register: u8, value: u8) {
        self.blocks[chip.block()][(register & 0x1F) as usize].store(value, Ordering::Relaxed);
    }

    /// Copy oscillator 3 / envelope 3 readback from the chip model
    #[inline]
    pub fn refresh_readback(&self, chip: ChipId, values: [u8; 2]) {
        self.store(chip, REG_OSC3, values[0]);
        self.store(chip, REG_ENV3, values[1]);
    }

    /// Current auto-detect step (1 = probe armed)
    #[inline]
    pub fn auto_detect_step(&self, chip: ChipId) -> u8 {
        self.blocks[chip.block()][AUTO_DETECT_STEP].load(Ordering::Relaxed)
    }

    /// Set the auto-detect step
    #[inline]
    pub fn set_auto_detect_step(&self, chip: ChipId, step: u8) {
        self.blocks[chip.block()][AUTO_DETECT_STEP].store(step, Ordering::Relaxed);
    }

    /// Value answered to an armed model probe
    #[inline]
    pub fn model_detect_value(&self, chip: ChipId) -> u8 {
        self.blocks[chip.block()][MODEL_DETECT_VALUE].load(Ordering::Relaxed)
    }

    /// Set the value answered to an armed model probe
    #[inline]
    pub fn set_model_detect_value(&self, chip: ChipId, value: u8) {
        self.blocks[chip.block()][MODEL_DETECT_VALUE].store(value, Ordering::Relaxed);
    }

    /// Zero the host-visible registers of `chip`, keeping the detect value
    pub fn clear(&self, chip: ChipId) {
        for byte in &self.blocks[chip.block()][..=AUTO_DETECT_STEP] {
            byte.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
