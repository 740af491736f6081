//! Host Bus Interface
//!
//! The bus sampler never touches hardware directly. It talks to a
//! [`BusPort`], which is either the GPIO-backed binding used on the device
//! or the scripted [`SimulatedBus`] used by host-side tests.

pub mod gpio;
pub mod simulated;

pub use gpio::{GpioBus, GpioPort};
pub use simulated::{DrivenByte, SimulatedBus};

use bitflags::bitflags;

bitflags! {
    /// Logical levels of the bus control lines
    ///
    /// Active-low hardware signals are normalized: `CHIP_SELECT` and `RESET`
    /// are set while asserted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BusLines: u16 {
        /// Host clock high (CPU half-cycle, data valid)
        const PHI2 = 0x0001;
        /// R/W line high (read access)
        const READ = 0x0002;
        /// Chip select asserted
        const CHIP_SELECT = 0x0004;
        /// Extra address line wired to A5
        const A5 = 0x0008;
        /// Extra address line wired to A8 (or an IOx select, active low)
        const A8 = 0x0010;
        /// Host RESET asserted
        const RESET = 0x0020;
        /// Paddle X comparator high
        const POT_X = 0x0040;
        /// Paddle Y comparator high
        const POT_Y = 0x0080;
    }
}

/// Bus clock phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Host clock low: address and chip select stable
    Low,
    /// Host clock high: data valid
    High,
}

/// Instantaneous reading of the host bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusSnapshot {
    /// Control line levels
    pub lines: BusLines,
    /// 5-bit register address
    pub address: u8,
    /// Data lines (valid on writes)
    pub data: u8,
}

impl BusSnapshot {
    /// Phase this snapshot was taken in
    #[inline]
    pub fn phase(&self) -> Phase {
        if self.lines.contains(BusLines::PHI2) {
            Phase::High
        } else {
            Phase::Low
        }
    }

    /// True for read accesses
    #[inline]
    pub fn is_read(&self) -> bool {
        self.lines.contains(BusLines::READ)
    }

    /// True for write accesses
    #[inline]
    pub fn is_write(&self) -> bool {
        !self.is_read()
    }

    /// True while the chip-select line is asserted
    #[inline]
    pub fn chip_selected(&self) -> bool {
        self.lines.contains(BusLines::CHIP_SELECT)
    }

    /// True while the host holds RESET
    #[inline]
    pub fn reset_asserted(&self) -> bool {
        self.lines.contains(BusLines::RESET)
    }

    /// Register address masked to the 32-entry window
    #[inline]
    pub fn register(&self) -> u8 {
        self.address & 0x1F
    }
}

/// Half-cycle access to the host bus
///
/// Every method is called from the bus sampler's polling loop and must
/// return within the host's response window; implementations never block
/// on anything but the bus phase itself.
pub trait BusPort {
    /// Spin until the bus is in `phase`, returning the snapshot that ended the wait
    fn wait_for_phase(&mut self, phase: Phase) -> BusSnapshot;

    /// Read the bus right now
    fn sample(&mut self) -> BusSnapshot;

    /// Drive the data lines with `value` (answering a read)
    fn drive_data(&mut self, value: u8);

    /// Release the data lines
    fn release_data(&mut self);

    /// Calibrated delay of `iterations` delay-loop turns
    fn delay(&mut self, iterations: u8);

    /// Pull the paddle lines low (`true`) or let them float (`false`)
    fn set_pot_discharge(&mut self, discharge: bool);

    /// Update the on-board analog output level
    fn set_audio_level(&mut self, _level: u16) {}
}
