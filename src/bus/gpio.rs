//! GPIO-backed bus binding
//!
//! Maps the raw 32-bit GPIO input word of the board onto [`BusSnapshot`]s.
//! Pin assignment:
//!
//! | pins   | signal                          |
//! |--------|---------------------------------|
//! | 0..=7  | D0..D7                          |
//! | 8      | data buffer output enable       |
//! | 9      | R/W (high = read)               |
//! | 10, 11 | POTX, POTY                      |
//! | 12     | PHI2                            |
//! | 14, 15 | A5, A8 (or IOx select)          |
//! | 16..=20| A0..A4                          |
//! | 21     | chip select (active low)        |
//! | 22     | RESET (active low)              |

use super::{BusLines, BusPort, BusSnapshot, Phase};

/// Data lines
pub const PIN_DATA_MASK: u32 = 0xFF;
/// Read/write
pub const PIN_RW: u32 = 9;
/// Paddle X
pub const PIN_POT_X: u32 = 10;
/// Paddle Y
pub const PIN_POT_Y: u32 = 11;
/// Host clock
pub const PIN_PHI2: u32 = 12;
/// Extra address line A5
pub const PIN_A5: u32 = 14;
/// Extra address line A8 / IOx
pub const PIN_A8: u32 = 15;
/// First register address line
pub const PIN_A0: u32 = 16;
/// Chip select (active low)
pub const PIN_CS: u32 = 21;
/// Host reset (active low)
pub const PIN_RESET: u32 = 22;

const POT_MASK: u32 = (1 << PIN_POT_X) | (1 << PIN_POT_Y);

/// Raw access to the GPIO block
///
/// Implemented by the board support layer. Every call must be a plain
/// register access; nothing here may block.
pub trait GpioPort {
    /// Read the input word
    fn read(&self) -> u32;

    /// Set the pins in `mask` to the levels in `value`
    fn put_masked(&mut self, mask: u32, value: u32);

    /// Make the pins in `mask` outputs where `outputs` has a one, inputs elsewhere
    fn set_dir_masked(&mut self, mask: u32, outputs: u32);

    /// Busy-wait roughly `iterations` delay-loop turns
    fn spin(&mut self, iterations: u32) {
        for _ in 0..iterations {
            std::hint::spin_loop();
        }
    }

    /// Update the PWM level of the analog audio pin
    fn set_pwm_level(&mut self, _level: u16) {}
}

/// [`BusPort`] over a [`GpioPort`]
#[derive(Debug)]
pub struct GpioBus<P: GpioPort> {
    port: P,
    driving: bool,
}

impl<P: GpioPort> GpioBus<P> {
    /// Bind to a GPIO block
    pub fn new(port: P) -> Self {
        GpioBus {
            port,
            driving: false,
        }
    }

    /// Underlying port
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Release the port
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Decode a raw GPIO word
    pub fn decode(word: u32) -> BusSnapshot {
        let bit = |pin: u32| word & (1 << pin) != 0;

        let mut lines = BusLines::empty();
        lines.set(BusLines::PHI2, bit(PIN_PHI2));
        lines.set(BusLines::READ, bit(PIN_RW));
        lines.set(BusLines::CHIP_SELECT, !bit(PIN_CS));
        lines.set(BusLines::A5, bit(PIN_A5));
        lines.set(BusLines::A8, bit(PIN_A8));
        lines.set(BusLines::RESET, !bit(PIN_RESET));
        lines.set(BusLines::POT_X, bit(PIN_POT_X));
        lines.set(BusLines::POT_Y, bit(PIN_POT_Y));

        BusSnapshot {
            lines,
            address: ((word >> PIN_A0) & 0x1F) as u8,
            data: (word & PIN_DATA_MASK) as u8,
        }
    }
}

impl<P: GpioPort> BusPort for GpioBus<P> {
    #[inline]
    fn wait_for_phase(&mut self, phase: Phase) -> BusSnapshot {
        let want_high = phase == Phase::High;
        loop {
            let word = self.port.read();
            if (word & (1 << PIN_PHI2) != 0) == want_high {
                return Self::decode(word);
            }
        }
    }

    #[inline]
    fn sample(&mut self) -> BusSnapshot {
        Self::decode(self.port.read())
    }

    #[inline]
    fn drive_data(&mut self, value: u8) {
        if !self.driving {
            self.port.set_dir_masked(PIN_DATA_MASK, PIN_DATA_MASK);
            self.driving = true;
        }
        self.port.put_masked(PIN_DATA_MASK, value as u32);
    }

    #[inline]
    fn release_data(&mut self) {
        if self.driving {
            self.port.set_dir_masked(PIN_DATA_MASK, 0);
            self.driving = false;
        }
    }

    #[inline]
    fn delay(&mut self, iterations: u8) {
        self.port.spin(iterations as u32 * 3 + 2);
    }

    fn set_pot_discharge(&mut self, discharge: bool) {
        // Outputs are held low; inputs let the lines charge
        self.port.put_masked(POT_MASK, 0);
        self.port
            .set_dir_masked(POT_MASK, if discharge { POT_MASK } else { 0 });
    }

    fn set_audio_level(&mut self, level: u16) {
        self.port.set_pwm_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct FakePort {
        words: Vec<u32>,
        next: Cell<usize>,
        outputs: u32,
        levels: u32,
        pwm: Vec<u16>,
    }

    impl GpioPort for FakePort {
        fn read(&self) -> u32 {
            let i = self.next.get();
            self.next.set(i + 1);
            self.words[i.min(self.words.len() - 1)]
        }

        fn put_masked(&mut self, mask: u32, value: u32) {
            self.levels = (self.levels & !mask) | (value & mask);
        }

        fn set_dir_masked(&mut self, mask: u32, outputs: u32) {
            self.outputs = (self.outputs & !mask) | (outputs & mask);
        }

        fn spin(&mut self, _iterations: u32) {}

        fn set_pwm_level(&mut self, level: u16) {
            self.pwm.push(level);
        }
    }

    /// Idle word: chip select and reset released, read access
    const IDLE: u32 = (1 << PIN_CS) | (1 << PIN_RESET) | (1 << PIN_RW);

    #[test]
    fn test_decode_normalizes_active_low_lines() {
        let s = GpioBus::<FakePort>::decode(IDLE);
        assert!(!s.chip_selected());
        assert!(!s.reset_asserted());
        assert!(s.is_read());

        let write = (1 << PIN_RESET) | (1 << PIN_PHI2) | (0x12 << PIN_A0) | 0x20 | (1 << PIN_A5);
        let s = GpioBus::<FakePort>::decode(write);
        assert!(s.chip_selected());
        assert!(s.is_write());
        assert_eq!(s.phase(), Phase::High);
        assert_eq!((s.register(), s.data), (0x12, 0x20));
        assert!(s.lines.contains(BusLines::A5));
        assert!(!s.lines.contains(BusLines::A8));
    }

    #[test]
    fn test_wait_for_phase_spins_until_edge() {
        let port = FakePort {
            words: vec![IDLE, IDLE, IDLE | (1 << PIN_PHI2) | (3 << PIN_A0)],
            ..FakePort::default()
        };
        let mut bus = GpioBus::new(port);
        let s = bus.wait_for_phase(Phase::High);
        assert_eq!(s.register(), 3);
        assert_eq!(bus.port().next.get(), 3);
    }

    #[test]
    fn test_drive_and_release_data() {
        let mut bus = GpioBus::new(FakePort {
            words: vec![IDLE],
            ..FakePort::default()
        });
        bus.drive_data(0x4C);
        assert_eq!(bus.port().outputs & PIN_DATA_MASK, 0xFF);
        assert_eq!(bus.port().levels & PIN_DATA_MASK, 0x4C);
        bus.release_data();
        assert_eq!(bus.port().outputs & PIN_DATA_MASK, 0);
    }

    #[test]
    fn test_pot_discharge_switches_direction() {
        let mut bus = GpioBus::new(FakePort {
            words: vec![IDLE],
            ..FakePort::default()
        });
        bus.set_pot_discharge(true);
        assert_eq!(bus.port().outputs & POT_MASK, POT_MASK);
        assert_eq!(bus.port().levels & POT_MASK, 0);
        bus.set_pot_discharge(false);
        assert_eq!(bus.port().outputs & POT_MASK, 0);
        bus.set_audio_level(1417);
        assert_eq!(bus.into_inner().pwm, vec![1417]);
    }
}
