//! Cycle-Count Timing
//!
//! All deadlines in the bridge are host-cycle counts compared against the
//! monotonic host-cycle counter. The values below are calibrated per board
//! revision; a board profile may override any of them from JSON.

use serde::{Deserialize, Serialize};

use crate::constants::AUDIO_RATE;

/// Calibrated cycle-count windows and thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeTimings {
    /// CONFIGURATION stays active this many cycles after the last bridge access
    pub config_mode_cycles: u32,
    /// TRANSFER stays active this many cycles after the last bridge access
    pub transfer_mode_cycles: u32,
    /// Cycles until the open-bus latch decays to zero
    pub open_bus_ttl: u32,
    /// Test-bit technique: window from PREP to SET
    pub digi_test_bit_setup: u64,
    /// Test-bit technique: window for each confirm step
    pub digi_test_bit_confirm: u64,
    /// Pulse-width technique: window for each step
    pub digi_pulse_width: u64,
    /// A captured digi sample overrides its voice for this many cycles
    pub digi_active_cycles: u64,
    /// RESET held this long starts the fade-out ramp
    pub reset_fade_after: u32,
    /// RESET released after being held this long requests a reboot
    pub soft_reset_after: u32,
    /// RESET held this long switches to the next bus-timing preset
    pub timing_change_after: u32,
    /// RESET held this long restores factory defaults
    pub factory_reset_after: u32,
}

impl Default for BridgeTimings {
    fn default() -> Self {
        Self {
            config_mode_cycles: 25_000,
            transfer_mode_cycles: 30_000,
            open_bus_ttl: 0x10_0000,
            digi_test_bit_setup: 135,
            digi_test_bit_confirm: 22,
            digi_pulse_width: 22,
            digi_active_cycles: 250,
            reset_fade_after: 4,
            soft_reset_after: 2_500,
            timing_change_after: 4_000_000,
            factory_reset_after: 8_000_000,
        }
    }
}

impl BridgeTimings {
    /// Parse a board profile. Missing fields keep their calibrated default.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to a board profile
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Audio sample cadence derived from host clock / sample rate
///
/// Clocked once per host cycle; signals when the next output sample is due.
#[derive(Debug, Clone, Copy)]
pub struct SampleCadence {
    host_clock: u32,
    sample_rate: u32,
    accumulator: u32,
}

impl SampleCadence {
    /// Create a cadence for the given host clock at the default audio rate
    pub fn new(host_clock: u32) -> Self {
        Self::with_rate(host_clock, AUDIO_RATE)
    }

    /// Create a cadence with an explicit sample rate
    pub fn with_rate(host_clock: u32, sample_rate: u32) -> Self {
        SampleCadence {
            host_clock,
            sample_rate,
            accumulator: 0,
        }
    }

    /// Advance by one host cycle. Returns true when a sample is due.
    #[inline]
    pub fn clock(&mut self) -> bool {
        self.accumulator += self.sample_rate;
        if self.accumulator > self.host_clock {
            self.accumulator -= self.host_clock;
            true
        } else {
            false
        }
    }

    /// Change the host clock (after a configuration apply)
    pub fn set_host_clock(&mut self, host_clock: u32) {
        self.host_clock = host_clock;
        self.accumulator %= host_clock.max(1);
    }

    /// Current host clock
    pub fn host_clock(&self) -> u32 {
        self.host_clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cadence_matches_sample_rate() {
        let mut cadence = SampleCadence::new(985_248);
        let due = (0..985_248).filter(|_| cadence.clock()).count();
        assert_relative_eq!(due as f64, 44_100.0, max_relative = 1e-4);
    }

    #[test]
    fn test_partial_profile_keeps_defaults() {
        let timings = BridgeTimings::from_json(r#"{ "digi_test_bit_confirm": 30 }"#).unwrap();
        assert_eq!(timings.digi_test_bit_confirm, 30);
        assert_eq!(timings.digi_test_bit_setup, 135);
        assert_eq!(timings.config_mode_cycles, 25_000);
    }

    #[test]
    fn test_profile_round_trip() {
        let timings = BridgeTimings {
            transfer_mode_cycles: 12_345,
            ..BridgeTimings::default()
        };
        let json = timings.to_json().unwrap();
        assert_eq!(BridgeTimings::from_json(&json).unwrap(), timings);
    }

    #[test]
    fn test_malformed_profile_is_an_error() {
        assert!(BridgeTimings::from_json("{ not json").is_err());
    }
}
