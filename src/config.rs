//! Configuration Block
//!
//! The device configuration is a 64-byte block with named indices and a
//! CRC-16 over the first 62 bytes, stored little-endian in bytes 62/63.
//! The bus sampler streams and edits it in CONFIGURATION mode; both loops
//! derive their working settings from it ([`BusSettings`],
//! [`EngineSettings`]) whenever a new block is applied.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::bus::BusLines;
use crate::constants::HOST_CLOCKS;
use crate::{BridgeError, Result};

/// Size of the configuration block
pub const CONFIG_SIZE: usize = 64;

/// Number of bytes covered by the checksum
const CRC_COVERED: usize = 62;

/// Named byte indices
pub mod index {
    /// Chip A kind
    pub const SID1_TYPE: usize = 0;
    /// Chip A digi-boost level
    pub const SID1_DIGIBOOST: usize = 1;
    /// Register readback enable
    pub const REGISTER_READ: usize = 2;
    /// Chip A volume (0..=14)
    pub const SID1_VOLUME: usize = 3;
    /// Chip B kind
    pub const SID2_TYPE: usize = 8;
    /// Chip B digi-boost level
    pub const SID2_DIGIBOOST: usize = 9;
    /// Chip B address selection
    pub const SID2_ADDRESS: usize = 10;
    /// Chip B volume (0..=14)
    pub const SID2_VOLUME: usize = 11;
    /// Stereo panning (0..=14, 7 = centre)
    pub const PANNING: usize = 12;
    /// Paddle offset
    pub const PADDLE_OFFSET: usize = 39;
    /// First filter curve byte
    pub const FILTER_FIRST: usize = 40;
    /// Last filter curve byte
    pub const FILTER_LAST: usize = 48;
    /// Custom read-bus delay
    pub const CUSTOM_TIMING_READBUS: usize = 54;
    /// Custom phi2 delay
    pub const CUSTOM_TIMING_PHI2: usize = 55;
    /// Non-zero: use the custom delays (also the timing preset id)
    pub const USE_TIMINGS: usize = 56;
    /// Paddle trigger threshold
    pub const TRIGGER: usize = 57;
    /// Left/right balance (0..=14, 7 = centre)
    pub const BALANCE: usize = 58;
    /// Host clock selection
    pub const CLOCKSPEED: usize = 59;
    /// Paddle filter mode and flags
    pub const POT_FILTER: usize = 60;
    /// Digi-detection enable
    pub const DIGIDETECT: usize = 61;
    /// Checksum low byte
    pub const CRC_LOW: usize = 62;
    /// Checksum high byte
    pub const CRC_HIGH: usize = 63;
}

/// Timing presets cycled by a long reset hold: (preset id, read-bus delay, phi2 delay)
const TIMING_PRESETS: [(u8, u8, u8); 4] = [(1, 7, 11), (2, 1, 12), (3, 11, 15), (1, 7, 11)];

/// CRC-16 (CCITT polynomial, init 0xFFFF, no reflection)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        let mut x = (crc >> 8) as u8 ^ byte;
        x ^= x >> 4;
        crc = (crc << 8) ^ ((x as u16) << 12) ^ ((x as u16) << 5) ^ (x as u16);
    }
    crc
}

/// Emulated chip kind, as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum ChipKind {
    /// MOS 6581
    Mos6581 = 0,
    /// MOS 8580
    Mos8580 = 1,
    /// MOS 8580 with digi-boost
    Mos8580DigiBoost = 2,
    /// No chip (single-chip setup)
    None = 3,
    /// FM chip answering status reads
    FmWithStatus = 4,
    /// FM chip, write-only
    Fm = 5,
}

impl ChipKind {
    /// Decode a configuration byte (unknown values read as 8580)
    pub fn from_config(value: u8) -> Self {
        ChipKind::from_u8(value).unwrap_or(ChipKind::Mos8580)
    }

    /// True for the three SID variants
    pub fn is_sid(self) -> bool {
        matches!(
            self,
            ChipKind::Mos6581 | ChipKind::Mos8580 | ChipKind::Mos8580DigiBoost
        )
    }

    /// FM mode: 0 off, 1 write-only, 2 with status reads
    pub fn fm_mode(self) -> u8 {
        match self {
            ChipKind::FmWithStatus => 2,
            ChipKind::Fm => 1,
            _ => 0,
        }
    }

    /// Value answered to the model probe
    pub fn model_detect_value(self) -> u8 {
        if self == ChipKind::Mos6581 {
            crate::constants::MODEL_DETECT_6581
        } else {
            crate::constants::MODEL_DETECT_8580
        }
    }
}

/// Chip model variant handed to the external chip model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipVariant {
    /// MOS 6581
    Mos6581,
    /// MOS 8580
    Mos8580,
    /// MOS 8580 with a constant digi-boost input of `-(1 << boost)`
    Mos8580DigiBoost {
        /// Boost exponent from the configuration
        boost: u8,
    },
}

impl ChipVariant {
    fn from_kind(kind: ChipKind, boost: u8) -> Self {
        match kind {
            ChipKind::Mos6581 => ChipVariant::Mos6581,
            ChipKind::Mos8580DigiBoost => ChipVariant::Mos8580DigiBoost { boost },
            _ => ChipVariant::Mos8580,
        }
    }
}

/// Address of the second chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum SecondChipAddress {
    /// Same address as chip A (pseudo-stereo when chip B is a SID)
    Mirror = 0,
    /// $D420 (A5)
    D420 = 1,
    /// $D500 (A8)
    D500 = 2,
    /// $D520 (A5 + A8)
    D520 = 3,
    /// $DE00 (IO1 select on the A8 line)
    De00 = 4,
    /// $DF00 (IO2 select on the A8 line)
    Df00 = 5,
}

impl SecondChipAddress {
    /// Every selectable address
    pub const ALL: [SecondChipAddress; 6] = [
        SecondChipAddress::Mirror,
        SecondChipAddress::D420,
        SecondChipAddress::D500,
        SecondChipAddress::D520,
        SecondChipAddress::De00,
        SecondChipAddress::Df00,
    ];

    /// Decode a configuration byte (taken modulo 6)
    pub fn from_config(value: u8) -> Self {
        SecondChipAddress::from_u8(value % 6).unwrap_or(SecondChipAddress::Mirror)
    }

    /// Configuration byte for this address
    pub fn config_value(self) -> u8 {
        self as u8
    }

    /// Address lines that select chip B during a chip-select access
    pub fn alias_lines(self) -> BusLines {
        match self {
            SecondChipAddress::Mirror => BusLines::empty(),
            SecondChipAddress::D420 => BusLines::A5,
            SecondChipAddress::D500 => BusLines::A8,
            SecondChipAddress::D520 => BusLines::A5 | BusLines::A8,
            SecondChipAddress::De00 | SecondChipAddress::Df00 => BusLines::A8,
        }
    }

    /// Chip B is selected through an IO expansion line instead of chip select
    pub fn is_io_expansion(self) -> bool {
        matches!(self, SecondChipAddress::De00 | SecondChipAddress::Df00)
    }

    /// Line levels a host access to chip B's base address presents
    pub fn host_lines(self) -> BusLines {
        match self {
            SecondChipAddress::Mirror => BusLines::CHIP_SELECT | BusLines::A8,
            SecondChipAddress::D420 => BusLines::CHIP_SELECT | BusLines::A5,
            SecondChipAddress::D500 => BusLines::CHIP_SELECT | BusLines::A8,
            SecondChipAddress::D520 => BusLines::CHIP_SELECT | BusLines::A5 | BusLines::A8,
            // IOx select is active low on the A8 input, chip select stays idle.
            SecondChipAddress::De00 | SecondChipAddress::Df00 => BusLines::empty(),
        }
    }

    /// Line levels a host access to chip A presents under this wiring
    pub fn primary_lines(self) -> BusLines {
        if self.is_io_expansion() {
            BusLines::CHIP_SELECT | BusLines::A8
        } else {
            BusLines::CHIP_SELECT
        }
    }
}

/// Paddle filter mode (low nibble of the pot-filter byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum PaddleFilter {
    /// Raw measurement straight into the readback registers
    Raw = 0,
    /// Median of the last three measurements
    Median = 1,
    /// Median + EMA over the full 0..256 range
    Paddle = 2,
    /// Median + EMA with wrap-around over 64..192
    Mouse = 3,
}

impl PaddleFilter {
    /// Decode the low nibble; unknown modes smooth like paddles
    pub fn from_config(value: u8) -> Self {
        PaddleFilter::from_u8(value & 15).unwrap_or(PaddleFilter::Paddle)
    }
}

/// Read-bus and phi2 delay-loop counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusDelays {
    /// Delay before latching write data
    pub read_bus: u8,
    /// Delay after the phi2 edge before sampling the bus
    pub phi2: u8,
}

impl Default for BusDelays {
    fn default() -> Self {
        BusDelays {
            read_bus: 3,
            phi2: 12,
        }
    }
}

/// Bus-side working settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusSettings {
    /// Chip B address selection
    pub second_chip: SecondChipAddress,
    /// Chip B kind
    pub chip_b: ChipKind,
    /// Chip B mirrors chip A (pseudo-stereo)
    pub mirror: bool,
    /// Paddle filter mode
    pub paddle_filter: PaddleFilter,
    /// Paddle outlier rejection level (0..=3)
    pub outlier_rejection: u8,
    /// Paddle lines use pull-downs
    pub pot_pulldown: bool,
    /// Digi-playback detection enabled
    pub digi_detect: bool,
    /// Calibrated bus delays
    pub delays: BusDelays,
}

impl BusSettings {
    /// FM mode of chip B (0 off, 1 write-only, 2 with status)
    pub fn fm_mode(&self) -> u8 {
        self.chip_b.fm_mode()
    }

    /// Chip B has an address of its own
    pub fn chip_b_addressable(&self) -> bool {
        self.second_chip != SecondChipAddress::Mirror
    }
}

/// Output mix levels (16.16 fixed-point gains)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MixLevels {
    /// Chip A to left
    pub a_left: i32,
    /// Chip A to right
    pub a_right: i32,
    /// Chip B (or FM) to left
    pub b_left: i32,
    /// Chip B (or FM) to right
    pub b_right: i32,
}

impl MixLevels {
    /// 14 volume steps times 15 balance steps
    const MAX_VOLUME_FACTOR: i32 = 14 * 15;
    const GLOBAL_VOLUME: i32 = 256;

    /// Derive gains from volume, panning and balance
    pub fn from_config(config: &ConfigBlock) -> Self {
        let single_chip = config.sid2_kind() == ChipKind::None;
        let panning = if single_chip {
            7
        } else {
            config.get(index::PANNING) as i32
        };

        let vol1 = config.get(index::SID1_VOLUME) as i32;
        let vol2 = config.get(index::SID2_VOLUME) as i32;

        let (b_left, b_right) = if single_chip {
            (0, 0)
        } else {
            (vol2 * panning, vol2 * (14 - panning))
        };

        let balance = config.get(index::BALANCE) as i32;
        let mut balance_left = 256;
        let mut balance_right = 256;
        if balance < 7 {
            balance_right -= (7 - balance) * 32;
        }
        if balance > 7 {
            balance_left -= (balance - 7) * 32;
        }

        let scale = |level: i32, balance: i32| {
            level * balance * Self::GLOBAL_VOLUME / Self::MAX_VOLUME_FACTOR
        };

        MixLevels {
            a_left: scale(vol1 * (14 - panning), balance_left),
            a_right: scale(vol1 * panning, balance_right),
            b_left: scale(b_left, balance_left),
            b_right: scale(b_right, balance_right),
        }
    }

    /// Mix two chip outputs into a stereo pair
    #[inline]
    pub fn mix(&self, a: i32, b: i32) -> (i16, i16) {
        let left = (a as i64 * self.a_left as i64 + b as i64 * self.b_left as i64) >> 16;
        let right = (a as i64 * self.a_right as i64 + b as i64 * self.b_right as i64) >> 16;
        (
            left.clamp(i16::MIN as i64, i16::MAX as i64) as i16,
            right.clamp(i16::MIN as i64, i16::MAX as i64) as i16,
        )
    }
}

/// Engine-side working settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Host clock in Hz
    pub host_clock: u32,
    /// Chip A variant
    pub chip_a: ChipVariant,
    /// Chip B variant
    pub chip_b: ChipVariant,
    /// Chip B kind
    pub chip_b_kind: ChipKind,
    /// Chip B address selection
    pub second_chip: SecondChipAddress,
    /// Chip A events are also written to chip B
    pub mirror: bool,
    /// FM mode of chip B
    pub fm_mode: u8,
    /// Output gains
    pub mix: MixLevels,
    /// Digi-playback injection enabled
    pub digi_detect: bool,
    /// Paddle filter mode
    pub paddle_filter: PaddleFilter,
}

/// The 64-byte configuration block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigBlock {
    bytes: [u8; CONFIG_SIZE],
}

impl ConfigBlock {
    /// Factory defaults with a valid checksum
    pub fn defaults() -> Self {
        let mut bytes = [0u8; CONFIG_SIZE];
        bytes[index::SID1_TYPE] = ChipKind::Mos8580 as u8;
        bytes[index::SID2_TYPE] = ChipKind::None as u8;
        bytes[index::REGISTER_READ] = 1;
        bytes[index::SID2_ADDRESS] = SecondChipAddress::Mirror as u8;
        bytes[index::SID1_DIGIBOOST] = 12;
        bytes[index::SID2_DIGIBOOST] = 12;
        bytes[index::SID1_VOLUME] = 14;
        bytes[index::SID2_VOLUME] = 14;
        bytes[index::PANNING] = 5;
        bytes[index::BALANCE] = 7;
        bytes[index::CLOCKSPEED] = 0;
        bytes[index::POT_FILTER] = 16;
        bytes[index::DIGIDETECT] = 0;
        bytes[index::TRIGGER] = 0;
        let mut block = ConfigBlock { bytes };
        block.seal();
        block
    }

    /// Factory defaults with the fallback bus timing preset
    pub fn factory_reset() -> Self {
        let mut block = Self::defaults();
        block.bytes[index::USE_TIMINGS] = 4;
        block.bytes[index::CUSTOM_TIMING_READBUS] = 3;
        block.bytes[index::CUSTOM_TIMING_PHI2] = 12;
        block.seal();
        block
    }

    /// Wrap raw bytes without checking them
    pub fn from_bytes(bytes: [u8; CONFIG_SIZE]) -> Self {
        ConfigBlock { bytes }
    }

    /// Wrap raw bytes, rejecting an erased block or a checksum mismatch
    pub fn validated(bytes: [u8; CONFIG_SIZE]) -> Result<Self> {
        if bytes[0] == 0xFF {
            return Err(BridgeError::ConfigIntegrity("configuration block erased".into()));
        }
        let block = ConfigBlock { bytes };
        let stored = block.stored_crc();
        let computed = crc16(&bytes[..CRC_COVERED]);
        if stored != computed {
            return Err(BridgeError::ConfigIntegrity(format!(
                "checksum mismatch: stored {stored:#06x}, computed {computed:#06x}"
            )));
        }
        Ok(block)
    }

    /// Validate, falling back to factory defaults
    pub fn load_or_default(bytes: [u8; CONFIG_SIZE]) -> Self {
        Self::validated(bytes).unwrap_or_else(|e| {
            log::warn!("{e}, using factory defaults");
            Self::defaults()
        })
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; CONFIG_SIZE] {
        &self.bytes
    }

    /// Byte at `index` (taken modulo 64)
    #[inline]
    pub fn get(&self, index: usize) -> u8 {
        self.bytes[index & (CONFIG_SIZE - 1)]
    }

    /// Set the byte at `index` (taken modulo 64); the checksum is not updated
    #[inline]
    pub fn set(&mut self, index: usize, value: u8) {
        self.bytes[index & (CONFIG_SIZE - 1)] = value;
    }

    /// Recompute and store the checksum
    pub fn seal(&mut self) {
        let crc = crc16(&self.bytes[..CRC_COVERED]);
        self.bytes[index::CRC_LOW..=index::CRC_HIGH].copy_from_slice(&crc.to_le_bytes());
    }

    /// Stored checksum
    pub fn stored_crc(&self) -> u16 {
        u16::from_le_bytes([self.bytes[index::CRC_LOW], self.bytes[index::CRC_HIGH]])
    }

    /// True when the stored checksum matches the contents
    pub fn is_sealed(&self) -> bool {
        self.stored_crc() == crc16(&self.bytes[..CRC_COVERED])
    }

    /// Chip A kind
    pub fn sid1_kind(&self) -> ChipKind {
        ChipKind::from_config(self.get(index::SID1_TYPE))
    }

    /// Chip B kind
    pub fn sid2_kind(&self) -> ChipKind {
        ChipKind::from_config(self.get(index::SID2_TYPE))
    }

    /// Chip B address selection
    pub fn second_chip_address(&self) -> SecondChipAddress {
        SecondChipAddress::from_config(self.get(index::SID2_ADDRESS))
    }

    /// Host clock in Hz
    pub fn host_clock(&self) -> u32 {
        HOST_CLOCKS[self.get(index::CLOCKSPEED) as usize % HOST_CLOCKS.len()]
    }

    /// Digi-playback detection enabled
    pub fn digi_detect(&self) -> bool {
        self.get(index::DIGIDETECT) != 0
    }

    /// Pseudo-stereo: chip B shares chip A's address
    pub fn mirror(&self) -> bool {
        self.second_chip_address() == SecondChipAddress::Mirror && self.sid2_kind().is_sid()
    }

    /// Effective bus delays: the custom values when enabled, else `stored`
    pub fn bus_delays(&self, stored: BusDelays) -> BusDelays {
        if self.get(index::USE_TIMINGS) != 0 {
            BusDelays {
                read_bus: self.get(index::CUSTOM_TIMING_READBUS),
                phi2: self.get(index::CUSTOM_TIMING_PHI2),
            }
        } else {
            stored
        }
    }

    /// Switch to the next bus timing preset (re-sealed)
    pub fn advance_timing_preset(&mut self) {
        let (id, read_bus, phi2) = TIMING_PRESETS[(self.get(index::USE_TIMINGS) & 3) as usize];
        self.bytes[index::USE_TIMINGS] = id;
        self.bytes[index::CUSTOM_TIMING_READBUS] = read_bus;
        self.bytes[index::CUSTOM_TIMING_PHI2] = phi2;
        self.seal();
    }

    /// Derive the bus-side settings
    pub fn bus_settings(&self, stored_delays: BusDelays) -> BusSettings {
        let pot_filter = self.get(index::POT_FILTER);
        BusSettings {
            second_chip: self.second_chip_address(),
            chip_b: self.sid2_kind(),
            mirror: self.mirror(),
            paddle_filter: PaddleFilter::from_config(pot_filter),
            outlier_rejection: (pot_filter >> 4) & 3,
            pot_pulldown: pot_filter & 64 != 0,
            digi_detect: self.digi_detect(),
            delays: self.bus_delays(stored_delays),
        }
    }

    /// Derive the engine-side settings
    pub fn engine_settings(&self) -> EngineSettings {
        let chip_b_kind = self.sid2_kind();
        EngineSettings {
            host_clock: self.host_clock(),
            chip_a: ChipVariant::from_kind(self.sid1_kind(), self.get(index::SID1_DIGIBOOST)),
            chip_b: ChipVariant::from_kind(chip_b_kind, self.get(index::SID2_DIGIBOOST)),
            chip_b_kind,
            second_chip: self.second_chip_address(),
            mirror: self.mirror(),
            fm_mode: chip_b_kind.fm_mode(),
            mix: MixLevels::from_config(self),
            digi_detect: self.digi_detect(),
            paddle_filter: PaddleFilter::from_config(self.get(index::POT_FILTER)),
        }
    }
}

impl Default for ConfigBlock {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_reference_value() {
        // CRC-16/CCITT-FALSE check value
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_defaults_are_sealed() {
        let block = ConfigBlock::defaults();
        assert!(block.is_sealed());
        assert_eq!(block.sid1_kind(), ChipKind::Mos8580);
        assert_eq!(block.sid2_kind(), ChipKind::None);
        assert_eq!(block.host_clock(), 985_248);
        assert!(ConfigBlock::validated(*block.as_bytes()).is_ok());
    }

    #[test]
    fn test_erased_block_falls_back() {
        let block = ConfigBlock::load_or_default([0xFF; CONFIG_SIZE]);
        assert_eq!(block, ConfigBlock::defaults());
    }

    #[test]
    fn test_crc_mismatch_falls_back() {
        let mut bytes = *ConfigBlock::defaults().as_bytes();
        bytes[index::SID1_VOLUME] = 3;
        assert!(matches!(
            ConfigBlock::validated(bytes),
            Err(BridgeError::ConfigIntegrity(_))
        ));
        assert_eq!(ConfigBlock::load_or_default(bytes), ConfigBlock::defaults());
    }

    #[test]
    fn test_timing_presets_cycle() {
        let mut block = ConfigBlock::defaults();
        block.advance_timing_preset();
        assert_eq!(
            block.bus_delays(BusDelays::default()),
            BusDelays { read_bus: 7, phi2: 11 }
        );
        block.advance_timing_preset();
        assert_eq!(block.get(index::USE_TIMINGS), 2);
        block.advance_timing_preset();
        block.advance_timing_preset();
        assert_eq!(block.get(index::USE_TIMINGS), 1);
        assert!(block.is_sealed());
    }

    #[test]
    fn test_stored_delays_without_custom_timing() {
        let block = ConfigBlock::defaults();
        let stored = BusDelays { read_bus: 5, phi2: 9 };
        assert_eq!(block.bus_delays(stored), stored);
        assert_eq!(
            ConfigBlock::factory_reset().bus_delays(stored),
            BusDelays { read_bus: 3, phi2: 12 }
        );
    }

    #[test]
    fn test_single_chip_mix_is_centred() {
        let mix = MixLevels::from_config(&ConfigBlock::defaults());
        assert_eq!(mix.a_left, mix.a_right);
        assert_eq!((mix.b_left, mix.b_right), (0, 0));
    }

    #[test]
    fn test_balance_attenuates_one_side() {
        let mut block = ConfigBlock::defaults();
        block.set(index::BALANCE, 3);
        let mix = MixLevels::from_config(&block);
        assert!(mix.a_right < mix.a_left);
        block.set(index::BALANCE, 11);
        let mix = MixLevels::from_config(&block);
        assert!(mix.a_left < mix.a_right);
    }

    #[test]
    fn test_panning_splits_chips() {
        let mut block = ConfigBlock::defaults();
        block.set(index::SID2_TYPE, ChipKind::Mos6581 as u8);
        block.set(index::SID2_ADDRESS, SecondChipAddress::D420 as u8);
        block.set(index::PANNING, 0);
        let mix = MixLevels::from_config(&block);
        assert_eq!(mix.a_right, 0);
        assert_eq!(mix.b_left, 0);
        assert!(mix.a_left > 0 && mix.b_right > 0);
        assert_eq!(mix.mix(1000, 0).1, 0);
    }

    #[test]
    fn test_mirror_needs_a_sid_on_chip_b() {
        let mut block = ConfigBlock::defaults();
        assert!(!block.mirror());
        block.set(index::SID2_TYPE, ChipKind::Mos6581 as u8);
        assert!(block.mirror());
        block.set(index::SID2_ADDRESS, SecondChipAddress::D500 as u8);
        assert!(!block.mirror());
    }

    #[test]
    fn test_pot_filter_fields() {
        let mut block = ConfigBlock::defaults();
        block.set(index::POT_FILTER, 0x63);
        let bus = block.bus_settings(BusDelays::default());
        assert_eq!(bus.paddle_filter, PaddleFilter::Mouse);
        assert_eq!(bus.outlier_rejection, 2);
        assert!(bus.pot_pulldown);
    }

    #[test]
    fn test_address_selection_wraps() {
        assert_eq!(SecondChipAddress::from_config(7), SecondChipAddress::D420);
        assert!(SecondChipAddress::Df00.is_io_expansion());
        assert_eq!(
            SecondChipAddress::D520.alias_lines(),
            BusLines::A5 | BusLines::A8
        );
    }

    #[test]
    fn test_fm_modes() {
        assert_eq!(ChipKind::FmWithStatus.fm_mode(), 2);
        assert_eq!(ChipKind::Fm.fm_mode(), 1);
        assert_eq!(ChipKind::from_config(200), ChipKind::Mos8580);
    }
}
