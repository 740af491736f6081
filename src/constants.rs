//! Bridge Hardware Constants
//!
//! Register indices, sentinel values and audio scaling constants shared by
//! the bus sampler and the emulation engine.

/// Number of registers in the host-visible window (5 address lines)
pub const REGISTER_COUNT: usize = 32;

/// Paddle X readback register
pub const REG_POT_X: u8 = 0x19;
/// Paddle Y readback register
pub const REG_POT_Y: u8 = 0x1A;
/// Oscillator 3 readback register
pub const REG_OSC3: u8 = 0x1B;
/// Envelope 3 readback register
pub const REG_ENV3: u8 = 0x1C;
/// Master volume / filter mode register (also the left/mono DAC latch)
pub const REG_VOLUME: u8 = 0x18;

/// First register of the top-of-range redirect window
pub const REG_REDIRECT_FIRST: u8 = 0x1D;
/// Mode register; sentinel writes switch protocols
pub const REG_MODE: u8 = 0x1F;

/// Bytes served from 0x1D..=0x1F: `JMP $D400`
pub const REDIRECT_CODE: [u8; 3] = [0x4C, 0x00, 0xD4];

/// Mode-register sentinels
pub mod sentinel {
    /// Enter CONFIGURATION
    pub const CONFIGURE: u8 = 0xFF;
    /// DAC passthrough, mono 8-bit
    pub const DAC_MONO8: u8 = 0xFC;
    /// DAC passthrough, stereo 8-bit
    pub const DAC_STEREO8: u8 = 0xFB;
    /// DAC passthrough off
    pub const DAC_OFF: u8 = 0xFA;
    /// Soft reboot (only honoured in mono 8-bit DAC mode)
    pub const REBOOT: u8 = 0xF9;
}

/// Output sample rate of the audio path
pub const AUDIO_RATE: u32 = 44_100;

/// PWM wrap value of the on-board analog output
pub const AUDIO_VALS: i32 = 2834;

/// Effective resolution used for the status brightness computation
pub const AUDIO_BITS: u32 = 11;

/// Fixed-point resolution of the de-click ramp
pub const RAMP_BITS: u32 = 14;

/// Ramp length in ramp units
pub const RAMP_LENGTH: i32 = 1 << RAMP_BITS;

/// Host clock frequencies selectable through the configuration block
/// (PAL, NTSC, old NTSC)
pub const HOST_CLOCKS: [u32; 3] = [985_248, 1_022_727, 1_023_440];

/// Value returned by the SID model probe for a 6581
pub const MODEL_DETECT_6581: u8 = 3;
/// Value returned by the SID model probe for an 8580
pub const MODEL_DETECT_8580: u8 = 2;

/// Number of voices per chip
pub const VOICES: usize = 3;

/// Size of the program working buffer and of one repository slot
pub const PROGRAM_BUFFER_SIZE: usize = 65_536;

/// Number of program slots in the directory
pub const PROGRAM_SLOTS: usize = 16;

/// Size of one directory entry: 18-byte name, 4-byte offset, 2-byte length
pub const DIRECTORY_ENTRY_SIZE: usize = 24;

/// Directory image size (entries plus terminator)
pub const DIRECTORY_SIZE: usize = PROGRAM_SLOTS * DIRECTORY_ENTRY_SIZE + 1;

/// Length of a program name stored at the end of an uploaded payload
pub const PROGRAM_NAME_LEN: usize = 18;

/// Host load address forced onto uploaded programs ($0801, BASIC start)
pub const BASIC_START: u16 = 0x0801;

/// Version and capability string served in CONFIGURATION mode
///
/// Twenty display bytes, then the signature, extension version, firmware
/// version (0.22) and the supported DAC modes.
pub const VERSION_STRING: [u8; 36] = [
    0x53, 0x4B, 0x10, 0x09, 0x03, 0x0F, b'0', b'.', b'2', b'2', b'/', 0x50, 0x57, 0x4D, b'6',
    b'4', 0, 0, 0, 0, // display string
    0x53, 0x4B, 0x10, 0x09, 0x03, 0x0F, 0x00, 0x00, // signature + extension version
    0, 22, // firmware version
    0x01 | 0x02, // mono8 | stereo8 DAC support
    0, 0, 0, 0, 0,
];
