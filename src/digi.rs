//! Digi-Playback Detection
//!
//! Per-voice automata recognizing two register idioms that smuggle 8-bit
//! PCM samples through the chip:
//!
//! - **Test-bit**: control writes `0x11`, `0x09` (test bit), `0x01`,
//!   interleaved with a frequency-low write carrying the sample.
//! - **Pulse-width**: control writes `0x49`/`0x41` around a pulse-width-low
//!   write carrying the sample.
//!
//! The detector runs in the bus sampler on every chip-A write and only
//! advances on the write matching the next expected transition. Any other
//! chip-A write drops the automaton back to idle.

use crate::constants::VOICES;
use crate::timing::BridgeTimings;

/// Registers per voice
const VOICE_STRIDE: u8 = 7;
/// Voice register offsets
const FREQ_LO: u8 = 0;
const PW_LO: u8 = 2;
const CONTROL: u8 = 4;

/// Recognized playback idiom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Technique {
    /// Pulse-width modulation idiom
    PulseWidth = 1,
    /// Test-bit idiom
    TestBit = 2,
}

impl Technique {
    /// Tag OR-ed into the low bits of the injected sample
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Decode a tag
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Technique::PulseWidth),
            2 => Some(Technique::TestBit),
            _ => None,
        }
    }
}

/// A sample recognized on a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigiCapture {
    /// Voice index (0..3)
    pub voice: usize,
    /// Captured 8-bit sample
    pub sample: u8,
    /// Idiom that produced it
    pub technique: Technique,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestBitState {
    Idle,
    Prep,
    Set,
    Var1,
    Var2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PulseState {
    Idle,
    Prep,
    Prep2,
    Conf,
    Conf2,
}

#[derive(Debug, Clone, Copy)]
struct VoiceAutomata {
    test_bit: TestBitState,
    test_bit_since: u64,
    test_bit_sample: u8,
    pulse: PulseState,
    pulse_since: u64,
    pulse_sample: u8,
}

impl VoiceAutomata {
    const IDLE: VoiceAutomata = VoiceAutomata {
        test_bit: TestBitState::Idle,
        test_bit_since: 0,
        test_bit_sample: 0,
        pulse: PulseState::Idle,
        pulse_since: 0,
        pulse_sample: 0,
    };
}

/// Detection windows in host cycles
#[derive(Debug, Clone, Copy)]
struct Windows {
    setup: u64,
    confirm: u64,
    pulse: u64,
}

/// Digi-playback detector for the three voices of one chip
#[derive(Debug, Clone)]
pub struct DigiDetector {
    voices: [VoiceAutomata; VOICES],
    windows: Windows,
}

impl DigiDetector {
    /// Create a detector using the calibrated windows of `timings`
    pub fn new(timings: &BridgeTimings) -> Self {
        DigiDetector {
            voices: [VoiceAutomata::IDLE; VOICES],
            windows: Windows {
                setup: timings.digi_test_bit_setup,
                confirm: timings.digi_test_bit_confirm,
                pulse: timings.digi_pulse_width,
            },
        }
    }

    /// Return every voice to idle
    pub fn reset(&mut self) {
        self.voices = [VoiceAutomata::IDLE; VOICES];
    }

    /// Feed one chip-A register write captured at host cycle `now`
    ///
    /// A write outside a voice (another voice or a global register) is never
    /// that voice's next transition, so it drops the voice back to idle.
    pub fn on_write(&mut self, register: u8, value: u8, now: u64) -> Option<DigiCapture> {
        let target = (register < VOICE_STRIDE * VOICES as u8).then(|| (register / VOICE_STRIDE) as usize);
        for (voice, automata) in self.voices.iter_mut().enumerate() {
            if Some(voice) != target {
                *automata = VoiceAutomata::IDLE;
            }
        }
        let Some(voice) = target else {
            return None;
        };
        let offset = register % VOICE_STRIDE;

        let test_bit = self.test_bit(voice, offset, value, now);
        let pulse = self.pulse(voice, offset, value, now);
        test_bit.or(pulse)
    }

    fn test_bit(&mut self, voice: usize, offset: u8, value: u8, now: u64) -> Option<DigiCapture> {
        let windows = self.windows;
        let v = &mut self.voices[voice];
        let within = |since: u64, window: u64| now.saturating_sub(since) < window;

        let mut captured = None;
        let next = match (offset, v.test_bit) {
            (CONTROL, state) => match value & 0x19 {
                0x11 => {
                    v.test_bit_since = now;
                    TestBitState::Prep
                }
                0x08 | 0x09 if state == TestBitState::Prep && within(v.test_bit_since, windows.setup) => {
                    v.test_bit_since = now.saturating_sub(4);
                    TestBitState::Set
                }
                0x01 if state == TestBitState::Set && within(v.test_bit_since, windows.confirm) => {
                    TestBitState::Var1
                }
                0x01 | 0x00
                    if state == TestBitState::Var2 && within(v.test_bit_since, windows.confirm) =>
                {
                    captured = Some(v.test_bit_sample);
                    TestBitState::Idle
                }
                _ => TestBitState::Idle,
            },
            (FREQ_LO, TestBitState::Set) if within(v.test_bit_since, windows.confirm) => {
                v.test_bit_sample = value;
                v.test_bit_since = now;
                TestBitState::Var2
            }
            (FREQ_LO, TestBitState::Var1) if within(v.test_bit_since, windows.confirm) => {
                captured = Some(value);
                TestBitState::Idle
            }
            _ => TestBitState::Idle,
        };
        v.test_bit = next;

        captured.map(|sample| DigiCapture {
            voice,
            sample,
            technique: Technique::TestBit,
        })
    }

    fn pulse(&mut self, voice: usize, offset: u8, value: u8, now: u64) -> Option<DigiCapture> {
        let window = self.windows.pulse;
        let v = &mut self.voices[voice];
        let within = now.saturating_sub(v.pulse_since) < window;

        let mut captured = None;
        let next = match offset {
            CONTROL => match value & 0x49 {
                0x49 => {
                    let next = if v.pulse == PulseState::Prep && within {
                        PulseState::Conf
                    } else {
                        PulseState::Prep2
                    };
                    v.pulse_since = now;
                    next
                }
                0x41 if matches!(v.pulse, PulseState::Conf | PulseState::Conf2) && within => {
                    captured = Some(v.pulse_sample);
                    PulseState::Idle
                }
                _ => PulseState::Idle,
            },
            PW_LO => {
                let next = if v.pulse == PulseState::Prep2 && within {
                    PulseState::Conf2
                } else {
                    PulseState::Prep
                };
                v.pulse_since = now;
                v.pulse_sample = value;
                next
            }
            _ => PulseState::Idle,
        };
        v.pulse = next;

        captured.map(|sample| DigiCapture {
            voice,
            sample,
            technique: Technique::PulseWidth,
        })
    }
}
