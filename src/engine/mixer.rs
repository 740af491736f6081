//! Output Stage
//!
//! Turns model outputs into one stereo frame per sample period and derives
//! the two scalars published with it: the analog output level (PWM range
//! `0..AUDIO_VALS`) and the status brightness.
//!
//! Sources, in priority order:
//! - DAC passthrough latches
//! - chip A plus the FM model (or the latched FM sample trick)
//! - chip A plus chip B

use crate::config::MixLevels;
use crate::constants::{AUDIO_BITS, AUDIO_VALS};
use crate::sink::StereoFrame;

/// Output mixer
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputMixer {
    levels: MixLevels,
}

impl OutputMixer {
    /// Mixer using `levels`
    pub fn new(levels: MixLevels) -> Self {
        OutputMixer { levels }
    }

    /// Replace the gains after a configuration change
    pub fn set_levels(&mut self, levels: MixLevels) {
        self.levels = levels;
    }

    /// Mix the primary chip with the second chip or the FM model
    #[inline]
    pub fn mix(&self, primary: i32, secondary: i32) -> StereoFrame {
        let (left, right) = self.levels.mix(primary, secondary);
        StereoFrame::new(left, right)
    }
}

/// Frame from the DAC latch pair
#[inline]
pub fn dac_frame((left, right): (i32, i32)) -> StereoFrame {
    StereoFrame::new(clamp_i16(left), clamp_i16(right))
}

/// FM output replaced by the two latched sample-trick bytes
#[inline]
pub fn fm_trick_sample(values: [u8; 2]) -> i32 {
    ((values[0] as i32) << 5) + ((values[1] as i32) << 5)
}

/// Analog output level of a frame, `0..AUDIO_VALS`
#[inline]
pub fn output_level(frame: StereoFrame) -> i32 {
    let sum = frame.left as i32 + frame.right as i32 + 65_536;
    (sum * AUDIO_VALS) >> 17
}

/// Status brightness of a frame (linear plus quadratic term)
#[inline]
pub fn brightness(frame: StereoFrame) -> u32 {
    let t = (frame.left as i32 + frame.right as i32) >> (1 + 16 - AUDIO_BITS);
    (t.unsigned_abs() << 2) + ((t * t) >> (AUDIO_BITS - 5)) as u32
}

#[inline]
fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
