//! De-click Ramp
//!
//! Linear crossfade between the output level and a fixed target level,
//! applied to the analog output level. At power-up the output fades in
//! from the bottom of the range; while the host holds RESET it fades to
//! the middle of the range.
//!
//! The ramp weight counts down (fade-in) or up (fade-out) by a constant
//! delta per sample. A finished ramp (weight 0 or full length) is switched
//! off and the level passes through untouched.

use crate::constants::{AUDIO_VALS, RAMP_BITS, RAMP_LENGTH};

/// Ramp step per output sample
const RAMP_STEP: i32 = 4;

/// Crossfade state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeClickRamp {
    /// Weight of `target` in ramp units (0 = inactive)
    weight: i32,
    target: i32,
    delta: i32,
}

impl DeClickRamp {
    /// Power-up fade-in from level 0
    pub fn new() -> Self {
        DeClickRamp {
            weight: RAMP_LENGTH,
            target: 0,
            delta: -RAMP_STEP,
        }
    }

    /// Start fading towards the middle of the output range
    ///
    /// A fade to mid already in progress keeps its position, so the request
    /// can be repeated for as long as the host holds RESET.
    pub fn fade_to_mid(&mut self) {
        if self.is_active() && self.delta > 0 {
            return;
        }
        self.weight = RAMP_STEP;
        self.delta = RAMP_STEP;
        self.target = AUDIO_VALS / 2;
    }

    /// True while a fade is in progress
    pub fn is_active(&self) -> bool {
        self.weight != 0
    }

    /// Blend `level` with the target and advance the ramp
    #[inline]
    pub fn apply(&mut self, level: i32) -> i32 {
        if self.weight == 0 {
            return level;
        }
        let blended = (level * (RAMP_LENGTH - self.weight) + self.weight * self.target) >> RAMP_BITS;

        self.weight += self.delta;
        if self.weight < 0 {
            self.weight = 0;
        }
        if self.weight >= RAMP_LENGTH {
            self.weight = 0;
            self.delta = 0;
        }
        blended
    }
}

impl Default for DeClickRamp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_in_starts_at_zero_and_releases() {
        let mut ramp = DeClickRamp::new();
        assert_eq!(ramp.apply(1000), 0);

        let steps = (RAMP_LENGTH / RAMP_STEP) as usize;
        let mut last = 0;
        for _ in 1..steps {
            let level = ramp.apply(1000);
            assert!(level >= last);
            last = level;
        }
        assert!(!ramp.is_active());
        assert_eq!(ramp.apply(1000), 1000);
    }

    #[test]
    fn test_fade_to_mid_converges() {
        let mut ramp = DeClickRamp::new();
        while ramp.is_active() {
            ramp.apply(0);
        }
        ramp.fade_to_mid();
        let mut level = 0;
        let mut count = 0;
        while ramp.is_active() {
            level = ramp.apply(0);
            count += 1;
        }
        assert_eq!(count, (RAMP_LENGTH / RAMP_STEP) as usize - 1);
        assert!((AUDIO_VALS / 2 - level).abs() <= 1);
    }

    #[test]
    fn test_repeated_fade_request_keeps_progress() {
        let mut ramp = DeClickRamp::new();
        ramp.fade_to_mid();
        for _ in 0..100 {
            ramp.apply(0);
            ramp.fade_to_mid();
        }
        assert_eq!(ramp.weight, RAMP_STEP * 101);

        while ramp.is_active() {
            ramp.apply(0);
        }
        // a finished fade restarts on the next request
        ramp.fade_to_mid();
        assert!(ramp.is_active());
        assert_eq!(ramp.weight, RAMP_STEP);
    }
}
