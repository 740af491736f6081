//! Paddle and Mouse Sampling
//!
//! The host measures paddles by discharging the POT lines and timing how
//! long they take to charge back. The bridge does the same on its own
//! 256-cycle frame: the first half of each frame pair discharges the lines,
//! the second measures the cycle at which each line first reads high.
//!
//! [`PaddleSampler`] runs on the bus side, once per host cycle.
//! [`PaddleSmoother`] runs in the engine and turns raw measurements into the
//! 0x19/0x1A readback values (median, paddle EMA or mouse EMA).

use crate::bus::BusLines;
use crate::config::PaddleFilter;

/// Lower bound of a plausible measurement when outlier rejection is strict
const PLAUSIBLE_MIN: u8 = 64 - 8;
/// Upper bound of a plausible measurement when outlier rejection is strict
const PLAUSIBLE_MAX: u8 = 192 + 8;
/// Frames skipped after a rejected measurement
const REJECT_SKIP: u8 = 2;

/// Pending-line bits of the measure phase
const PENDING_X: u8 = 0b001;
const PENDING_Y: u8 = 0b010;
const MEASURING: u8 = 0b100;

/// What the bus sampler has to do after a paddle clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddleAction {
    /// Nothing
    Idle,
    /// Pull the pot lines low; carries the finished measurement unless the
    /// frame was rejected
    Discharge(Option<(u8, u8)>),
    /// Let the pot lines charge
    Release,
}

/// Bus-side measurement state machine
#[derive(Debug, Clone)]
pub struct PaddleSampler {
    cycle: u8,
    state: u8,
    candidate: [u8; 2],
    skip: u8,
}

impl PaddleSampler {
    /// Sampler at the start of a discharge frame
    pub fn new() -> Self {
        PaddleSampler {
            cycle: 0,
            state: 0,
            candidate: [128, 128],
            skip: 0,
        }
    }

    /// Discard the next `frames` measurements
    pub fn skip_measurements(&mut self, frames: u8) {
        self.skip = frames;
    }

    /// Last raw candidates (x, y)
    pub fn candidates(&self) -> (u8, u8) {
        (self.candidate[0], self.candidate[1])
    }

    /// Advance one host cycle with the line levels seen in it
    ///
    /// `rejection` is the outlier-rejection level: 1 enables the mid-frame
    /// relapse check, 2 and up also rejects implausible values.
    pub fn clock(&mut self, lines: BusLines, rejection: u8) -> PaddleAction {
        let action = if self.cycle == 0 {
            self.frame_boundary(rejection)
        } else {
            if self.state & MEASURING != 0 {
                self.measure(lines, rejection);
            }
            PaddleAction::Idle
        };
        self.cycle = self.cycle.wrapping_add(1);
        action
    }

    fn frame_boundary(&mut self, rejection: u8) -> PaddleAction {
        if self.state & MEASURING == 0 {
            self.state = MEASURING | PENDING_X | PENDING_Y;
            return PaddleAction::Release;
        }

        self.state = 0;
        let implausible = |v: u8| !(PLAUSIBLE_MIN..=PLAUSIBLE_MAX).contains(&v);
        if rejection > 1 && self.candidate.iter().any(|&v| implausible(v)) {
            self.skip = REJECT_SKIP;
        }

        if self.skip > 0 {
            self.skip -= 1;
            PaddleAction::Discharge(None)
        } else {
            PaddleAction::Discharge(Some(self.candidates()))
        }
    }

    fn measure(&mut self, lines: BusLines, rejection: u8) {
        let last = self.cycle == 255;
        if self.state & PENDING_X != 0 && (lines.contains(BusLines::POT_X) || last) {
            self.candidate[0] = self.cycle;
            self.state &= !PENDING_X;
        }

        if self.state & PENDING_Y != 0 && (lines.contains(BusLines::POT_Y) || last) {
            self.candidate[1] = self.cycle;
            self.state &= !PENDING_Y;
        } else if rejection > 0 {
            // A line that already charged must not read low again halfway to the end
            let relapsed = |pending: u8, line: BusLines, candidate: u8| {
                self.state & pending == 0
                    && !lines.contains(line)
                    && self.cycle == ((candidate as u16 + 255) >> 1) as u8
            };
            if relapsed(PENDING_X, BusLines::POT_X, self.candidate[0])
                || relapsed(PENDING_Y, BusLines::POT_Y, self.candidate[1])
            {
                self.skip = REJECT_SKIP;
            }
        }
    }
}

impl Default for PaddleSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// EMA weight of a new measurement (out of 256)
const EMA: i32 = 6;

/// Engine-side filter over paddle measurements
#[derive(Debug, Clone)]
pub struct PaddleSmoother {
    history: [[u8; 3]; 2],
    next: usize,
    smooth: [i32; 2],
}

impl PaddleSmoother {
    /// Smoother centered on mid position
    pub fn new() -> Self {
        PaddleSmoother {
            history: [[128; 3]; 2],
            next: 0,
            smooth: [128 << 8; 2],
        }
    }

    /// Feed one measurement. Returns the new readback values, if any.
    pub fn update(&mut self, filter: PaddleFilter, x: u8, y: u8) -> Option<(u8, u8)> {
        if filter == PaddleFilter::Raw {
            return Some((x, y));
        }

        self.history[0][self.next] = x;
        self.history[1][self.next] = y;
        self.next = (self.next + 1) % 3;
        let median = [median(&self.history[0]), median(&self.history[1])];

        if filter == PaddleFilter::Median {
            return Some((median[0], median[1]));
        }

        let (low, range) = match filter {
            PaddleFilter::Mouse => (64, 128 << 8),
            _ => (0, 256 << 8),
        };
        for (smooth, &value) in self.smooth.iter_mut().zip(median.iter()) {
            *smooth = ema_wrapped(*smooth, value, low, range);
        }
        Some(((self.smooth[0] >> 8) as u8, (self.smooth[1] >> 8) as u8))
    }
}

impl Default for PaddleSmoother {
    fn default() -> Self {
        Self::new()
    }
}

/// Median of three
fn median(x: &[u8; 3]) -> u8 {
    let sum: u16 = x.iter().map(|&v| v as u16).sum();
    let min = *x.iter().min().unwrap_or(&0) as u16;
    let max = *x.iter().max().unwrap_or(&0) as u16;
    (sum - min - max) as u8
}

/// One EMA step over a value range that wraps around (mouse counters)
fn ema_wrapped(smooth: i32, value: u8, low: i32, range: i32) -> i32 {
    let mut new = (value as i32 - low) << 8;
    let mut old = smooth - (low << 8);

    if new - old > range / 2 {
        old += range;
    } else if old - new > range / 2 {
        new += range;
    }

    let mut mixed = (old * (256 - EMA) + new * EMA) >> 8;
    if mixed >= range {
        mixed -= range;
    }
    mixed + (low << 8)
}
