//! Scripted host bus for host-side tests
//!
//! A script is a list of host cycles. Each cycle may carry one access
//! (read or write) plus the RESET level. Once the script is exhausted the
//! bus idles forever, so a sampler can be stepped past the end safely.
//!
//! Paddle lines are simulated as RC charge times: after the sampler
//! releases the pot lines, POT_X/POT_Y read high once the configured number
//! of cycles has elapsed.

use super::{BusLines, BusPort, BusSnapshot, Phase};

/// A byte the bridge drove onto the data lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrivenByte {
    /// Script cycle index the byte answered
    pub cycle: usize,
    /// Register address that was read
    pub address: u8,
    /// Value driven
    pub value: u8,
}

#[derive(Debug, Clone, Copy)]
struct SimCycle {
    lines: BusLines,
    address: u8,
    data: u8,
}

/// Scripted [`BusPort`] implementation
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    script: Vec<SimCycle>,
    /// Index of the current cycle (`None` before the first low phase)
    current: Option<usize>,
    phase: Phase,
    driving: bool,
    driven: Vec<DrivenByte>,
    idle_lines: BusLines,
    pot_charge: Option<(u32, u32)>,
    pot_discharging: bool,
    cycles_since_release: u32,
    discharge_events: usize,
    audio_levels: Vec<u16>,
}

impl SimulatedBus {
    /// Create an empty script. Idle cycles keep A8 high (no IOx select).
    pub fn new() -> Self {
        SimulatedBus {
            script: Vec::new(),
            current: None,
            phase: Phase::High,
            driving: false,
            driven: Vec::new(),
            idle_lines: BusLines::A8,
            pot_charge: None,
            pot_discharging: false,
            cycles_since_release: 0,
            discharge_events: 0,
            audio_levels: Vec::new(),
        }
    }

    /// Simulate paddles whose lines charge after `x` and `y` cycles
    pub fn with_paddles(mut self, x: u32, y: u32) -> Self {
        self.pot_charge = Some((x, y));
        self
    }

    /// Change the simulated paddle charge times
    pub fn set_paddles(&mut self, x: u32, y: u32) {
        self.pot_charge = Some((x, y));
    }

    /// Append `count` cycles without a bridge access
    pub fn idle(&mut self, count: usize) -> &mut Self {
        let idle = SimCycle {
            lines: self.idle_lines | BusLines::READ,
            address: 0,
            data: 0,
        };
        self.script.extend(std::iter::repeat(idle).take(count));
        self
    }

    /// Append cycles with RESET held
    pub fn hold_reset(&mut self, count: usize) -> &mut Self {
        let held = SimCycle {
            lines: self.idle_lines | BusLines::READ | BusLines::RESET,
            address: 0,
            data: 0,
        };
        self.script.extend(std::iter::repeat(held).take(count));
        self
    }

    /// Append a write through the primary chip select
    pub fn write(&mut self, address: u8, value: u8) -> &mut Self {
        self.write_with(BusLines::CHIP_SELECT, address, value)
    }

    /// Append a read through the primary chip select
    pub fn read(&mut self, address: u8) -> &mut Self {
        self.read_with(BusLines::CHIP_SELECT, address)
    }

    /// Append a write with explicit select/address lines
    pub fn write_with(&mut self, lines: BusLines, address: u8, value: u8) -> &mut Self {
        self.script.push(SimCycle {
            lines: lines - BusLines::READ,
            address: address & 0x1F,
            data: value,
        });
        self
    }

    /// Append a read with explicit select/address lines
    pub fn read_with(&mut self, lines: BusLines, address: u8) -> &mut Self {
        self.script.push(SimCycle {
            lines: lines | BusLines::READ,
            address: address & 0x1F,
            data: 0,
        });
        self
    }

    /// Number of scripted cycles
    pub fn len(&self) -> usize {
        self.script.len()
    }

    /// True when no cycles are scripted
    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    /// True once every scripted cycle has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.current.map_or(self.script.is_empty(), |c| c + 1 >= self.script.len())
    }

    /// Every byte the bridge drove, in order
    pub fn driven(&self) -> &[DrivenByte] {
        &self.driven
    }

    /// Values driven, without cycle/address information
    pub fn driven_values(&self) -> Vec<u8> {
        self.driven.iter().map(|d| d.value).collect()
    }

    /// Value driven in answer to script cycle `cycle`, if any
    pub fn response_at(&self, cycle: usize) -> Option<u8> {
        self.driven
            .iter()
            .find(|d| d.cycle == cycle)
            .map(|d| d.value)
    }

    /// Number of times the pot lines were switched to discharge
    pub fn discharge_events(&self) -> usize {
        self.discharge_events
    }

    /// Analog output levels pushed by the bridge
    pub fn audio_levels(&self) -> &[u16] {
        &self.audio_levels
    }

    fn cycle(&self) -> SimCycle {
        let idle = SimCycle {
            lines: self.idle_lines | BusLines::READ,
            address: 0,
            data: 0,
        };
        self.current
            .and_then(|c| self.script.get(c).copied())
            .unwrap_or(idle)
    }

    fn pot_lines(&self) -> BusLines {
        let mut lines = BusLines::empty();
        if let Some((x, y)) = self.pot_charge {
            if !self.pot_discharging {
                if self.cycles_since_release >= x {
                    lines |= BusLines::POT_X;
                }
                if self.cycles_since_release >= y {
                    lines |= BusLines::POT_Y;
                }
            }
        }
        lines
    }

    fn snapshot(&self) -> BusSnapshot {
        let cycle = self.cycle();
        let mut lines = cycle.lines | self.pot_lines();
        match self.phase {
            Phase::Low => {
                lines -= BusLines::PHI2;
                BusSnapshot {
                    lines,
                    address: cycle.address,
                    data: 0,
                }
            }
            Phase::High => {
                lines |= BusLines::PHI2;
                BusSnapshot {
                    lines,
                    address: cycle.address,
                    data: if lines.contains(BusLines::READ) { 0 } else { cycle.data },
                }
            }
        }
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusPort for SimulatedBus {
    fn wait_for_phase(&mut self, phase: Phase) -> BusSnapshot {
        if phase == Phase::Low && self.phase == Phase::High {
            self.current = Some(self.current.map_or(0, |c| c + 1));
            if !self.pot_discharging {
                self.cycles_since_release = self.cycles_since_release.saturating_add(1);
            }
        }
        self.phase = phase;
        self.snapshot()
    }

    fn sample(&mut self) -> BusSnapshot {
        self.snapshot()
    }

    fn drive_data(&mut self, value: u8) {
        self.driving = true;
        let cycle = self.cycle();
        self.driven.push(DrivenByte {
            cycle: self.current.unwrap_or(0),
            address: cycle.address,
            value,
        });
    }

    fn release_data(&mut self) {
        self.driving = false;
    }

    fn delay(&mut self, _iterations: u8) {}

    fn set_pot_discharge(&mut self, discharge: bool) {
        if discharge && !self.pot_discharging {
            self.discharge_events += 1;
        }
        if !discharge && self.pot_discharging {
            self.cycles_since_release = 0;
        }
        self.pot_discharging = discharge;
    }

    fn set_audio_level(&mut self, level: u16) {
        self.audio_levels.push(level);
    }
}
