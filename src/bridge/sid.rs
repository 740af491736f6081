//! SID communication mode
//!
//! Reads are answered from the shadow registers (readback registers
//! 0x19..=0x1C), the armed model probe, the redirect bytes at the top of
//! the window, or the decaying open-bus value. Writes become command
//! events, except for the mode register whose sentinels switch protocols
//! and DAC passthrough.

use super::{decode_chip, BusSampler, LAUNCH_BUDGET};
use crate::bus::{BusLines, BusPort, BusSnapshot};
use crate::constants::{
    sentinel, REDIRECT_CODE, REG_ENV3, REG_MODE, REG_OSC3, REG_POT_X, REG_POT_Y,
    REG_REDIRECT_FIRST,
};
use crate::paddle::PaddleAction;
use crate::queue::{CommandEvent, TargetChip};
use crate::registers::ChipId;
use crate::shared::{DacMode, RebootKind};

/// Model probe arming write
const PROBE_REGISTER: u8 = 0x12;
const PROBE_VALUE: u8 = 0x20;

/// Cap of the short reset-hold counter
const RESET_HELD_CAP: u32 = 30_000;

/// Reset-line hold counters
#[derive(Debug, Clone, Default)]
pub(super) struct ResetSupervisor {
    held: u32,
    total: u32,
}

impl ResetSupervisor {
    pub(super) fn clear_total(&mut self) {
        self.total = 0;
    }
}

/// FM chip state kept on the bus side
#[derive(Debug, Clone, Default)]
pub(super) struct FmBusState {
    /// Register address latched by the last port-0 write
    address: u8,
    /// Sample-trick enable bits
    hack_enable: u8,
    hack_values: [u8; 2],
    /// Timer detection sequence progress
    detect_step: u8,
    /// Fake status byte
    status: u8,
}

impl<B: BusPort> BusSampler<B> {
    /// Low-phase reset supervision
    pub(super) fn supervise_reset(&mut self, held: bool) {
        let r = &mut self.reset;
        if held {
            self.launch_budget = LAUNCH_BUDGET;
            r.total = r.total.saturating_add(1);
            if r.held < RESET_HELD_CAP {
                r.held += 1;
            }
            if r.held > self.timings.reset_fade_after {
                self.shared.request_fade_out();
            }
            return;
        }

        let request = if r.total >= self.timings.factory_reset_after {
            Some(RebootKind::FactoryReset)
        } else if r.total >= self.timings.timing_change_after {
            Some(RebootKind::TimingChange)
        } else if r.held >= self.timings.soft_reset_after {
            Some(RebootKind::Soft)
        } else {
            None
        };
        r.held = 0;
        r.total = 0;

        if let Some(kind) = request {
            log::warn!("reset released, requesting {kind:?} reboot");
            self.shared.request_reboot(kind);
        }
    }

    /// High-phase handler in SID communication mode
    pub(super) fn sid_access(&mut self, snapshot: BusSnapshot) {
        if let Some(chip) = decode_chip(&snapshot, self.settings.second_chip) {
            if snapshot.is_read() {
                self.sid_read(chip, &snapshot);
            } else if !self.sid_write(chip, &snapshot) {
                return;
            }
        }
        self.clock_paddles(snapshot.lines);
    }

    fn sid_read(&mut self, chip: ChipId, snapshot: &BusSnapshot) {
        let register = snapshot.register();

        if chip == ChipId::B && self.settings.fm_mode() > 1 {
            let value = if snapshot.lines.contains(BusLines::A5) && register & 0x0F == 0 {
                let status = self.fm.status;
                self.fm.status = 0xC0 - status;
                status
            } else {
                0xFF
            };
            self.drive(value);
            return;
        }

        if chip == ChipId::B && !self.settings.chip_b.is_sid() {
            return;
        }

        let redirect = (register == REG_REDIRECT_FIRST && self.launch_budget > 0)
            || register > REG_REDIRECT_FIRST;
        let value = if redirect {
            self.redirect_reads = self.redirect_reads.saturating_add(1);
            REDIRECT_CODE[(register - REG_REDIRECT_FIRST) as usize]
        } else {
            self.redirect_reads = 0;
            let registers = self.shared.registers();
            if registers.auto_detect_step(chip) == 1 && register == REG_OSC3 {
                registers.set_auto_detect_step(chip, 0);
                registers.model_detect_value(chip)
            } else if (REG_POT_X..=REG_ENV3).contains(&register) {
                registers.readback(chip, register)
            } else {
                self.open_bus
            }
        };
        self.drive(value);
    }

    /// Handle a write. Returns false when the bridge left SID communication.
    fn sid_write(&mut self, chip: ChipId, snapshot: &BusSnapshot) -> bool {
        let data = self.latch_write_data().data;
        let register = snapshot.register();
        self.redirect_reads = 0;

        if register == REG_MODE {
            match data {
                sentinel::CONFIGURE => {
                    self.enter_configuration();
                    return false;
                }
                sentinel::DAC_MONO8 => self.shared.set_dac_mode(DacMode::Mono8),
                sentinel::DAC_STEREO8 => self.shared.set_dac_mode(DacMode::Stereo8),
                sentinel::DAC_OFF => self.shared.set_dac_mode(DacMode::Off),
                sentinel::REBOOT if self.shared.dac_mode() == DacMode::Mono8 => {
                    self.shared.request_reboot(RebootKind::Soft);
                }
                _ => {}
            }
        } else if chip == ChipId::B && self.settings.fm_mode() > 0 {
            self.fm_write(snapshot.lines, register, data);
        } else {
            self.chip_write(chip, register, data);
        }

        self.open_bus = data;
        self.open_bus_ttl = self.timings.open_bus_ttl;
        true
    }

    fn chip_write(&mut self, chip: ChipId, register: u8, value: u8) {
        let dac = chip == ChipId::A && self.shared.dac_mode() != DacMode::Off;
        if dac {
            self.shared.latch_dac(register, value);
        } else {
            let target = match chip {
                ChipId::A => TargetChip::ChipA,
                ChipId::B => TargetChip::ChipB,
            };
            self.producer
                .push(CommandEvent::new(self.host_cycle, target, register, value));
        }

        let registers = self.shared.registers();
        if registers.auto_detect_step(chip) == 0
            && register == PROBE_REGISTER
            && value == PROBE_VALUE
            && [0x12, 0x0E, 0x0F]
                .iter()
                .all(|&r| registers.readback(chip, r) == 0xFF)
        {
            registers.set_auto_detect_step(chip, 1);
        }
        registers.store(chip, register, value);

        if chip == ChipId::A && self.settings.digi_detect && !dac {
            if let Some(capture) = self.digi.on_write(register, value, self.host_cycle) {
                self.shared.publish_digi(&capture, self.host_cycle);
            }
        }
    }

    fn fm_write(&mut self, lines: BusLines, register: u8, value: u8) {
        let data_port = register & 0x10 != 0;

        if lines.contains(BusLines::A5) && register & 0x0F == 0 {
            let fm = &mut self.fm;
            if !data_port {
                fm.address = value;
            } else {
                if fm.address == 1 {
                    fm.hack_enable = if value == 4 { 128 } else { 0 };
                }
                if fm.hack_enable != 0 && matches!(fm.address, 0xA0 | 0xA1) {
                    let slot = (fm.address - 0xA0) as usize;
                    fm.hack_enable |= 1 << slot;
                    fm.hack_values[slot] = value;
                } else {
                    fm.hack_values = [0, 0];
                }
                self.shared.set_fm_hack(fm.hack_enable, fm.hack_values);
            }

            let target = if data_port {
                TargetChip::FmHigh
            } else {
                TargetChip::FmLow
            };
            self.producer
                .push(CommandEvent::new(self.host_cycle, target, register, value));
        }

        // Timer detection: 0x04 <- 0x60, 0x04 <- 0x80 resets the status byte
        let fm = &mut self.fm;
        fm.detect_step = match (data_port, value, fm.detect_step) {
            (false, 0x04, 2) => 3,
            (false, 0x04, _) => 1,
            (true, 0x60, 1) => 2,
            (true, 0x80, 3) => {
                fm.status = 0;
                4
            }
            (_, _, step) => step,
        };
    }

    fn clock_paddles(&mut self, lines: BusLines) {
        match self.paddle.clock(lines, self.settings.outlier_rejection) {
            PaddleAction::Idle => {}
            PaddleAction::Release => self.bus.set_pot_discharge(false),
            PaddleAction::Discharge(measured) => {
                self.bus.set_pot_discharge(true);
                if let Some((x, y)) = measured {
                    if self.settings.paddle_filter == crate::config::PaddleFilter::Raw {
                        let registers = self.shared.registers();
                        registers.store(ChipId::A, REG_POT_X, x);
                        registers.store(ChipId::A, REG_POT_Y, y);
                    } else {
                        self.shared.offer_paddles(x, y);
                    }
                }
            }
        }
    }
}
