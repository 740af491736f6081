//! TRANSFER mode: program injection
//!
//! Once the host CPU has fetched `JMP $D400` from the redirect registers it
//! executes straight out of registers 0..=14, which the bridge fills with a
//! tiny copy loop:
//!
//! ```text
//! D400  SEI
//! D401  PHA / PLA
//! D403  LDA #data        ; register 4 = next payload byte
//! D405  PHA / PLA
//! D407  STA dest         ; registers 8/9 = destination, bumped on each read of 9
//! D40A  PHA / PLA
//! D40C  JMP $D401        ; registers 13/14, redirected to the launcher at the end
//! ```
//!
//! The loop first copies the launcher, then the buffered program, and
//! finally jumps into the launcher, at which point the bridge returns to
//! SID communication.

use super::{load_address, BridgeImages, BusSampler};
use crate::bus::{BusPort, BusSnapshot};

/// Registers served in TRANSFER mode
const CODE_LEN: usize = 15;
/// Copy-loop entry
const LOOP_ENTRY: u16 = 0xD401;

const REG_DATA: usize = 4;
const REG_DEST_LO: usize = 8;
const REG_JUMP_LO: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Launcher,
    Program,
}

/// Stage of the copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Copying the launcher
    Launcher,
    /// Launcher done, switching to the program
    Switching,
    /// Copying the program
    Program,
}

#[derive(Debug, Clone)]
pub(super) struct TransferState {
    code: [u8; CODE_LEN],
    stage: Stage,
    source: Source,
    position: usize,
    end: usize,
    launcher_address: u16,
    jump: u16,
}

impl TransferState {
    pub(super) fn new(images: &BridgeImages) -> Self {
        let launcher = images.launcher();
        let first = launcher.get(2).copied().unwrap_or(0);
        let mut state = TransferState {
            code: [
                0x78, 0x48, 0x68, 0xA9, first, 0x48, 0x68, 0x8D, 0, 0, 0x48, 0x68, 0x4C, 0, 0,
            ],
            stage: Stage::Launcher,
            source: Source::Launcher,
            position: 2,
            end: launcher.len(),
            launcher_address: load_address(launcher),
            jump: LOOP_ENTRY,
        };
        state.set_destination(state.launcher_address);
        state.set_jump(LOOP_ENTRY);
        state
    }

    /// Code byte served for `register`
    #[inline]
    pub(super) fn code(&self, register: usize) -> u8 {
        self.code[register]
    }

    fn set_destination(&mut self, address: u16) {
        self.code[REG_DEST_LO..REG_DEST_LO + 2].copy_from_slice(&address.to_le_bytes());
    }

    fn destination(&self) -> u16 {
        u16::from_le_bytes([self.code[REG_DEST_LO], self.code[REG_DEST_LO + 1]])
    }

    fn set_jump(&mut self, address: u16) {
        self.jump = address;
        self.code[REG_JUMP_LO..REG_JUMP_LO + 2].copy_from_slice(&address.to_le_bytes());
    }
}

impl<B: BusPort> BusSampler<B> {
    /// High-phase handler in TRANSFER mode
    pub(super) fn transfer_access(&mut self, snapshot: BusSnapshot) {
        let selected = snapshot.chip_selected();
        let register = snapshot.register() as usize;

        if selected && snapshot.is_read() && register < CODE_LEN {
            // Serve first, then advance
            let value = self.transfer.code(register);
            self.drive(value);
            if self.advance_transfer(register) {
                self.enter_sid_communication();
                return;
            }
        }

        if selected {
            self.mode_timer = self.timings.transfer_mode_cycles as i32;
        }
        self.mode_timer -= 1;
        if self.mode_timer <= 0 || (selected && snapshot.is_write()) {
            self.enter_sid_communication();
        }
    }

    /// Update the copy loop after `register` was read. Returns true once the
    /// host has fetched the jump into the launcher.
    fn advance_transfer(&mut self, register: usize) -> bool {
        let t = &mut self.transfer;
        match register {
            1 => {
                if t.position >= t.end {
                    if t.stage == Stage::Program {
                        let launcher = t.launcher_address;
                        t.set_jump(launcher);
                    } else {
                        t.stage = Stage::Switching;
                    }
                }
            }
            2 => {
                if t.stage == Stage::Switching {
                    t.set_destination(self.program.load_address());
                    t.source = Source::Program;
                    t.position = 2;
                }
            }
            3 => {
                if t.stage == Stage::Switching {
                    t.code[REG_DATA] = self.program.byte(t.position);
                    t.end = self.program.len();
                    t.stage = Stage::Program;
                }
            }
            4 => {
                t.position += 1;
                t.code[REG_DATA] = match t.source {
                    Source::Launcher => self.images.launcher().get(t.position).copied().unwrap_or(0),
                    Source::Program => self.program.byte(t.position),
                };
            }
            9 => {
                let next = t.destination().wrapping_add(1);
                t.set_destination(next);
            }
            14 => return t.jump == t.launcher_address,
            _ => {}
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_code_targets_launcher() {
        let images = BridgeImages::new(vec![0x00, 0xC0, 0xA2, 0x00, 0x60], vec![0x01, 0x08, 0xEA]);
        let t = TransferState::new(&images);
        assert_eq!(t.code(0), 0x78);
        assert_eq!(t.code(4), 0xA2);
        assert_eq!(t.destination(), 0xC000);
        assert_eq!((t.code(13), t.code(14)), (0x01, 0xD4));
    }
}
