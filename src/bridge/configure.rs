//! CONFIGURATION mode
//!
//! Entered by writing 0xFF to the mode register. The configuration tool on
//! the host streams the 64-byte block through register 0x1D, edits it, and
//! finishes with an apply (0xFE) or apply-and-save (0xFF). The same window
//! carries program uploads, slot launches, bus-timing calibration and an
//! address-line probe used by the tool to verify the second chip address.
//!
//! Every read re-arms the mode timeout; a write re-arms it only when the
//! register expects more traffic. Anything unexpected lets the timeout lapse
//! on the same cycle, which falls back to SID communication.

use super::program::most_frequent;
use super::{BusSampler, LAUNCH_BUDGET};
use crate::bus::{BusLines, BusPort, BusSnapshot, Phase};
use crate::config::{BusDelays, ConfigBlock, CONFIG_SIZE};
use crate::constants::{PROGRAM_BUFFER_SIZE, VERSION_STRING};
use crate::shared::RebootKind;

/// Pointer values at and above this index address the version string
const VERSION_BASE: u32 = PROGRAM_BUFFER_SIZE as u32;
/// Pointer writes at and above this value select the version string
const VERSION_SELECT: u8 = 224;

/// Calibration slots (read-bus delay, phi2 delay)
const CALIBRATE_READ_BUS: u8 = 254;
const CALIBRATE_PHI2: u8 = 255;

/// Meta registers
mod reg {
    pub const LAUNCH_SLOT: u8 = 0x10;
    pub const CALIBRATE_READ_BUS: u8 = 0x14;
    pub const CALIBRATE_PHI2: u8 = 0x15;
    pub const UPLOAD_BYTE: u8 = 0x16;
    pub const UPLOAD_FINISH: u8 = 0x17;
    pub const UPLOAD_PAGE: u8 = 0x19;
    pub const UPLOAD_SLOT: u8 = 0x1A;
    pub const LAUNCH_UPLOAD: u8 = 0x1B;
    pub const PAYLOAD: u8 = 0x1C;
    pub const STREAM: u8 = 0x1D;
    pub const POINTER: u8 = 0x1E;
}

/// Commands written to the stream register
mod command {
    pub const APPLY: u8 = 0xFE;
    pub const APPLY_AND_SAVE: u8 = 0xFF;
    pub const REBOOT: u8 = 0xFB;
    pub const ADDRESS_PROBE: u8 = 0xFA;
}

/// Source of the 0x1C payload stream
#[derive(Debug, Clone)]
enum Payload {
    /// The program buffer
    Program,
    /// A snapshot of the program directory
    Directory(Vec<u8>),
}

/// CONFIGURATION state
///
/// Survives between sessions: a host tool that re-enters the mode resumes
/// at the same stream pointer and sees its unapplied edits, unless the live
/// configuration changed in the meantime.
#[derive(Debug, Clone)]
pub(super) struct ConfigSession {
    /// Block being edited
    working: ConfigBlock,
    /// Live configuration the edits started from
    base: ConfigBlock,
    /// Stream pointer: config index, or `VERSION_BASE + i` for the version string
    pointer: u32,
    payload: Payload,
    payload_pos: usize,
    /// Target slot of the current upload
    slot: u8,
    /// Upload cursor into the program buffer
    cursor: usize,
    /// Address-line latch (see [`ConfigSession::track_lines`])
    address_lines: u8,
    /// Line word of the last meta write, shifted out byte by byte on register 0
    line_history: u32,
}

impl ConfigSession {
    pub(super) fn new(config: ConfigBlock) -> Self {
        ConfigSession {
            working: config,
            base: config,
            pointer: 0,
            payload: Payload::Program,
            payload_pos: 0,
            slot: 0,
            cursor: 0,
            address_lines: 0,
            line_history: 0,
        }
    }

    /// Re-enter the mode with `live` as the current configuration
    pub(super) fn resume(&mut self, live: ConfigBlock) {
        if live != self.base {
            self.working = live;
            self.base = live;
        }
    }

    /// Latch A5/A8 at the end of a cycle
    ///
    /// Bits 4/5 record a line seen high, bits 6/7 stay set only while the
    /// line stays high, bits 0/1 record a line high on a pointer write and
    /// bit 2 a pointer write through the IO alias.
    fn track_lines(&mut self, lines: BusLines) {
        let levels = line_bits(lines);
        self.address_lines &= 0x3F | (levels << 6);
        self.address_lines |= levels << 4;
    }

    /// Diagnostic byte: latch high nibble over the low nibble
    ///
    /// Bits 0..2 are consumed unless the line they belong to changed level
    /// since the probe was armed.
    fn probe_byte(&mut self) -> u8 {
        let mut t = self.address_lines;
        let value = t << 4;
        t ^= t << 2;
        self.address_lines &= 0xF8 | ((t >> 6) & 1) | (((t as i8) >> 1) as u8 >> 5);
        value | (self.address_lines & 0x0F)
    }

    /// Next byte of the line history; `word` is the current access
    fn history_byte(&mut self, word: u32) -> u8 {
        let value = self.line_history as u8;
        self.line_history = self.line_history >> 8 | (word >> 8) << 24;
        self.address_lines = (value | ((value ^ 0x40) >> 4)) & 0x0F;
        value
    }

    /// Next byte of the 0x1D stream
    fn next_stream_byte(&mut self) -> u8 {
        if self.pointer < VERSION_BASE {
            let value = self.working.get(self.pointer as usize % CONFIG_SIZE);
            self.pointer += 1;
            value
        } else {
            VERSION_STRING
                .get((self.pointer - VERSION_BASE) as usize)
                .copied()
                .unwrap_or(0)
        }
    }
}

/// A5/A8 as bits 0/1
fn line_bits(lines: BusLines) -> u8 {
    let mut bits = 0;
    if lines.contains(BusLines::A5) {
        bits |= 1;
    }
    if lines.contains(BusLines::A8) {
        bits |= 2;
    }
    bits
}

/// Data, address and A5/A8 packed as data bits 0..7, address 8..12, A5 14, A8 15
fn line_word(snapshot: &BusSnapshot) -> u32 {
    let data = if snapshot.is_write() { snapshot.data as u32 } else { 0 };
    data | (snapshot.address as u32) << 8 | (line_bits(snapshot.lines) as u32) << 14
}

impl<B: BusPort> BusSampler<B> {
    /// High-phase handler in CONFIGURATION mode
    pub(super) fn configure_access(&mut self, snapshot: BusSnapshot) {
        let register = snapshot.register();

        if snapshot.chip_selected() {
            if snapshot.is_read() {
                self.configure_read(&snapshot);
            } else {
                self.configure_write(snapshot);
            }
        } else if snapshot.is_write()
            && register == reg::POINTER
            && !snapshot.lines.contains(BusLines::A8)
        {
            // IO expansion alias of the pointer register
            self.session.address_lines |= 4;
        }
        self.session.track_lines(snapshot.lines);

        self.mode_timer -= 1;
        if self.mode_timer <= 0 {
            self.enter_sid_communication();
        }
    }

    fn rearm(&mut self) {
        self.mode_timer = self.timings.config_mode_cycles as i32;
    }

    fn configure_read(&mut self, snapshot: &BusSnapshot) {
        let session = &mut self.session;
        let value = match snapshot.register() {
            reg::STREAM => session.next_stream_byte(),
            reg::PAYLOAD => {
                let pos = session.payload_pos;
                session.payload_pos += 1;
                match &session.payload {
                    Payload::Directory(bytes) => bytes.get(pos).copied().unwrap_or(0xFF),
                    Payload::Program if pos < self.program.len() => self.program.byte(pos),
                    Payload::Program => 0xFF,
                }
            }
            0 => session.history_byte(line_word(snapshot)),
            _ => session.probe_byte(),
        };
        self.drive(value);
        self.rearm();
    }

    /// Handle a meta-register write. Writes that do not re-arm the timeout
    /// end the session on this cycle.
    fn configure_write(&mut self, snapshot: BusSnapshot) {
        let latched = self.latch_write_data();
        let data = latched.data;
        self.mode_timer = 0;
        self.session.line_history = line_word(&latched);

        match snapshot.register() {
            reg::POINTER => {
                self.session.pointer = if data >= VERSION_SELECT {
                    VERSION_BASE + (data - VERSION_SELECT) as u32
                } else {
                    data as u32 * CONFIG_SIZE as u32
                };
                self.session.address_lines |= line_bits(snapshot.lines);
                self.rearm();
            }
            reg::STREAM => match data {
                command::APPLY | command::APPLY_AND_SAVE => {
                    self.apply_session(data == command::APPLY_AND_SAVE);
                    self.launch_budget = LAUNCH_BUDGET;
                }
                command::ADDRESS_PROBE => {
                    self.session.address_lines = 0xC0;
                    self.rearm();
                }
                command::REBOOT => {
                    self.shared.request_reboot(RebootKind::Soft);
                    self.launch_budget = LAUNCH_BUDGET;
                }
                _ => {
                    let session = &mut self.session;
                    session.working.set(session.pointer as usize, data);
                    session.pointer = session.pointer.wrapping_add(1);
                    self.rearm();
                }
            },
            reg::PAYLOAD => {
                let directory = self.store.lock().directory();
                self.session.payload = Payload::Directory(directory.as_bytes().to_vec());
                self.session.payload_pos = 0;
                self.rearm();
            }
            reg::LAUNCH_UPLOAD => {
                self.program.schedule_launch(self.session.cursor);
            }
            reg::CALIBRATE_READ_BUS | reg::CALIBRATE_PHI2 => {
                self.session.slot = if snapshot.register() == reg::CALIBRATE_READ_BUS {
                    CALIBRATE_READ_BUS
                } else {
                    CALIBRATE_PHI2
                };
                self.session.cursor = 0;
                self.rearm();
            }
            reg::UPLOAD_SLOT => {
                self.session.slot = data;
                self.session.cursor = 0;
                self.rearm();
            }
            reg::UPLOAD_PAGE => {
                self.session.cursor = data as usize * 256;
                self.rearm();
            }
            reg::UPLOAD_BYTE => {
                self.program.put(self.session.cursor, data);
                self.session.cursor += 1;
                self.rearm();
            }
            reg::UPLOAD_FINISH => {
                self.finish_upload();
                self.program.cancel_launch();
            }
            reg::LAUNCH_SLOT => {
                let loaded = self.store.lock().load_program(data);
                match loaded.and_then(|image| self.program.launch_image(&image)) {
                    Ok(()) => log::info!("launching program slot {data}"),
                    Err(e) => log::warn!("cannot launch program slot {data}: {e}"),
                }
                self.launch_budget = LAUNCH_BUDGET;
            }
            _ => {}
        }
    }

    /// Seal and apply the working block, parked across a full half-cycle
    fn apply_session(&mut self, save: bool) {
        let mut config = self.session.working;
        config.seal();
        self.session.working = config;
        self.session.base = config;

        self.bus.wait_for_phase(Phase::Low);
        self.settings = config.bus_settings(self.stored_delays);
        self.paddle.skip_measurements(3);
        self.shared.apply_config(&config);
        if save {
            match self.store.lock().save_config(&config) {
                Ok(()) => log::info!("configuration saved"),
                Err(e) => log::warn!("configuration save failed: {e}"),
            }
        }
        self.digi.reset();
        self.cadence.set_host_clock(config.host_clock());
        self.advance_host_cycle();
        self.bus.wait_for_phase(Phase::High);
    }

    /// Store the finished upload, or turn a calibration upload into bus delays
    fn finish_upload(&mut self) {
        let slot = self.session.slot;
        let end = self.session.cursor;

        if slot >= CALIBRATE_READ_BUS {
            let delay = most_frequent(self.program.uploaded(end));
            if slot == CALIBRATE_READ_BUS {
                self.stored_delays.read_bus = delay;
            } else {
                self.stored_delays.phi2 = delay;
                self.save_bus_delays(self.stored_delays);
            }
            log::info!(
                "bus timing calibrated: read-bus {}, phi2 {}",
                self.stored_delays.read_bus,
                self.stored_delays.phi2
            );
            self.settings.delays = self.session.working.bus_delays(self.stored_delays);
            return;
        }

        let stored = self
            .program
            .finish_upload(end)
            .and_then(|(image, name)| self.store.lock().store_program(slot, &name, &image));
        match stored {
            Ok(()) => log::info!("stored {end} byte upload in slot {slot}"),
            Err(e) => log::warn!("upload to slot {slot} rejected: {e}"),
        }
    }

    fn save_bus_delays(&mut self, delays: BusDelays) {
        if let Err(e) = self.store.lock().save_bus_delays(delays) {
            log::warn!("bus delay save failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_wraps_config_index() {
        let mut config = ConfigBlock::defaults();
        config.set(1, 0xAB);
        let mut session = ConfigSession::new(config);
        session.pointer = 65;
        assert_eq!(session.next_stream_byte(), 0xAB);
        assert_eq!(session.pointer, 66);
    }

    #[test]
    fn test_version_stream_does_not_advance() {
        let mut session = ConfigSession::new(ConfigBlock::defaults());
        session.pointer = VERSION_BASE + 1;
        assert_eq!(session.next_stream_byte(), VERSION_STRING[1]);
        assert_eq!(session.next_stream_byte(), VERSION_STRING[1]);
    }

    #[test]
    fn test_address_latch_tracks_lines() {
        let mut session = ConfigSession::new(ConfigBlock::defaults());
        session.address_lines = 0xC0;
        session.track_lines(BusLines::A8);
        // A5 low clears bit 6, A8 high keeps bit 7 and sets bit 5
        assert_eq!(session.address_lines, 0xA0);

        session.address_lines = 0x31;
        assert_eq!(session.probe_byte(), 0x11);
        assert_eq!(session.address_lines, 0x31);

        // A5 seen on a pointer write but unchanged since: consumed
        session.address_lines = 0x01;
        assert_eq!(session.probe_byte(), 0x10);
        assert_eq!(session.address_lines, 0x00);
    }

    #[test]
    fn test_history_shifts_out_line_word() {
        let mut session = ConfigSession::new(ConfigBlock::defaults());
        session.line_history = 0x9E05;
        assert_eq!(session.history_byte(0x0300), 0x05);
        assert_eq!(session.line_history, 0x0300_009E);
        assert_eq!(session.address_lines, 0x05);
    }

    #[test]
    fn test_resume_keeps_edits_until_live_config_changes() {
        let live = ConfigBlock::defaults();
        let mut session = ConfigSession::new(live);
        session.working.set(2, 0x42);
        session.pointer = 3;

        session.resume(live);
        assert_eq!(session.working.get(2), 0x42);
        assert_eq!(session.pointer, 3);

        let mut changed = live;
        changed.set(5, 0x01);
        session.resume(changed);
        assert_eq!(session.working, changed);
        assert_eq!(session.pointer, 3);
    }
}
