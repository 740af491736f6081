//! Program working buffer
//!
//! Holds the program TRANSFER mode delivers after the launcher: the
//! configuration tool by default, an uploaded program, or a slot loaded
//! for launch. CONFIGURATION uploads write into the same buffer.

use crate::constants::{BASIC_START, PROGRAM_BUFFER_SIZE, PROGRAM_NAME_LEN};
use crate::{BridgeError, Result};

#[derive(Debug, Clone)]
pub(super) struct ProgramBuffer {
    bytes: Box<[u8]>,
    len: usize,
    holds_config_tool: bool,
    launch: Option<usize>,
}

impl ProgramBuffer {
    pub(super) fn new(config_tool: &[u8]) -> Self {
        let mut buffer = ProgramBuffer {
            bytes: vec![0u8; PROGRAM_BUFFER_SIZE].into_boxed_slice(),
            len: 0,
            holds_config_tool: false,
            launch: None,
        };
        buffer.restore(config_tool);
        buffer
    }

    /// Bring back the configuration tool unless it is already loaded
    pub(super) fn restore(&mut self, config_tool: &[u8]) {
        if self.holds_config_tool {
            return;
        }
        let len = config_tool.len().min(PROGRAM_BUFFER_SIZE);
        self.bytes[..len].copy_from_slice(&config_tool[..len]);
        self.len = len;
        self.holds_config_tool = true;
    }

    /// Length of the program TRANSFER will deliver
    pub(super) fn len(&self) -> usize {
        self.len
    }

    /// Byte at `index` (0 past the buffer)
    #[inline]
    pub(super) fn byte(&self, index: usize) -> u8 {
        self.bytes.get(index).copied().unwrap_or(0)
    }

    /// Load address of the buffered program
    pub(super) fn load_address(&self) -> u16 {
        u16::from_le_bytes([self.bytes[0], self.bytes[1]])
    }

    /// Store one uploaded byte
    pub(super) fn put(&mut self, index: usize, value: u8) {
        if let Some(byte) = self.bytes.get_mut(index) {
            *byte = value;
            self.holds_config_tool = false;
        }
    }

    /// Uploaded bytes `0..end`
    pub(super) fn uploaded(&self, end: usize) -> &[u8] {
        &self.bytes[..end.min(PROGRAM_BUFFER_SIZE)]
    }

    /// Queue the first `len` buffered bytes for the next TRANSFER
    pub(super) fn schedule_launch(&mut self, len: usize) {
        self.launch = Some(len.min(PROGRAM_BUFFER_SIZE));
    }

    /// Replace the buffer with `image` and queue it for the next TRANSFER
    pub(super) fn launch_image(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > PROGRAM_BUFFER_SIZE {
            return Err(BridgeError::PayloadSize(format!(
                "program of {} bytes exceeds the buffer",
                image.len()
            )));
        }
        self.bytes[..image.len()].copy_from_slice(image);
        self.holds_config_tool = false;
        self.schedule_launch(image.len());
        Ok(())
    }

    /// Drop any queued launch (an upload just finished)
    pub(super) fn cancel_launch(&mut self) {
        self.launch = None;
        self.holds_config_tool = false;
    }

    /// Consume the queued launch, making its length current
    pub(super) fn take_launch(&mut self) -> Option<usize> {
        let launch = self.launch.take();
        if let Some(len) = launch {
            self.len = len;
        }
        launch
    }

    /// Split an upload of `end` bytes into program image and trailing name
    ///
    /// The stored image gets the BASIC start as its load address.
    pub(super) fn finish_upload(&mut self, end: usize) -> Result<(Vec<u8>, [u8; PROGRAM_NAME_LEN])> {
        let end = end.min(PROGRAM_BUFFER_SIZE);
        if end < PROGRAM_NAME_LEN + 2 {
            return Err(BridgeError::PayloadSize(format!(
                "upload of {end} bytes is shorter than a load address and a name"
            )));
        }
        let size = end - PROGRAM_NAME_LEN;
        let mut name = [0u8; PROGRAM_NAME_LEN];
        name.copy_from_slice(&self.bytes[size..end]);

        self.bytes[..2].copy_from_slice(&BASIC_START.to_le_bytes());
        Ok((self.bytes[..size].to_vec(), name))
    }
}

/// Most frequent byte of a calibration upload (lowest value on ties)
pub(super) fn most_frequent(bytes: &[u8]) -> u8 {
    let mut histogram = [0u32; 256];
    for &b in bytes {
        histogram[b as usize] += 1;
    }
    let mut best = 0usize;
    for value in 1..256 {
        if histogram[value] > histogram[best] {
            best = value;
        }
    }
    best as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_frequent_byte() {
        assert_eq!(most_frequent(&[5, 7, 7, 9, 7, 5]), 7);
        assert_eq!(most_frequent(&[200, 3, 200, 3]), 3);
        assert_eq!(most_frequent(&[]), 0);
    }

    #[test]
    fn test_restore_only_when_replaced() {
        let mut buffer = ProgramBuffer::new(&[0x01, 0x08, 0xEA]);
        assert_eq!(buffer.len(), 3);
        buffer.put(2, 0x60);
        buffer.restore(&[0x01, 0x08, 0xEA]);
        assert_eq!(buffer.byte(2), 0xEA);
    }

    #[test]
    fn test_finish_upload_splits_name() {
        let mut buffer = ProgramBuffer::new(&[0x01, 0x08, 0xEA]);
        let mut upload = vec![0x00, 0xC0, 0xA9, 0x01];
        upload.extend_from_slice(b"HELLO WORLD\0\0\0\0\0\0\0");
        for (i, &b) in upload.iter().enumerate() {
            buffer.put(i, b);
        }
        let (image, name) = buffer.finish_upload(upload.len()).unwrap();
        assert_eq!(image, vec![0x01, 0x08, 0xA9, 0x01]);
        assert_eq!(&name[..11], b"HELLO WORLD");
    }

    #[test]
    fn test_short_upload_rejected() {
        let mut buffer = ProgramBuffer::new(&[0x01, 0x08, 0xEA]);
        assert!(matches!(
            buffer.finish_upload(10),
            Err(BridgeError::PayloadSize(_))
        ));
    }

    #[test]
    fn test_launch_makes_length_current() {
        let mut buffer = ProgramBuffer::new(&[0x01, 0x08, 0xEA]);
        buffer.launch_image(&[0x01, 0x08, 1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.take_launch(), Some(6));
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.take_launch(), None);
    }
}
