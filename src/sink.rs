//! Audio Sinks
//!
//! The engine offers exactly one stereo frame per sample period and never
//! waits: a sink that cannot take the frame right now returns `false` and
//! the frame is dropped.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::{BridgeError, Result};

/// One interleaved output frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StereoFrame {
    /// Left channel
    pub left: i16,
    /// Right channel
    pub right: i16,
}

impl StereoFrame {
    /// Frame from a channel pair
    #[inline]
    pub fn new(left: i16, right: i16) -> Self {
        StereoFrame { left, right }
    }
}

/// Non-blocking audio output
pub trait AudioSink {
    /// Offer one frame. Returns false when no buffer space is available.
    fn try_push(&mut self, frame: StereoFrame) -> bool;
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn try_push(&mut self, _frame: StereoFrame) -> bool {
        true
    }
}

/// Sink collecting frames in memory, optionally bounded
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    frames: Vec<StereoFrame>,
    capacity: Option<usize>,
    overruns: usize,
}

impl VecSink {
    /// Unbounded sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that refuses frames once `capacity` are held
    pub fn with_capacity(capacity: usize) -> Self {
        VecSink {
            frames: Vec::with_capacity(capacity),
            capacity: Some(capacity),
            overruns: 0,
        }
    }

    /// Collected frames
    pub fn frames(&self) -> &[StereoFrame] {
        &self.frames
    }

    /// Frames refused because the sink was full
    pub fn overruns(&self) -> usize {
        self.overruns
    }

    /// Drop collected frames, making room again
    pub fn drain(&mut self) -> Vec<StereoFrame> {
        std::mem::take(&mut self.frames)
    }
}

impl AudioSink for VecSink {
    fn try_push(&mut self, frame: StereoFrame) -> bool {
        if self.capacity.is_some_and(|cap| self.frames.len() >= cap) {
            self.overruns += 1;
            return false;
        }
        self.frames.push(frame);
        true
    }
}

/// Sink writing a 16-bit stereo WAV file
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    frames: u64,
}

impl WavSink {
    /// Create `path` for frames at `sample_rate`
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| BridgeError::AudioFile(format!("failed to create WAV file: {e}")))?;
        Ok(WavSink {
            writer: Some(writer),
            frames: 0,
        })
    }

    /// Frames written so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flush and close the file
    pub fn finalize(mut self) -> Result<()> {
        match self.writer.take() {
            Some(writer) => writer
                .finalize()
                .map_err(|e| BridgeError::AudioFile(format!("failed to finalize WAV file: {e}"))),
            None => Ok(()),
        }
    }
}

impl AudioSink for WavSink {
    fn try_push(&mut self, frame: StereoFrame) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        let written = writer
            .write_sample(frame.left)
            .and_then(|_| writer.write_sample(frame.right));
        match written {
            Ok(()) => {
                self.frames += 1;
                true
            }
            Err(e) => {
                log::warn!("WAV capture stopped: {e}");
                self.writer = None;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_vec_sink_refuses_when_full() {
        let mut sink = VecSink::with_capacity(2);
        assert!(sink.try_push(StereoFrame::new(1, 2)));
        assert!(sink.try_push(StereoFrame::new(3, 4)));
        assert!(!sink.try_push(StereoFrame::new(5, 6)));
        assert_eq!(sink.overruns(), 1);

        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert!(sink.try_push(StereoFrame::new(7, 8)));
    }

    #[test]
    fn test_wav_sink_writes_stereo_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.wav");

        let mut sink = WavSink::create(&path, 44_100).unwrap();
        for i in 0..100 {
            assert!(sink.try_push(StereoFrame::new(i, -i)));
        }
        assert_eq!(sink.frames(), 100);
        sink.finalize().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(reader.len(), 200);
    }
}
