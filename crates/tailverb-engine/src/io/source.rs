use crate::error::{Error, Result};

/// Sequential decoder capability behind [`AudioReader`](super::AudioReader).
///
/// Positions and counts are in frames (one sample per channel).
pub trait FrameSource: Send {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> usize;

    /// Length as reported by the container, if it reports one.
    fn reported_frames(&self) -> Option<u64>;

    /// Fill `buf` (a whole number of frames) from the current position.
    /// Returns frames read; 0 means end of stream.
    fn read_frames(&mut self, buf: &mut [f32]) -> Result<usize>;

    /// Move forward by up to `frames`, stopping at end of stream.
    /// Returns the new absolute position.
    fn skip_frames(&mut self, frames: u64) -> Result<u64>;

    /// Return to frame 0.
    fn rewind(&mut self) -> Result<()>;
}

/// Interleaved samples held in memory.
pub struct MemorySource {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    position: usize,
    reported: Option<u64>,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 || sample_rate == 0 {
            return Err(Error::Config("memory source needs channels > 0 and sample_rate > 0".into()));
        }
        if samples.len() % channels != 0 {
            return Err(Error::Config(format!(
                "{} samples is not a whole number of {channels}-channel frames",
                samples.len()
            )));
        }
        let frames = (samples.len() / channels) as u64;
        Ok(Self { samples, channels, sample_rate, position: 0, reported: Some(frames) })
    }

    /// Override the length the source reports, e.g. to mimic a container
    /// that stores a sentinel instead of a real count.
    pub fn with_reported_frames(mut self, reported: Option<u64>) -> Self {
        self.reported = reported;
        self
    }

    fn total_frames(&self) -> usize {
        self.samples.len() / self.channels
    }
}

impl FrameSource for MemorySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn reported_frames(&self) -> Option<u64> {
        self.reported
    }

    fn read_frames(&mut self, buf: &mut [f32]) -> Result<usize> {
        let wanted = buf.len() / self.channels;
        let frames = wanted.min(self.total_frames() - self.position);
        let start = self.position * self.channels;
        let n = frames * self.channels;
        buf[..n].copy_from_slice(&self.samples[start..start + n]);
        self.position += frames;
        Ok(frames)
    }

    fn skip_frames(&mut self, frames: u64) -> Result<u64> {
        let remaining = (self.total_frames() - self.position) as u64;
        self.position += frames.min(remaining) as usize;
        Ok(self.position as u64)
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}
