use crate::error::{Error, Result};

/// A run of interleaved `f32` frames, shape `(frames, channels)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    samples: Vec<f32>,
    channels: usize,
}

impl SampleBlock {
    /// Wrap interleaved samples. The length must be a whole number of frames.
    pub fn from_interleaved(samples: Vec<f32>, channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(Error::EffectStateFault("block has zero channels".into()));
        }
        if samples.len() % channels != 0 {
            return Err(Error::EffectStateFault(format!(
                "{} samples is not a whole number of {channels}-channel frames",
                samples.len()
            )));
        }
        Ok(Self { samples, channels })
    }

    /// `frames` frames of digital silence.
    pub fn silence(frames: usize, channels: usize) -> Self {
        Self { samples: vec![0.0; frames * channels], channels }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// One frame (one sample per channel).
    pub fn frame(&self, index: usize) -> &[f32] {
        let start = index * self.channels;
        &self.samples[start..start + self.channels]
    }

    /// Largest absolute sample value, 0.0 for an empty block.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_partial_frames() {
        assert!(SampleBlock::from_interleaved(vec![0.0; 5], 2).is_err());
        assert!(SampleBlock::from_interleaved(vec![0.0; 4], 0).is_err());
    }

    #[test]
    fn frames_and_peak() {
        let b = SampleBlock::from_interleaved(vec![0.1, -0.7, 0.3, 0.2], 2).unwrap();
        assert_eq!(b.frames(), 2);
        assert_eq!(b.frame(1), &[0.3, 0.2]);
        assert!((b.peak() - 0.7).abs() < 1e-7);
        assert_eq!(SampleBlock::silence(0, 2).peak(), 0.0);
    }
}
