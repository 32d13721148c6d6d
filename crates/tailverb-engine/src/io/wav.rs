use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::warn;

use super::source::FrameSource;
use crate::error::{Error, Result};

/// WAV source backed by hound. Integer PCM is normalised to [-1, 1).
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    channels: usize,
    sample_rate: u32,
    format: SampleFormat,
    int_scale: f32,
    duration: u64,
    position: u64,
}

impl WavSource {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = WavReader::open(path).map_err(|e| Error::SourceUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(Error::SourceUnavailable {
                path: path.to_path_buf(),
                reason: "header declares zero channels or zero sample rate".into(),
            });
        }
        if spec.sample_format == SampleFormat::Float && spec.bits_per_sample != 32 {
            return Err(Error::SourceUnavailable {
                path: path.to_path_buf(),
                reason: format!("unsupported {}-bit float WAV", spec.bits_per_sample),
            });
        }
        let int_scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
        Ok(Self {
            duration: reader.duration() as u64,
            channels: spec.channels as usize,
            sample_rate: spec.sample_rate,
            format: spec.sample_format,
            int_scale,
            reader,
            position: 0,
        })
    }
}

/// Copy samples into `buf` until it is full or the data runs out.
///
/// A data chunk that claims more bytes than the file holds ends the stream
/// early instead of failing. Returns the samples copied and whether the
/// data ran short.
fn fill<S, I>(buf: &mut [f32], samples: I, convert: impl Fn(S) -> f32) -> Result<(usize, bool)>
where
    I: Iterator<Item = hound::Result<S>>,
{
    let mut filled = 0;
    for (dst, s) in buf.iter_mut().zip(samples) {
        match s {
            Ok(s) => *dst = convert(s),
            Err(hound::Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok((filled, true));
            }
            Err(e) => return Err(Error::Read(e.to_string())),
        }
        filled += 1;
    }
    Ok((filled, false))
}

impl FrameSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn reported_frames(&self) -> Option<u64> {
        Some(self.duration)
    }

    fn read_frames(&mut self, buf: &mut [f32]) -> Result<usize> {
        let wanted = (buf.len() / self.channels) as u64;
        let frames = wanted.min(self.duration - self.position) as usize;
        let n = frames * self.channels;
        let scale = self.int_scale;
        let (filled, short) = match self.format {
            SampleFormat::Float => fill(&mut buf[..n], self.reader.samples::<f32>(), |s: f32| s)?,
            SampleFormat::Int => fill(&mut buf[..n], self.reader.samples::<i32>(), |s: i32| s as f32 * scale)?,
        };
        let frames = filled / self.channels;
        self.position += frames as u64;
        if short {
            warn!(
                header_frames = self.duration,
                data_frames = self.position,
                "WAV data chunk is truncated"
            );
            self.duration = self.position;
        }
        Ok(frames)
    }

    fn skip_frames(&mut self, frames: u64) -> Result<u64> {
        let target = self.position.saturating_add(frames).min(self.duration);
        self.reader
            .seek(target as u32)
            .map_err(|e| Error::Read(e.to_string()))?;
        self.position = target;
        Ok(target)
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader.seek(0).map_err(|e| Error::Read(e.to_string()))?;
        self.position = 0;
        Ok(())
    }
}
