use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::debug;

use crate::block::SampleBlock;
use crate::error::{Error, Result};

/// Sequential destination for processed blocks.
pub trait FrameSink {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> usize;
    /// Append frames after everything appended so far.
    fn append(&mut self, block: &SampleBlock) -> Result<()>;
    /// Flush and finalise. Further appends fail.
    fn finalize(&mut self) -> Result<()>;
}

/// 32-bit float WAV destination.
///
/// Dropping an unfinalised writer still writes a consistent header, so the
/// file handle is released on every exit path.
pub struct AudioWriter {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    sample_rate: u32,
    channels: usize,
    frames_written: u64,
}

impl AudioWriter {
    /// Create `path`, making any missing parent directories first.
    ///
    /// The path must end in `.wav`. An existing file is an error unless
    /// `overwrite` is set. Directories created before a failure are left in
    /// place.
    pub fn create(path: &Path, sample_rate: u32, channels: usize, overwrite: bool) -> Result<Self> {
        let unavailable = |reason: String| Error::DestinationUnavailable {
            path: path.to_path_buf(),
            reason,
        };
        let channels_u16 = u16::try_from(channels)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| unavailable(format!("unsupported channel count {channels}")))?;
        if sample_rate == 0 {
            return Err(unavailable("sample rate must be positive".into()));
        }
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav") || e.eq_ignore_ascii_case("wave"));
        if !is_wav {
            return Err(unavailable("output is always WAV; use a .wav extension".into()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| unavailable(format!("cannot create {}: {e}", parent.display())))?;
        }
        if !overwrite && path.exists() {
            return Err(unavailable("file already exists (pass overwrite to replace it)".into()));
        }

        let spec = WavSpec {
            channels: channels_u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(path, spec).map_err(|e| unavailable(e.to_string()))?;
        debug!(path = %path.display(), sample_rate, channels, "opened destination");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            sample_rate,
            channels,
            frames_written: 0,
        })
    }
}

fn write_err(e: hound::Error) -> Error {
    Error::Write(e.to_string())
}

impl FrameSink for AudioWriter {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn append(&mut self, block: &SampleBlock) -> Result<()> {
        if block.channels() != self.channels {
            return Err(Error::FormatMismatch {
                expected_rate: self.sample_rate,
                expected_channels: self.channels,
                actual_rate: self.sample_rate,
                actual_channels: block.channels(),
            });
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::Write(format!("{} is already finalized", self.path.display())))?;
        for &s in block.samples() {
            writer.write_sample(s).map_err(write_err)?;
        }
        self.frames_written += block.frames() as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(writer) => {
                writer.finalize().map_err(write_err)?;
                debug!(path = %self.path.display(), frames = self.frames_written, "finalized destination");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Collects appended blocks in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    sample_rate: u32,
    channels: usize,
    samples: Vec<f32>,
    blocks: Vec<usize>,
    finalized: bool,
}

impl MemorySink {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self { sample_rate, channels, ..Default::default() }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Frame count of each appended block, in order.
    pub fn block_frames(&self) -> &[usize] {
        &self.blocks
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl FrameSink for MemorySink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn append(&mut self, block: &SampleBlock) -> Result<()> {
        if self.finalized {
            return Err(Error::Write("memory sink already finalized".into()));
        }
        self.samples.extend_from_slice(block.samples());
        self.blocks.push(block.frames());
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.finalized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_parents_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c/out.wav");
        for _ in 0..2 {
            let mut w = AudioWriter::create(&path, 44_100, 2, true).unwrap();
            w.append(&SampleBlock::silence(10, 2)).unwrap();
            w.finalize().unwrap();
        }
        assert!(path.is_file());
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 10);
        assert_eq!(reader.spec().sample_format, SampleFormat::Float);
    }

    #[test]
    fn refuses_existing_file_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        AudioWriter::create(&path, 8_000, 1, false).unwrap().finalize().unwrap();
        let err = AudioWriter::create(&path, 8_000, 1, false).err().unwrap();
        assert!(matches!(err, Error::DestinationUnavailable { .. }));
    }

    #[test]
    fn drop_without_finalize_leaves_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.wav");
        {
            let mut w = AudioWriter::create(&path, 8_000, 1, false).unwrap();
            w.append(&SampleBlock::from_interleaved(vec![0.25; 6], 1).unwrap()).unwrap();
        }
        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.25; 6]);
    }

    #[test]
    fn append_after_finalize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = AudioWriter::create(&dir.path().join("x.wav"), 8_000, 1, false).unwrap();
        w.finalize().unwrap();
        assert!(w.append(&SampleBlock::silence(1, 1)).is_err());
    }

    #[test]
    fn rejects_wrong_channel_block() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = AudioWriter::create(&dir.path().join("x.wav"), 8_000, 2, false).unwrap();
        assert!(matches!(
            w.append(&SampleBlock::silence(4, 1)),
            Err(Error::FormatMismatch { .. })
        ));
    }

    #[test]
    fn non_wav_destination_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/out.flac");
        let err = AudioWriter::create(&path, 44_100, 2, true).err().unwrap();
        assert!(matches!(err, Error::DestinationUnavailable { .. }));
        assert!(!dir.path().join("sub").exists());
        assert!(AudioWriter::create(&dir.path().join("OUT.WAV"), 44_100, 2, true).is_ok());
    }
}
