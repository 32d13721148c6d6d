use std::path::Path;

use tracing::{debug, warn};

use super::decoded::DecodedSource;
use super::source::FrameSource;
use super::wav::WavSource;
use crate::block::SampleBlock;
use crate::error::{Error, Result};

/// Stride used when a container's length has to be found by probing.
pub const PROBE_STRIDE_FRAMES: u64 = 1 << 30;

/// Open audio source with an authoritative frame count.
pub struct AudioReader {
    source: Box<dyn FrameSource>,
    frame_count: u64,
}

impl AudioReader {
    /// Open `path`. WAV goes through hound, everything else through symphonia.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::SourceUnavailable {
                path: path.to_path_buf(),
                reason: "no such file".into(),
            });
        }
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav") || e.eq_ignore_ascii_case("wave"));
        let source: Box<dyn FrameSource> = if is_wav {
            Box::new(WavSource::open(path)?)
        } else {
            Box::new(DecodedSource::open(path)?)
        };
        Self::new(source).map_err(|e| match e {
            Error::Read(reason) => Error::SourceUnavailable { path: path.to_path_buf(), reason },
            other => other,
        })
    }

    /// Wrap an already-open source. The source must be positioned at frame 0.
    pub fn new(mut source: Box<dyn FrameSource>) -> Result<Self> {
        let frame_count = match source.reported_frames() {
            Some(n) if n <= u32::MAX as u64 => n,
            reported => {
                debug!(?reported, "reported length unusable, probing for end of stream");
                probe_frame_count(source.as_mut())?
            }
        };
        Ok(Self { source, frame_count })
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    pub fn channels(&self) -> usize {
        self.source.channels()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate() as f64
    }

    /// Lazy sequence of `block_frames`-sized blocks covering `frame_count()`
    /// frames. Only the last block may be shorter. Consumes the reader.
    pub fn blocks(self, block_frames: usize) -> Result<Blocks> {
        if block_frames == 0 {
            return Err(Error::Config("block size must be at least one frame".into()));
        }
        Ok(Blocks {
            remaining: self.frame_count,
            block_frames,
            reader: self,
            finished: false,
        })
    }
}

/// Skip forward in large strides until the position stops advancing.
pub(crate) fn probe_frame_count(source: &mut dyn FrameSource) -> Result<u64> {
    source.rewind()?;
    let mut last = 0u64;
    loop {
        let pos = source.skip_frames(PROBE_STRIDE_FRAMES)?;
        if pos == last {
            break;
        }
        last = pos;
    }
    source.rewind()?;
    debug!(frames = last, "probed stream length");
    Ok(last)
}

/// Forward-only block iterator returned by [`AudioReader::blocks`].
pub struct Blocks {
    reader: AudioReader,
    remaining: u64,
    block_frames: usize,
    finished: bool,
}

impl Iterator for Blocks {
    type Item = Result<SampleBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.remaining == 0 {
            return None;
        }
        let channels = self.reader.channels();
        let frames = self.remaining.min(self.block_frames as u64) as usize;
        let mut buf = vec![0.0f32; frames * channels];
        let mut filled = 0;
        while filled < frames {
            match self.reader.source.read_frames(&mut buf[filled * channels..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        if filled < frames {
            warn!(
                missing = self.remaining - filled as u64,
                "source ended before its reported length"
            );
            self.finished = true;
            if filled == 0 {
                return None;
            }
            buf.truncate(filled * channels);
        }
        self.remaining -= filled as u64;
        Some(SampleBlock::from_interleaved(buf, channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::source::MemorySource;

    fn ramp_source(frames: usize, channels: usize) -> MemorySource {
        let samples = (0..frames * channels).map(|i| i as f32).collect();
        MemorySource::new(samples, channels, 8_000).unwrap()
    }

    #[test]
    fn blocks_cover_every_frame() {
        let reader = AudioReader::new(Box::new(ramp_source(1_000, 2))).unwrap();
        let sizes: Vec<usize> = reader
            .blocks(300)
            .unwrap()
            .map(|b| b.unwrap().frames())
            .collect();
        assert_eq!(sizes, vec![300, 300, 300, 100]);
    }

    #[test]
    fn exact_multiple_has_no_short_block() {
        let reader = AudioReader::new(Box::new(ramp_source(900, 1))).unwrap();
        let sizes: Vec<usize> = reader.blocks(300).unwrap().map(|b| b.unwrap().frames()).collect();
        assert_eq!(sizes, vec![300, 300, 300]);
    }

    #[test]
    fn blocks_preserve_order_and_channels() {
        let reader = AudioReader::new(Box::new(ramp_source(5, 2))).unwrap();
        let joined: Vec<f32> = reader
            .blocks(2)
            .unwrap()
            .flat_map(|b| b.unwrap().into_samples())
            .collect();
        assert_eq!(joined, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn sentinel_length_is_probed() {
        let source = ramp_source(12_345, 2).with_reported_frames(Some(u64::MAX));
        let reader = AudioReader::new(Box::new(source)).unwrap();
        assert_eq!(reader.frame_count(), 12_345);
        let total: usize = reader.blocks(4_096).unwrap().map(|b| b.unwrap().frames()).sum();
        assert_eq!(total, 12_345);
    }

    #[test]
    fn missing_length_is_probed() {
        let source = ramp_source(77, 1).with_reported_frames(None);
        let reader = AudioReader::new(Box::new(source)).unwrap();
        assert_eq!(reader.frame_count(), 77);
    }

    #[test]
    fn overstated_length_stops_at_real_end() {
        let source = ramp_source(10, 1).with_reported_frames(Some(25));
        let reader = AudioReader::new(Box::new(source)).unwrap();
        let sizes: Vec<usize> = reader.blocks(8).unwrap().map(|b| b.unwrap().frames()).collect();
        assert_eq!(sizes, vec![8, 2]);
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let reader = AudioReader::new(Box::new(ramp_source(4, 1))).unwrap();
        assert!(reader.blocks(0).is_err());
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let err = AudioReader::open(Path::new("/definitely/not/here.wav")).err().unwrap();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }
}
