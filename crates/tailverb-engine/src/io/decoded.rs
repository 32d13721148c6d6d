//! Compressed-format source using symphonia.
//!
//! Seeking is decode-and-skip: packets are decoded and discarded, never
//! located through the container's (often approximate) seek tables.
//! Rewinding reopens the file.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::source::FrameSource;
use crate::error::{Error, Result};

struct Demux {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    n_frames: Option<u64>,
}

fn unavailable(path: &Path, reason: impl ToString) -> Error {
    Error::SourceUnavailable { path: path.to_path_buf(), reason: reason.to_string() }
}

fn open_demux(path: &Path) -> Result<Demux> {
    let file = File::open(path).map_err(|e| unavailable(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| unavailable(path, format!("failed to probe format: {e}")))?;
    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unavailable(path, "no audio track found"))?;
    let params = track.codec_params.clone();
    let track_id = track.id;

    let sample_rate = params
        .sample_rate
        .filter(|r| *r > 0)
        .ok_or_else(|| unavailable(path, "sample rate not found"))?;
    let channels = params
        .channels
        .map(|c| c.count())
        .filter(|c| *c > 0)
        .ok_or_else(|| unavailable(path, "channel count not found"))?;

    let decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| unavailable(path, format!("failed to create decoder: {e}")))?;

    debug!(path = %path.display(), sample_rate, channels, n_frames = ?params.n_frames, "opened decoder");
    Ok(Demux { format, decoder, track_id, sample_rate, channels, n_frames: params.n_frames })
}

/// Source for any container/codec symphonia can decode.
pub struct DecodedSource {
    path: PathBuf,
    demux: Demux,
    /// Decoded but not yet consumed interleaved samples.
    pending: Vec<f32>,
    pending_pos: usize,
    position: u64,
    eof: bool,
}

impl DecodedSource {
    pub fn open(path: &Path) -> Result<Self> {
        let demux = open_demux(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            demux,
            pending: Vec::new(),
            pending_pos: 0,
            position: 0,
            eof: false,
        })
    }

    /// Decode the next packet of our track into `pending`.
    /// Returns false at end of stream.
    fn decode_next(&mut self) -> Result<bool> {
        loop {
            let packet = match self.demux.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!(path = %self.path.display(), "stream reset required, treating as end of stream");
                    return Ok(false);
                }
                Err(e) => return Err(Error::Read(format!("{}: {e}", self.path.display()))),
            };
            if packet.track_id() != self.demux.track_id {
                continue;
            }
            match self.demux.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    if spec.channels.count() != self.demux.channels {
                        return Err(Error::Read(format!(
                            "{}: channel count changed mid-stream ({} -> {})",
                            self.path.display(),
                            self.demux.channels,
                            spec.channels.count()
                        )));
                    }
                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);
                    self.pending.clear();
                    self.pending.extend_from_slice(buf.samples());
                    self.pending_pos = 0;
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    warn!(path = %self.path.display(), "skipping undecodable packet: {msg}");
                }
                Err(e) => return Err(Error::Read(format!("{}: {e}", self.path.display()))),
            }
        }
    }

    /// Frames available in `pending`, refilling it if drained.
    fn available(&mut self) -> Result<usize> {
        while self.pending_pos >= self.pending.len() {
            if self.eof || !self.decode_next()? {
                self.eof = true;
                return Ok(0);
            }
        }
        Ok((self.pending.len() - self.pending_pos) / self.demux.channels)
    }
}

impl FrameSource for DecodedSource {
    fn sample_rate(&self) -> u32 {
        self.demux.sample_rate
    }

    fn channels(&self) -> usize {
        self.demux.channels
    }

    fn reported_frames(&self) -> Option<u64> {
        self.demux.n_frames
    }

    fn read_frames(&mut self, buf: &mut [f32]) -> Result<usize> {
        let ch = self.demux.channels;
        let wanted = buf.len() / ch;
        let mut done = 0;
        while done < wanted {
            let avail = self.available()?;
            if avail == 0 {
                break;
            }
            let take = avail.min(wanted - done);
            let src = &self.pending[self.pending_pos..self.pending_pos + take * ch];
            buf[done * ch..(done + take) * ch].copy_from_slice(src);
            self.pending_pos += take * ch;
            done += take;
        }
        self.position += done as u64;
        Ok(done)
    }

    fn skip_frames(&mut self, frames: u64) -> Result<u64> {
        let mut left = frames;
        while left > 0 {
            let avail = self.available()? as u64;
            if avail == 0 {
                break;
            }
            let take = avail.min(left);
            self.pending_pos += take as usize * self.demux.channels;
            self.position += take;
            left -= take;
        }
        Ok(self.position)
    }

    fn rewind(&mut self) -> Result<()> {
        self.demux = open_demux(&self.path)?;
        self.pending.clear();
        self.pending_pos = 0;
        self.position = 0;
        self.eof = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reader::probe_frame_count;

    const FRAMES: usize = 10_000;

    /// Stereo 16-bit ramp: frame i holds (i, -i).
    fn write_ramp(path: &Path) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..FRAMES as i16 {
            w.write_sample(i).unwrap();
            w.write_sample(-i).unwrap();
        }
        w.finalize().unwrap();
    }

    fn ramp_source() -> (tempfile::TempDir, DecodedSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp(&path);
        let source = DecodedSource::open(&path).unwrap();
        (dir, source)
    }

    fn first_frame(source: &mut DecodedSource) -> [f32; 2] {
        let mut buf = [0.0f32; 2];
        assert_eq!(source.read_frames(&mut buf).unwrap(), 1);
        buf
    }

    #[test]
    fn reads_header_and_every_frame() {
        let (_dir, mut source) = ramp_source();
        assert_eq!(source.sample_rate(), 22_050);
        assert_eq!(source.channels(), 2);
        assert_eq!(source.reported_frames(), Some(FRAMES as u64));

        let mut buf = vec![0.0f32; 3_000 * 2];
        let mut total = 0;
        loop {
            let n = source.read_frames(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, FRAMES);
    }

    #[test]
    fn skip_then_rewind_returns_to_start() {
        let (_dir, mut source) = ramp_source();
        assert_eq!(source.skip_frames(1_000).unwrap(), 1_000);
        let frame = first_frame(&mut source);
        assert!((frame[0] - 1_000.0 / 32_768.0).abs() < 1e-6);
        assert!((frame[1] + 1_000.0 / 32_768.0).abs() < 1e-6);

        source.rewind().unwrap();
        assert_eq!(first_frame(&mut source), [0.0, 0.0]);
    }

    #[test]
    fn skip_past_end_stops_at_length() {
        let (_dir, mut source) = ramp_source();
        assert_eq!(source.skip_frames(1 << 30).unwrap(), FRAMES as u64);
        assert_eq!(source.skip_frames(1 << 30).unwrap(), FRAMES as u64);
    }

    #[test]
    fn probed_length_matches_header() {
        let (_dir, mut source) = ramp_source();
        source.skip_frames(123).unwrap();
        assert_eq!(probe_frame_count(&mut source).unwrap(), FRAMES as u64);
        assert_eq!(first_frame(&mut source), [0.0, 0.0]);
    }
}
