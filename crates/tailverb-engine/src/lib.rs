pub mod batch;
pub mod block;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod io;
pub mod progress;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

pub use block::SampleBlock;
pub use config::{PipelineConfig, StreamConfig};
pub use dsp::reverb::ReverbParams;
pub use engine::{EffectEngine, TailFlush, TailStep};
pub use error::{Error, Result};
pub use io::{AudioReader, AudioWriter, FrameSink, FrameSource, MemorySink, MemorySource};
pub use progress::{CancelToken, NoProgress, Progress};

/// Lifecycle of one pipeline run.
///
/// `Idle → Opening → StreamingBody → FlushingTail → Finalizing → Done`;
/// any failure lands in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Opening,
    StreamingBody,
    FlushingTail,
    Finalizing,
    Done,
    Failed,
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub sample_rate: u32,
    pub channels: usize,
    /// Source length as determined by the reader.
    pub input_frames: u64,
    pub body_frames: u64,
    pub tail_frames: u64,
    pub tail_blocks: usize,
    /// Peak of the last tail block that was written.
    pub last_tail_peak: Option<f32>,
    /// Peak of the discarded block that ended the tail flush.
    pub terminal_peak: Option<f32>,
    /// The tail flush hit `max_tail_blocks` before decaying.
    pub tail_capped: bool,
}

impl RunReport {
    pub fn output_frames(&self) -> u64 {
        self.body_frames + self.tail_frames
    }
}

/// Streams a source through one reverb instance into a sink.
///
/// Every run builds a fresh effect, so a `Pipeline` can be reused without
/// one run's tail leaking into the next.
pub struct Pipeline {
    cfg: PipelineConfig,
    stage: Stage,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg, stage: Stage::Idle, cancel: CancelToken::new() })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Read `input`, apply the reverb, write `output` as float WAV.
    ///
    /// The source is opened before anything is created at `output`. If the
    /// run fails after the destination exists, the destination is closed and
    /// removed; parent directories created for it stay.
    pub fn process_file(&mut self, input: &Path, output: &Path, progress: &mut dyn Progress) -> Result<RunReport> {
        self.enter(Stage::Opening);
        let reader = match AudioReader::open(input) {
            Ok(reader) => reader,
            Err(e) => return Err(self.fail(e)),
        };
        let mut writer = match AudioWriter::create(
            output,
            reader.sample_rate(),
            reader.channels(),
            self.cfg.stream.overwrite,
        ) {
            Ok(writer) => writer,
            Err(e) => return Err(self.fail(e)),
        };
        info!(
            input = %input.display(),
            output = %output.display(),
            seconds = reader.duration_secs(),
            "adding reverb"
        );

        match self.run(reader, &mut writer, progress) {
            Ok(report) => Ok(report),
            Err(e) => {
                drop(writer);
                if let Err(rm) = std::fs::remove_file(output) {
                    warn!(output = %output.display(), "could not remove partial output: {rm}");
                }
                Err(e)
            }
        }
    }

    /// Run an already-open reader into any sink. The sink must have been
    /// opened with the reader's sample rate and channel count.
    pub fn process_stream(
        &mut self,
        reader: AudioReader,
        sink: &mut dyn FrameSink,
        progress: &mut dyn Progress,
    ) -> Result<RunReport> {
        self.enter(Stage::Opening);
        self.run(reader, sink, progress)
    }

    fn run(&mut self, reader: AudioReader, sink: &mut dyn FrameSink, progress: &mut dyn Progress) -> Result<RunReport> {
        match self.run_stages(reader, sink, progress) {
            Ok(report) => {
                self.enter(Stage::Done);
                info!(
                    body_frames = report.body_frames,
                    tail_frames = report.tail_frames,
                    "reverb processing complete"
                );
                Ok(report)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn run_stages(
        &mut self,
        reader: AudioReader,
        sink: &mut dyn FrameSink,
        progress: &mut dyn Progress,
    ) -> Result<RunReport> {
        let sample_rate = reader.sample_rate();
        let channels = reader.channels();
        if sink.sample_rate() != sample_rate || sink.channels() != channels {
            return Err(Error::FormatMismatch {
                expected_rate: sample_rate,
                expected_channels: channels,
                actual_rate: sink.sample_rate(),
                actual_channels: sink.channels(),
            });
        }

        let stream = self.cfg.stream.clone();
        let total = reader.frame_count();
        let mut report = RunReport { sample_rate, channels, input_frames: total, ..Default::default() };
        let mut engine = EffectEngine::reverb(self.cfg.reverb);
        engine.prepare(sample_rate, channels);

        self.enter(Stage::StreamingBody);
        for block in reader.blocks(stream.block_size)? {
            self.check_cancel()?;
            let mut block = block?;
            engine.process(&mut block, sample_rate, false)?;
            sink.append(&block)?;
            report.body_frames += block.frames() as u64;
            progress.body(report.body_frames, total, sample_rate);
        }

        if stream.cut_reverb_tail {
            debug!("tail truncation requested, skipping flush");
        } else {
            self.enter(Stage::FlushingTail);
            let mut flush = TailFlush::new(stream.block_size, channels, stream.noise_floor, stream.max_tail_blocks);
            loop {
                self.check_cancel()?;
                match flush.step(&mut engine, sample_rate)? {
                    TailStep::Emit(block) => {
                        sink.append(&block)?;
                        report.tail_frames += block.frames() as u64;
                        report.tail_blocks += 1;
                        report.last_tail_peak = Some(block.peak());
                        progress.tail(report.tail_frames, sample_rate);
                    }
                    TailStep::Decayed { peak } => {
                        debug!(peak, blocks = report.tail_blocks, "tail decayed below noise floor");
                        report.terminal_peak = Some(peak);
                        break;
                    }
                    TailStep::Capped => {
                        warn!(blocks = report.tail_blocks, "tail still audible at max_tail_blocks, stopping");
                        report.tail_capped = true;
                        break;
                    }
                }
            }
        }

        self.enter(Stage::Finalizing);
        sink.finalize()?;
        Ok(report)
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = ?self.stage, to = ?stage, "pipeline stage");
        self.stage = stage;
    }

    fn fail(&mut self, e: Error) -> Error {
        warn!(stage = ?self.stage, "pipeline failed: {e}");
        self.enter(Stage::Failed);
        e
    }
}

/// One-shot helper: run `input` through a fresh pipeline into `output`.
pub fn apply_reverb(input: &Path, output: &Path, cfg: &PipelineConfig) -> Result<RunReport> {
    Pipeline::new(cfg.clone())?.process_file(input, output, &mut NoProgress)
}

/// `<input>.reverb.wav`, next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(".reverb.wav");
    PathBuf::from(name)
}
