use tracing::debug;

use crate::block::SampleBlock;
use crate::dsp::effect::Effect;
use crate::dsp::reverb::{Reverb, ReverbParams};
use crate::error::{Error, Result};

/// Owns one effect instance and its decay state for a single stream.
///
/// `process` takes `&mut self`, so calls on one engine are strictly
/// sequential; separate engines share nothing.
pub struct EffectEngine {
    effect: Box<dyn Effect>,
    prepared: Option<(u32, usize)>,
}

impl EffectEngine {
    pub fn new(effect: Box<dyn Effect>) -> Self {
        Self { effect, prepared: None }
    }

    /// Engine with fresh reverb state.
    pub fn reverb(params: ReverbParams) -> Self {
        Self::new(Box::new(Reverb::new(params)))
    }

    /// Fix the stream format up front. Later blocks must match `channels`.
    pub fn prepare(&mut self, sample_rate: u32, channels: usize) {
        debug!(sample_rate, channels, "preparing effect");
        self.effect.prepare(sample_rate, channels);
        self.prepared = Some((sample_rate, channels));
    }

    /// Apply the effect to `block` in place.
    ///
    /// `reset = true` discards the accumulated tail first; a continuous
    /// stream passes `false` for every block. A sample-rate change
    /// re-prepares the effect, which also clears its state.
    pub fn process(&mut self, block: &mut SampleBlock, sample_rate: u32, reset: bool) -> Result<()> {
        match self.prepared {
            None => self.prepare(sample_rate, block.channels()),
            Some((_, channels)) if channels != block.channels() => {
                return Err(Error::EffectStateFault(format!(
                    "block has {} channels, engine prepared for {channels}",
                    block.channels()
                )));
            }
            Some((rate, channels)) if rate != sample_rate => {
                debug!(from = rate, to = sample_rate, "sample rate changed, re-preparing");
                self.prepare(sample_rate, channels);
            }
            Some(_) => {}
        }
        if let Some(pos) = block.samples().iter().position(|s| !s.is_finite()) {
            return Err(Error::EffectStateFault(format!(
                "non-finite sample at frame {}",
                pos / block.channels()
            )));
        }
        if reset {
            self.effect.reset();
        }
        self.effect.process(block.samples_mut());
        Ok(())
    }
}

/// Outcome of one tail-flush step.
#[derive(Debug)]
pub enum TailStep {
    /// Still audible: append this block and step again.
    Emit(SampleBlock),
    /// Output fell below the noise floor. The block was discarded.
    Decayed { peak: f32 },
    /// The safety cap was reached before the tail decayed.
    Capped,
}

/// Drains an effect's remaining state by feeding it silence.
///
/// Each step processes one block of zeros. The flush ends on the first
/// block whose peak is below `noise_floor`; that block is not emitted.
/// With feedback below unity the effect's stored energy shrinks every
/// recirculation, so the peak eventually crosses any positive floor.
pub struct TailFlush {
    block_frames: usize,
    channels: usize,
    noise_floor: f32,
    max_blocks: Option<usize>,
    emitted: usize,
    done: bool,
}

impl TailFlush {
    pub fn new(block_frames: usize, channels: usize, noise_floor: f32, max_blocks: Option<usize>) -> Self {
        Self { block_frames, channels, noise_floor, max_blocks, emitted: 0, done: false }
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn step(&mut self, engine: &mut EffectEngine, sample_rate: u32) -> Result<TailStep> {
        if self.done {
            return Err(Error::EffectStateFault("tail flush stepped after completion".into()));
        }
        if self.max_blocks.is_some_and(|cap| self.emitted >= cap) {
            self.done = true;
            return Ok(TailStep::Capped);
        }
        let mut block = SampleBlock::silence(self.block_frames, self.channels);
        engine.process(&mut block, sample_rate, false)?;
        let peak = block.peak();
        if peak < self.noise_floor {
            self.done = true;
            return Ok(TailStep::Decayed { peak });
        }
        self.emitted += 1;
        Ok(TailStep::Emit(block))
    }
}
