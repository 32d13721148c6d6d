use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tailverb_engine::Progress;

/// Seconds-processed bar for the body, spinner for the open-ended tail.
pub struct BarProgress {
    bar: ProgressBar,
    tail_style: ProgressStyle,
    in_tail: bool,
}

impl BarProgress {
    pub fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(ProgressStyle::with_template(
            "{percent:>3}% |{wide_bar}| {msg} [{elapsed_precise}<{eta_precise}]",
        )?);
        let tail_style = ProgressStyle::with_template("{spinner} {msg} [{elapsed_precise}]")?;
        Ok(Self { bar, tail_style, in_tail: false })
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}

impl Progress for BarProgress {
    fn body(&mut self, frames_done: u64, total_frames: u64, sample_rate: u32) {
        let rate = sample_rate as f64;
        self.bar.set_length(total_frames);
        self.bar.set_position(frames_done);
        self.bar.set_message(format!(
            "{:.2}/{:.2} seconds processed",
            frames_done as f64 / rate,
            total_frames as f64 / rate
        ));
    }

    fn tail(&mut self, tail_frames: u64, sample_rate: u32) {
        if !self.in_tail {
            self.bar.set_style(self.tail_style.clone());
            self.in_tail = true;
        }
        self.bar.set_message(format!(
            "flushing reverb tail: {:.2} s",
            tail_frames as f64 / sample_rate as f64
        ));
        self.bar.tick();
    }
}
