//! # Comb and all-pass filters
//!
//! The two building blocks of a Schroeder/Moorer style reverb. Both are a
//! fixed-length ring buffer read one full buffer length behind the write
//! head, so the delay time equals the buffer length.
//!
//! ```text
//! comb:     y[n] = buf[n - D];  lp = y*(1-d) + lp*d;  buf[n] = x + lp*fb
//! all-pass: b = buf[n - D];     buf[n] = x + b*0.5;   y = b - x
//! ```
//!
//! The comb's feedback path runs through a one-pole lowpass (`damp`), which
//! darkens every recirculation the way absorptive walls do.

/// Values below this are flushed to zero so decaying state reaches exact
/// silence instead of lingering as denormals.
const DENORMAL_FLOOR: f32 = 1.0e-20;

#[inline]
fn flush_denormal(x: f32) -> f32 {
    if x.abs() < DENORMAL_FLOOR {
        0.0
    } else {
        x
    }
}

/// Feedback comb filter with a damped (lowpassed) feedback path.
pub struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    /// One-pole lowpass memory in the feedback path.
    last: f32,
}

impl CombFilter {
    pub fn new(length: usize) -> Self {
        Self { buffer: vec![0.0; length.max(1)], index: 0, last: 0.0 }
    }

    /// Process one sample.
    ///
    /// * `damp` - lowpass coefficient in the feedback path, 0 = bright.
    /// * `feedback` - recirculation gain. Below 1.0 the stored energy
    ///   decays geometrically once the input goes silent.
    #[inline]
    pub fn process(&mut self, input: f32, damp: f32, feedback: f32) -> f32 {
        let output = self.buffer[self.index];
        self.last = flush_denormal(output * (1.0 - damp) + self.last * damp);
        self.buffer[self.index] = flush_denormal(input + self.last * feedback);
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
        self.last = 0.0;
    }
}

/// Schroeder all-pass diffuser with a fixed 0.5 coefficient.
pub struct AllPassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllPassFilter {
    pub fn new(length: usize) -> Self {
        Self { buffer: vec![0.0; length.max(1)], index: 0 }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = flush_denormal(input + buffered * 0.5);
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An impulse re-emerges exactly one buffer length later.
    #[test]
    fn comb_delays_by_length() {
        let mut comb = CombFilter::new(4);
        let mut out = Vec::new();
        out.push(comb.process(1.0, 0.0, 0.5));
        for _ in 0..8 {
            out.push(comb.process(0.0, 0.0, 0.5));
        }
        assert_eq!(out[0], 0.0);
        assert!((out[4] - 1.0).abs() < 1e-6);
        // second pass scaled by feedback
        assert!((out[8] - 0.5).abs() < 1e-6);
    }

    /// Under silence the comb's energy falls to exactly zero.
    #[test]
    fn comb_decays_to_silence() {
        let mut comb = CombFilter::new(10);
        comb.process(1.0, 0.2, 0.8);
        let mut last = 1.0;
        for _ in 0..200_000 {
            last = comb.process(0.0, 0.2, 0.8);
        }
        assert_eq!(last, 0.0);
    }

    #[test]
    fn allpass_passes_input_inverted_first() {
        let mut ap = AllPassFilter::new(3);
        assert!((ap.process(1.0) + 1.0).abs() < 1e-6);
        assert_eq!(ap.process(0.0), 0.0);
        assert_eq!(ap.process(0.0), 0.0);
        // buffered impulse comes back after the delay
        assert!((ap.process(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn clear_resets_state() {
        let mut comb = CombFilter::new(2);
        comb.process(1.0, 0.5, 0.5);
        comb.clear();
        for _ in 0..4 {
            assert_eq!(comb.process(0.0, 0.5, 0.5), 0.0);
        }
    }
}
