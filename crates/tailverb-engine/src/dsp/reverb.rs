//! # Freeverb-style reverb
//!
//! Eight parallel damped comb filters feed four series all-pass diffusers,
//! once per output channel. The right channel's delay lines are a few
//! samples longer than the left's, which decorrelates the two sides and
//! gives the stereo image its width.
//!
//! Delay lengths are tuned for 44.1 kHz and scaled to the prepared sample
//! rate, so the same parameters sound the same at any rate.

use serde::{Deserialize, Serialize};

use super::comb::{AllPassFilter, CombFilter};
use super::effect::Effect;
use crate::error::{Error, Result};

const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;
const TUNING_RATE: f64 = 44_100.0;

const FIXED_GAIN: f32 = 0.015;
const SCALE_WET: f32 = 3.0;
const SCALE_DRY: f32 = 2.0;
const SCALE_DAMP: f32 = 0.4;
const SCALE_ROOM: f32 = 0.28;
const OFFSET_ROOM: f32 = 0.7;

/// Reverb parameters. Every field is a normalised value in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbParams {
    pub room_size: f32,
    pub damping: f32,
    pub wet_level: f32,
    pub dry_level: f32,
    pub width: f32,
    /// Values >= 0.5 freeze the tank: infinite sustain, no new input.
    pub freeze_mode: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            wet_level: 0.33,
            dry_level: 0.5,
            width: 1.0,
            freeze_mode: 0.0,
        }
    }
}

impl ReverbParams {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("room_size", self.room_size),
            ("damping", self.damping),
            ("wet_level", self.wet_level),
            ("dry_level", self.dry_level),
            ("width", self.width),
            ("freeze_mode", self.freeze_mode),
        ];
        for (name, value) in fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.freeze_mode >= 0.5
    }
}

/// Derived per-sample gains.
#[derive(Debug, Clone, Copy)]
struct Gains {
    input: f32,
    feedback: f32,
    damp: f32,
    wet1: f32,
    wet2: f32,
    dry: f32,
}

impl Gains {
    fn from_params(p: &ReverbParams) -> Self {
        let frozen = p.is_frozen();
        let wet = p.wet_level * SCALE_WET;
        Self {
            input: if frozen { 0.0 } else { FIXED_GAIN },
            feedback: if frozen { 1.0 } else { p.room_size * SCALE_ROOM + OFFSET_ROOM },
            damp: if frozen { 0.0 } else { p.damping * SCALE_DAMP },
            wet1: 0.5 * wet * (1.0 + p.width),
            wet2: 0.5 * wet * (1.0 - p.width),
            dry: p.dry_level * SCALE_DRY,
        }
    }
}

/// One channel's comb bank and diffuser chain.
struct Tank {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllPassFilter>,
}

impl Tank {
    fn new(sample_rate: u32, spread: usize) -> Self {
        let scale = |n: usize| ((n + spread) as f64 * sample_rate as f64 / TUNING_RATE).round() as usize;
        Self {
            combs: COMB_TUNINGS.iter().map(|&n| CombFilter::new(scale(n))).collect(),
            allpasses: ALLPASS_TUNINGS.iter().map(|&n| AllPassFilter::new(scale(n))).collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, g: &Gains) -> f32 {
        let mut out = 0.0;
        for comb in self.combs.iter_mut() {
            out += comb.process(input, g.damp, g.feedback);
        }
        for ap in self.allpasses.iter_mut() {
            out = ap.process(out);
        }
        out
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::clear);
        self.allpasses.iter_mut().for_each(AllPassFilter::clear);
    }
}

/// Mono (one tank) or stereo (two tanks, cross-mixed by width).
enum Unit {
    Mono(Tank),
    Stereo(Tank, Tank),
}

impl Unit {
    fn width(&self) -> usize {
        match self {
            Unit::Mono(_) => 1,
            Unit::Stereo(..) => 2,
        }
    }

    fn clear(&mut self) {
        match self {
            Unit::Mono(t) => t.clear(),
            Unit::Stereo(l, r) => {
                l.clear();
                r.clear();
            }
        }
    }
}

/// Reverb effect. Channels are grouped into stereo pairs; an odd last
/// channel gets its own mono unit.
pub struct Reverb {
    gains: Gains,
    units: Vec<Unit>,
    channels: usize,
}

impl Reverb {
    pub fn new(params: ReverbParams) -> Self {
        Self { gains: Gains::from_params(&params), units: Vec::new(), channels: 0 }
    }
}

impl Effect for Reverb {
    fn prepare(&mut self, sample_rate: u32, channels: usize) {
        self.channels = channels;
        self.units.clear();
        let mut remaining = channels;
        while remaining > 0 {
            if remaining >= 2 {
                self.units.push(Unit::Stereo(
                    Tank::new(sample_rate, 0),
                    Tank::new(sample_rate, STEREO_SPREAD),
                ));
                remaining -= 2;
            } else {
                self.units.push(Unit::Mono(Tank::new(sample_rate, 0)));
                remaining -= 1;
            }
        }
    }

    fn reset(&mut self) {
        self.units.iter_mut().for_each(Unit::clear);
    }

    fn process(&mut self, block: &mut [f32]) {
        if self.channels == 0 {
            return;
        }
        let g = self.gains;
        for frame in block.chunks_exact_mut(self.channels) {
            let mut offset = 0;
            for unit in self.units.iter_mut() {
                match unit {
                    Unit::Mono(tank) => {
                        let dry = frame[offset];
                        let wet = tank.process(dry * g.input, &g);
                        frame[offset] = wet * g.wet1 + dry * g.dry;
                    }
                    Unit::Stereo(left, right) => {
                        let (dl, dr) = (frame[offset], frame[offset + 1]);
                        let input = (dl + dr) * g.input;
                        let wl = left.process(input, &g);
                        let wr = right.process(input, &g);
                        frame[offset] = wl * g.wet1 + wr * g.wet2 + dl * g.dry;
                        frame[offset + 1] = wr * g.wet1 + wl * g.wet2 + dr * g.dry;
                    }
                }
                offset += unit.width();
            }
        }
    }
}
