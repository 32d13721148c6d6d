//! Pipeline configuration and its optional TOML file form.
//!
//! ```toml
//! [reverb]
//! room_size = 0.8
//! wet_level = 0.4
//!
//! [stream]
//! block_size = 8192
//! noise_floor = 1e-4
//! cut_reverb_tail = false
//! ```
//!
//! Missing keys take the built-in defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::reverb::ReverbParams;
use crate::error::{Error, Result};

pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024;
pub const DEFAULT_NOISE_FLOOR: f32 = 1e-4;

/// Stream-level knobs: chunking, tail handling, destination policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames per processed block.
    pub block_size: usize,
    /// Tail flush stops on the first block whose peak is below this.
    pub noise_floor: f32,
    /// Skip the tail flush; output length equals input length.
    pub cut_reverb_tail: bool,
    /// Stop the tail flush after this many appended blocks.
    pub max_tail_blocks: Option<usize>,
    /// Replace an existing destination file.
    pub overwrite: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            noise_floor: DEFAULT_NOISE_FLOOR,
            cut_reverb_tail: false,
            max_tail_blocks: None,
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub reverb: ReverbParams,
    pub stream: StreamConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.reverb.validate()?;
        let s = &self.stream;
        if s.block_size == 0 {
            return Err(Error::Config("block_size must be at least 1".into()));
        }
        if !s.noise_floor.is_finite() || s.noise_floor <= 0.0 {
            return Err(Error::Config(format!("noise_floor must be positive, got {}", s.noise_floor)));
        }
        // a frozen tank never decays, so an open-ended flush would never end
        if self.reverb.is_frozen() && !s.cut_reverb_tail && s.max_tail_blocks.is_none() {
            return Err(Error::Config(
                "freeze_mode >= 0.5 sustains forever; set cut_reverb_tail or max_tail_blocks".into(),
            ));
        }
        Ok(())
    }
}
