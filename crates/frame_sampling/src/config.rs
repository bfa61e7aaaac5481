//! src/config.rs
//!
//! Configuration for sampler construction.
//!
//! A `SamplerConfig` carries the options shared by every sampler
//! (`SequenceOptions`) and the options of one sampler variant
//! (`SamplerOptions`). It can be built in code or read from JSON:
//!
//! ```ignore
//! let config = SamplerConfig::builder()
//!     .sequence_length(8)
//!     .step_size(2)
//!     .options(SamplerOptions::Permuted { replace: false })
//!     .build()?;
//!
//! let config = SamplerConfig::from_json_str(r#"{
//!     "sampler": "balanced",
//!     "sequence_length": 4,
//!     "background_weight": 0.5
//! }"#)?;
//! ```
//!
//! Variant options are checked when the sampler is constructed
//! (see [`AnySampler::new`](crate::sampler::AnySampler::new)); missing
//! required options and the rejected `include_bg` option surface there as
//! [`SamplerError::Config`].

use crate::error::SamplerError;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Shape of the sequences every sampler produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceOptions {
    /// Frames per sequence (>= 1).
    pub sequence_length: usize,
    /// Frame distance between consecutive sequence entries. The sign gives
    /// the direction; zero is invalid.
    pub step_size: i64,
    /// If true, sequences that run past a video boundary repeat the edge frame
    /// instead of being excluded.
    pub use_boundary_frames: bool,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            sequence_length: 1,
            step_size: 1,
            use_boundary_frames: false,
        }
    }
}

impl SequenceOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sequence_length >= 1,
            SamplerError::config("sequence_length must be >= 1")
        );
        ensure!(self.step_size != 0, SamplerError::config("step_size must be non-zero"));
        Ok(())
    }

    /// Frames a full sequence spans beyond its first frame: `(L - 1) * |S|`.
    pub fn span(&self) -> usize {
        (self.sequence_length - 1) * self.step_size.unsigned_abs() as usize
    }

    pub(crate) fn require_forward(&self, sampler: &str) -> Result<()> {
        ensure!(
            self.step_size > 0,
            SamplerError::config(format!(
                "{sampler} walks videos forward and needs step_size > 0, but got {}",
                self.step_size
            ))
        );
        Ok(())
    }
}

/// Variant-specific options, tagged by `"sampler"` in serialized form.
///
/// Fields that belong neither to [`SequenceOptions`] nor to the selected
/// variant are rejected. `SamplerConfig` flattens `sequence` before
/// `options`, so the shared fields are consumed before the variant is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sampler", rename_all = "snake_case", deny_unknown_fields)]
pub enum SamplerOptions {
    Permuted {
        #[serde(default)]
        replace: bool,
    },
    Balanced {
        /// Sampling weight of the background slot. Defaults to 0 (never drawn).
        background_weight: Option<f64>,
        /// Deprecated boolean predecessor of `background_weight`; always rejected.
        include_bg: Option<bool>,
        /// Per-label weights for labels `1..=num_labels`. Defaults to all 1.0.
        label_weights: Option<Vec<f64>>,
    },
    Sequential {
        /// Number of lanes. Required.
        batch_size: Option<usize>,
        #[serde(default)]
        sample_once: bool,
    },
    SequentialBatch {
        /// Window advance in frames. Defaults to `sequence_length`.
        stride: Option<usize>,
    },
    UniformlySpaced {
        /// Sequences per video. Required.
        num_frames_per_video: Option<usize>,
    },
}

impl Default for SamplerOptions {
    fn default() -> Self {
        SamplerOptions::Permuted { replace: false }
    }
}

impl SamplerOptions {
    pub fn name(&self) -> &'static str {
        match self {
            SamplerOptions::Permuted { .. } => "PermutedSampler",
            SamplerOptions::Balanced { .. } => "BalancedSampler",
            SamplerOptions::Sequential { .. } => "SequentialSampler",
            SamplerOptions::SequentialBatch { .. } => "SequentialBatchSampler",
            SamplerOptions::UniformlySpaced { .. } => "UniformlySpacedSampler",
        }
    }
}

/// Full sampler configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(flatten)]
    pub sequence: SequenceOptions,
    #[serde(flatten)]
    pub options: SamplerOptions,
}

impl SamplerConfig {
    pub fn builder() -> SamplerConfigBuilder {
        SamplerConfigBuilder::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SamplerConfig =
            serde_json::from_str(json).context("Failed to parse sampler configuration")?;
        config.sequence.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read sampler configuration: {}", path.display()))?;
        Self::from_json_str(&json)
    }
}

/// Builder for SamplerConfig with method chaining
#[derive(Default)]
pub struct SamplerConfigBuilder {
    config: SamplerConfig,
}

impl SamplerConfigBuilder {
    /// Set the number of frames per sequence (must be >= 1)
    pub fn sequence_length(mut self, length: usize) -> Self {
        self.config.sequence.sequence_length = length;
        self
    }

    /// Set the frame step between sequence entries (non-zero, sign = direction)
    pub fn step_size(mut self, step: i64) -> Self {
        self.config.sequence.step_size = step;
        self
    }

    /// Allow sequences that cross a video boundary, padded with the edge frame
    pub fn use_boundary_frames(mut self, enabled: bool) -> Self {
        self.config.sequence.use_boundary_frames = enabled;
        self
    }

    /// Select the sampler variant and its options
    pub fn options(mut self, options: SamplerOptions) -> Self {
        self.config.options = options;
        self
    }

    /// Build the final configuration, validating the shared options.
    pub fn build(self) -> Result<SamplerConfig> {
        self.config.sequence.validate()?;
        Ok(self.config)
    }
}
