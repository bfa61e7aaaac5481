//! src/sampler/mod.rs
//!
//! Strategies that decide which frame sequences are drawn from a
//! [`FrameSource`], batch by batch.
//!
//! Every sampler answers the same three questions:
//! - `sample_keys(n)`: the next `n` sequences, returned as [`BatchKeys`]
//!   (`sequence_length` rows of `n` entries),
//! - `num_samples()`: how many sequences make up one epoch,
//! - `num_labels()`: the label count of the underlying source.
//!
//! # Variants
//!
//! ```text
//! PermutedSampler         uniform start frames, epoch-wise permutation or i.i.d. draws
//! BalancedSampler         label first (weighted), then a frame ending in that label
//! SequentialSampler       `batch_size` lanes walking videos in lock-step (evaluation)
//! SequentialBatchSampler  sliding window over one video at a time
//! UniformlySpacedSampler  fixed, evenly spaced sequences per video (evaluation)
//! ```
//!
//! [`AnySampler`] is the closed set of these variants, built from a
//! [`SamplerConfig`].
//!
//! # Module Structure
//!
//! ```text
//! src/sampler/
//! ├── mod.rs               # Sampler trait, BatchKeys, shared helpers, AnySampler
//! ├── permuted.rs
//! ├── balanced.rs
//! ├── sequential.rs
//! ├── sequential_batch.rs
//! └── uniform.rs
//! ```
//!
//! Samplers are single-consumer: `sample_keys` takes `&mut self` and mutates
//! cursors and permutations in place.

pub mod balanced;
pub mod permuted;
pub mod sequential;
pub mod sequential_batch;
pub mod uniform;

pub use balanced::{BalancedOptions, BalancedSampler};
pub use permuted::PermutedSampler;
pub use sequential::SequentialSampler;
pub use sequential_batch::SequentialBatchSampler;
pub use uniform::UniformlySpacedSampler;

use crate::config::{SamplerConfig, SamplerOptions, SequenceOptions};
use crate::error::SamplerError;
use crate::index::{FrameSource, VideoKeyTable};
use crate::key::FrameKey;
use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use std::ops::Index;
use std::sync::Arc;

/// One entry of a sampled sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SampledKey {
    Frame(FrameKey),
    /// The lane has no frame for this step (video ended or sampling finished).
    EndOfSequence,
}

impl SampledKey {
    pub fn frame(&self) -> Option<&FrameKey> {
        match self {
            SampledKey::Frame(key) => Some(key),
            SampledKey::EndOfSequence => None,
        }
    }

    pub fn is_end_of_sequence(&self) -> bool {
        matches!(self, SampledKey::EndOfSequence)
    }
}

/// Output of one `sample_keys(n)` call.
///
/// `rows[step][sequence]`: `sequence_length` rows, each holding the entry of
/// every one of the `n` sequences at that time step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchKeys {
    rows: Vec<Vec<SampledKey>>,
}

impl BatchKeys {
    /// Transposes per-sequence entries into time-step rows. Every sequence
    /// must hold exactly `sequence_length` entries.
    pub(crate) fn from_sequences(sequence_length: usize, sequences: Vec<Vec<SampledKey>>) -> Self {
        let mut rows: Vec<Vec<SampledKey>> = (0..sequence_length)
            .map(|_| Vec::with_capacity(sequences.len()))
            .collect();
        for sequence in sequences {
            debug_assert_eq!(sequence.len(), sequence_length);
            for (row, entry) in rows.iter_mut().zip(sequence) {
                row.push(entry);
            }
        }
        Self { rows }
    }

    pub fn sequence_length(&self) -> usize {
        self.rows.len()
    }

    /// Number of sequences (`n`) in the batch.
    pub fn num_sequences(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn rows(&self) -> &[Vec<SampledKey>] {
        &self.rows
    }

    /// Entries of sequence `index` in time order.
    pub fn sequence(&self, index: usize) -> Vec<&SampledKey> {
        self.rows.iter().map(|row| &row[index]).collect()
    }

    /// All sequences in time order, i.e. the transpose of `rows()`.
    pub fn sequences(&self) -> Vec<Vec<&SampledKey>> {
        (0..self.num_sequences()).map(|i| self.sequence(i)).collect()
    }

    pub fn contains_end_of_sequence(&self) -> bool {
        self.rows.iter().flatten().any(SampledKey::is_end_of_sequence)
    }
}

impl Index<usize> for BatchKeys {
    type Output = [SampledKey];

    fn index(&self, step: usize) -> &[SampledKey] {
        &self.rows[step]
    }
}

/// A strategy producing batches of frame-key sequences on demand.
pub trait Sampler: Send {
    /// Returns the next `num_sequences` sequences.
    fn sample_keys(&mut self, num_sequences: usize) -> Result<BatchKeys>;

    /// Number of sequences that make up one epoch.
    fn num_samples(&self) -> usize;

    fn num_labels(&self) -> usize;

    /// Iterates batches of `num_sequences` until one epoch worth of
    /// sequences (`num_samples()`) has been produced.
    fn epoch(&mut self, num_sequences: usize) -> EpochBatches<'_, Self>
    where
        Self: Sized,
    {
        let remaining = if num_sequences == 0 {
            0
        } else {
            self.num_samples()
        };
        EpochBatches {
            sampler: self,
            num_sequences,
            remaining,
        }
    }
}

/// Iterator returned by [`Sampler::epoch`].
///
/// Always requests full batches, so the last batch may reach into the next
/// epoch when `num_samples()` is not a multiple of the batch width.
pub struct EpochBatches<'a, S: Sampler> {
    sampler: &'a mut S,
    num_sequences: usize,
    remaining: usize,
}

impl<S: Sampler> Iterator for EpochBatches<'_, S> {
    type Item = Result<BatchKeys>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(self.num_sequences);
        let batch = self.sampler.sample_keys(self.num_sequences);
        if batch.is_err() {
            self.remaining = 0;
        }
        Some(batch)
    }
}

/// Removes, per video, the keys that cannot start a full sequence.
///
/// - `step_size > 0`: drops the last `(sequence_length - 1) * step_size` keys.
/// - `step_size < 0`: drops the first `(sequence_length - 1) * |step_size|` keys.
///
/// Videos shorter than the span keep no keys (they stay in the table, empty).
///
/// ```text
/// vid1 = [1 2 3 4 5], sequence_length = 3
///   step  1 → [1 2 3]
///   step -1 → [3 4 5]
///   step  2 → [1]
/// ```
pub fn filter_boundary_frames(
    video_keys: &VideoKeyTable,
    sequence_length: usize,
    step_size: i64,
) -> VideoKeyTable {
    let span = sequence_length.saturating_sub(1) * step_size.unsigned_abs() as usize;
    video_keys
        .iter()
        .map(|(video, keys)| {
            let kept = keys.len().saturating_sub(span);
            let kept = if step_size >= 0 {
                keys[..kept].to_vec()
            } else {
                keys[keys.len() - kept..].to_vec()
            };
            (video.clone(), kept)
        })
        .collect()
}

/// Flattens a table into one key list, videos in table order.
pub(crate) fn flatten_keys(table: VideoKeyTable) -> Vec<FrameKey> {
    table.into_values().flatten().collect()
}

/// Walks `sequence_length` frames from `start` in steps of `step_size`.
///
/// An out-of-range step is a `MissingFrame` error unless
/// `use_boundary_frames` is set, in which case the last valid key repeats.
pub(crate) fn walk_sequence(
    source: &dyn FrameSource,
    start: &FrameKey,
    sequence_length: usize,
    step_size: i64,
    use_boundary_frames: bool,
) -> Result<Vec<FrameKey>> {
    let (video, first) = source.frame_video_offset(start)?;
    let mut sequence: Vec<FrameKey> = Vec::with_capacity(sequence_length);
    for step in 0..sequence_length as i64 {
        let frame = first as i64 + step * step_size;
        match source.key_at(video, frame) {
            Some(key) => sequence.push(key.clone()),
            None if use_boundary_frames => {
                // `start` itself is in range, so there is always a last key.
                let last = sequence.last().cloned().unwrap_or_else(|| start.clone());
                sequence.push(last);
            }
            None => {
                return Err(SamplerError::MissingFrame {
                    video: video.to_string(),
                    frame,
                    num_frames: source.video_len(video),
                }
                .into())
            }
        }
    }
    Ok(sequence)
}

/// The closed set of sampler variants, dispatched without boxing.
#[derive(Debug)]
pub enum AnySampler {
    Permuted(PermutedSampler),
    Balanced(BalancedSampler),
    Sequential(SequentialSampler),
    SequentialBatch(SequentialBatchSampler),
    UniformlySpaced(UniformlySpacedSampler),
}

impl AnySampler {
    /// Validates `config` and constructs the sampler it names.
    ///
    /// # Example
    /// ```ignore
    /// let source: Arc<dyn FrameSource> = Arc::new(index);
    /// let config = SamplerConfig::from_json_file("sampler.json")?;
    /// let mut sampler = AnySampler::new(&config, source, StdRng::seed_from_u64(0))?;
    /// let batch = sampler.sample_keys(16)?;
    /// ```
    pub fn new(config: &SamplerConfig, source: Arc<dyn FrameSource>, rng: StdRng) -> Result<Self> {
        let sequence: SequenceOptions = config.sequence;
        sequence.validate()?;

        let sampler = match &config.options {
            SamplerOptions::Permuted { replace } => {
                AnySampler::Permuted(PermutedSampler::new(source, sequence, *replace, rng)?)
            }
            SamplerOptions::Balanced {
                background_weight,
                include_bg,
                label_weights,
            } => {
                ensure!(
                    include_bg.is_none() || background_weight.is_none(),
                    SamplerError::config("include_bg and background_weight are mutually exclusive")
                );
                ensure!(
                    include_bg.is_none(),
                    SamplerError::config("include_bg is no longer supported, use background_weight")
                );
                let options = BalancedOptions {
                    background_weight: background_weight.unwrap_or(0.0),
                    label_weights: label_weights.clone(),
                };
                AnySampler::Balanced(BalancedSampler::new(source, sequence, options, rng)?)
            }
            SamplerOptions::Sequential {
                batch_size,
                sample_once,
            } => {
                let batch_size = batch_size.ok_or_else(|| {
                    SamplerError::config("SequentialSampler requires batch_size")
                })?;
                AnySampler::Sequential(SequentialSampler::new(
                    source,
                    sequence,
                    batch_size,
                    *sample_once,
                    rng,
                )?)
            }
            SamplerOptions::SequentialBatch { stride } => AnySampler::SequentialBatch(
                SequentialBatchSampler::new(source, sequence, *stride, rng)?,
            ),
            SamplerOptions::UniformlySpaced {
                num_frames_per_video,
            } => {
                let num_frames_per_video = num_frames_per_video.ok_or_else(|| {
                    SamplerError::config("UniformlySpacedSampler requires num_frames_per_video")
                })?;
                AnySampler::UniformlySpaced(UniformlySpacedSampler::new(
                    source,
                    sequence,
                    num_frames_per_video,
                )?)
            }
        };
        log::info!(
            "Built {} over {} eligible sequences",
            config.options.name(),
            sampler.num_samples()
        );
        Ok(sampler)
    }
}

impl Sampler for AnySampler {
    fn sample_keys(&mut self, num_sequences: usize) -> Result<BatchKeys> {
        match self {
            AnySampler::Permuted(s) => s.sample_keys(num_sequences),
            AnySampler::Balanced(s) => s.sample_keys(num_sequences),
            AnySampler::Sequential(s) => s.sample_keys(num_sequences),
            AnySampler::SequentialBatch(s) => s.sample_keys(num_sequences),
            AnySampler::UniformlySpaced(s) => s.sample_keys(num_sequences),
        }
    }

    fn num_samples(&self) -> usize {
        match self {
            AnySampler::Permuted(s) => s.num_samples(),
            AnySampler::Balanced(s) => s.num_samples(),
            AnySampler::Sequential(s) => s.num_samples(),
            AnySampler::SequentialBatch(s) => s.num_samples(),
            AnySampler::UniformlySpaced(s) => s.num_samples(),
        }
    }

    fn num_labels(&self) -> usize {
        match self {
            AnySampler::Permuted(s) => s.num_labels(),
            AnySampler::Balanced(s) => s.num_labels(),
            AnySampler::Sequential(s) => s.num_labels(),
            AnySampler::SequentialBatch(s) => s.num_labels(),
            AnySampler::UniformlySpaced(s) => s.num_labels(),
        }
    }
}

/// ============================================================================
#[cfg(test)]
pub(crate) mod test_utils {
    use crate::index::{FrameSource, InMemoryFrameIndex};
    use crate::key::FrameKey;
    use std::sync::Arc;

    pub const TEST_SEED: u64 = 42;

    /// Index with one unlabelled video per `(id, num_frames)` pair.
    pub fn make_index(videos: &[(&str, usize)], num_labels: usize) -> InMemoryFrameIndex {
        videos
            .iter()
            .fold(InMemoryFrameIndex::new(num_labels), |index, &(video, n)| {
                index.with_video(video, n)
            })
    }

    pub fn shared(index: InMemoryFrameIndex) -> Arc<dyn FrameSource> {
        Arc::new(index)
    }

    pub fn key(video: &str, frame: usize) -> FrameKey {
        FrameKey::new(video, frame)
    }

    /// Frame numbers of a batch, one `Vec` per sequence (`None` = END_OF_SEQUENCE).
    pub fn frame_numbers(batch: &super::BatchKeys) -> Vec<Vec<Option<usize>>> {
        batch
            .sequences()
            .into_iter()
            .map(|seq| {
                seq.into_iter()
                    .map(|entry| entry.frame().map(FrameKey::frame_number))
                    .collect()
            })
            .collect()
    }
}
