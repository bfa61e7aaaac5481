use super::{walk_sequence, BatchKeys, SampledKey, Sampler};
use crate::config::SequenceOptions;
use crate::error::SamplerError;
use crate::index::FrameSource;
use crate::key::FrameKey;
use anyhow::{ensure, Result};
use std::sync::Arc;

/// `floor(linspace(1, num_frames, count))`, computed exactly in integers.
pub fn uniform_positions(num_frames: usize, count: usize) -> Vec<usize> {
    if num_frames == 0 {
        return Vec::new();
    }
    match count {
        0 => Vec::new(),
        1 => vec![1],
        // `i * (N - 1) / (K - 1)` is the exact floor of the linspace offset.
        _ => (0..count)
            .map(|i| 1 + i * (num_frames - 1) / (count - 1))
            .collect(),
    }
}

/// Fixed, evenly spaced sequences from every video, for evaluation.
///
/// For a video of `N` frames, the `num_frames_per_video` end positions are
/// `floor(linspace(1, N, K))`, each raised to at least the sequence span so
/// that a full sequence ending there fits. A video shorter than one sequence
/// yields sequences starting at frame 1, padded with its last frame.
///
/// All sequences are computed at construction (videos in index order) and
/// served in order; after the last one, serving wraps to the first.
#[derive(Debug)]
pub struct UniformlySpacedSampler {
    source: Arc<dyn FrameSource>,
    sequences: Vec<Vec<FrameKey>>,
    sequence_length: usize,
    cursor: usize,
}

impl UniformlySpacedSampler {
    pub fn new(
        source: Arc<dyn FrameSource>,
        sequence: SequenceOptions,
        num_frames_per_video: usize,
    ) -> Result<Self> {
        sequence.validate()?;
        sequence.require_forward("UniformlySpacedSampler")?;
        ensure!(
            num_frames_per_video >= 1,
            SamplerError::config("num_frames_per_video must be >= 1")
        );

        let span = sequence.span();
        let mut sequences = Vec::with_capacity(source.video_keys().len() * num_frames_per_video);
        for (video, keys) in source.video_keys() {
            if keys.is_empty() {
                continue;
            }
            for end in uniform_positions(keys.len(), num_frames_per_video) {
                let end = end.max(span + 1);
                let start = FrameKey::new(video, end - span);
                sequences.push(walk_sequence(
                    source.as_ref(),
                    &start,
                    sequence.sequence_length,
                    sequence.step_size,
                    true,
                )?);
            }
        }
        ensure!(
            !sequences.is_empty(),
            SamplerError::config("UniformlySpacedSampler found no frames")
        );

        Ok(Self {
            source,
            sequences,
            sequence_length: sequence.sequence_length,
            cursor: 0,
        })
    }
}

impl Sampler for UniformlySpacedSampler {
    fn sample_keys(&mut self, num_sequences: usize) -> Result<BatchKeys> {
        let mut sequences = Vec::with_capacity(num_sequences);
        for _ in 0..num_sequences {
            if self.cursor >= self.sequences.len() {
                log::info!(
                    "UniformlySpacedSampler served all {} sequences, wrapping to the start",
                    self.sequences.len()
                );
                self.cursor = 0;
            }
            let sequence = &self.sequences[self.cursor];
            sequences.push(sequence.iter().cloned().map(SampledKey::Frame).collect());
            self.cursor += 1;
        }
        Ok(BatchKeys::from_sequences(self.sequence_length, sequences))
    }

    fn num_samples(&self) -> usize {
        self.sequences.len()
    }

    fn num_labels(&self) -> usize {
        self.source.num_labels()
    }
}
