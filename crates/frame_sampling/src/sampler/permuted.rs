use super::{filter_boundary_frames, flatten_keys, walk_sequence, BatchKeys, SampledKey, Sampler};
use crate::config::SequenceOptions;
use crate::error::SamplerError;
use crate::index::FrameSource;
use crate::key::FrameKey;
use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

/// Uniform sampling of sequence start frames, epoch by epoch.
///
/// # Arguments:
/// - `source`: Frame index to sample from.
/// - `sequence`: Sequence shape. Each sequence is `{k, k+step, k+2*step, ...}`.
/// - `replace`: If `true`, every epoch is `num_samples()` independent uniform
///              draws (keys may repeat);
///              If `false`, every epoch is a fresh permutation of all eligible keys.
/// - `rng`: Generator owned by the sampler for its whole lifetime.
///
/// # Eligible keys
/// With `use_boundary_frames = false`, only keys that can start a full
/// sequence are eligible (see [`filter_boundary_frames`]), so walking a
/// sequence never leaves the video. With boundary frames every frame is
/// eligible and out-of-range steps repeat the last in-range key.
///
/// # Epochs
/// The order is consumed one key per sequence. Once all `num_samples()` keys
/// of the current order have been used, a new order is drawn before the next
/// sequence. No signal reaches the caller beyond the count itself.
///
/// # Example
/// ```ignore
/// // vid1 has 5 frames: eligible starts are frames 1, 2, 3
/// let mut sampler = PermutedSampler::new(source, sequence_of_3, false, rng)?;
/// assert_eq!(sampler.num_samples(), 3);
/// let batch = sampler.sample_keys(3)?; // a permutation of [1,2,3], [2,3,4], [3,4,5]
/// ```
#[derive(Debug)]
pub struct PermutedSampler {
    source: Arc<dyn FrameSource>,
    sequence: SequenceOptions,
    replace: bool,
    keys: Vec<FrameKey>,
    order: Vec<usize>,
    cursor: usize,
    epoch: usize,
    rng: StdRng,
}

impl PermutedSampler {
    pub fn new(
        source: Arc<dyn FrameSource>,
        sequence: SequenceOptions,
        replace: bool,
        rng: StdRng,
    ) -> Result<Self> {
        sequence.validate()?;

        let keys = if sequence.use_boundary_frames {
            flatten_keys(source.video_keys().clone())
        } else {
            flatten_keys(filter_boundary_frames(
                source.video_keys(),
                sequence.sequence_length,
                sequence.step_size,
            ))
        };
        ensure!(
            !keys.is_empty(),
            SamplerError::config(format!(
                "No video is long enough for a sequence spanning {} frames",
                sequence.span() + 1
            ))
        );

        let mut sampler = Self {
            source,
            sequence,
            replace,
            keys,
            order: Vec::new(),
            cursor: 0,
            epoch: 0,
            rng,
        };
        sampler.refresh_order();
        Ok(sampler)
    }

    /// Draws the order for the next epoch and rewinds the cursor.
    fn refresh_order(&mut self) {
        let num_keys = self.keys.len();
        if self.replace {
            let rng = &mut self.rng;
            self.order.clear();
            self.order
                .extend((0..num_keys).map(|_| rng.random_range(0..num_keys)));
        } else {
            if self.order.len() != num_keys {
                self.order = (0..num_keys).collect();
            }
            self.order.shuffle(&mut self.rng);
        }
        self.cursor = 0;
    }

    fn next_start(&mut self) -> &FrameKey {
        if self.cursor >= self.order.len() {
            self.epoch += 1;
            log::info!(
                "PermutedSampler finished epoch {} ({} sequences), drawing a new order",
                self.epoch,
                self.order.len()
            );
            self.refresh_order();
        }
        let key = &self.keys[self.order[self.cursor]];
        self.cursor += 1;
        key
    }

    /// Number of completed passes over the eligible keys.
    pub fn epochs_completed(&self) -> usize {
        self.epoch
    }
}

impl Sampler for PermutedSampler {
    fn sample_keys(&mut self, num_sequences: usize) -> Result<BatchKeys> {
        let SequenceOptions {
            sequence_length,
            step_size,
            use_boundary_frames,
        } = self.sequence;

        let mut sequences = Vec::with_capacity(num_sequences);
        for _ in 0..num_sequences {
            let start = self.next_start().clone();
            let sequence = walk_sequence(
                self.source.as_ref(),
                &start,
                sequence_length,
                step_size,
                use_boundary_frames,
            )?;
            sequences.push(sequence.into_iter().map(SampledKey::Frame).collect());
        }
        Ok(BatchKeys::from_sequences(sequence_length, sequences))
    }

    fn num_samples(&self) -> usize {
        self.keys.len()
    }

    fn num_labels(&self) -> usize {
        self.source.num_labels()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    fn sequence(sequence_length: usize, step_size: i64) -> SequenceOptions {
        SequenceOptions {
            sequence_length,
            step_size,
            use_boundary_frames: false,
        }
    }

    fn sampler(
        videos: &[(&str, usize)],
        options: SequenceOptions,
        replace: bool,
        seed: u64,
    ) -> PermutedSampler {
        PermutedSampler::new(
            shared(make_index(videos, 1)),
            options,
            replace,
            StdRng::seed_from_u64(seed),
        )
        .unwrap()
    }

    /// First frame of every sequence in the batch.
    fn starts(batch: &BatchKeys) -> Vec<FrameKey> {
        batch[0]
            .iter()
            .map(|entry| entry.frame().cloned().unwrap())
            .collect()
    }

    #[test]
    fn single_video_scenario() -> Result<()> {
        let mut sampler = sampler(&[("vid1", 5)], sequence(3, 1), false, TEST_SEED);
        assert_eq!(sampler.num_samples(), 3);

        let batch = sampler.sample_keys(3)?;
        let mut sequences = frame_numbers(&batch);
        sequences.sort();
        assert_eq!(
            sequences,
            vec![
                vec![Some(1), Some(2), Some(3)],
                vec![Some(2), Some(3), Some(4)],
                vec![Some(3), Some(4), Some(5)],
            ]
        );
        Ok(())
    }

    #[test]
    fn without_replacement_visits_every_key_once_per_epoch() -> Result<()> {
        let videos = [("a", 20), ("b", 7), ("c", 2)];
        let mut sampler = sampler(&videos, sequence(2, 3), false, TEST_SEED);
        // a: 20 - 3 = 17, b: 7 - 3 = 4, c: too short
        let n = sampler.num_samples();
        assert_eq!(n, 21);

        let first = starts(&sampler.sample_keys(n)?);
        let second = starts(&sampler.sample_keys(n)?);
        assert_eq!(HashSet::<_>::from_iter(first.iter()).len(), n);
        assert_eq!(HashSet::<_>::from_iter(second.iter()).len(), n);
        assert_ne!(first, second);
        assert_eq!(sampler.epochs_completed(), 1);
        Ok(())
    }

    #[test]
    fn epoch_boundary_inside_a_batch() -> Result<()> {
        let mut sampler = sampler(&[("vid1", 10)], sequence(1, 1), false, TEST_SEED);
        let batch = starts(&sampler.sample_keys(15)?);
        let first_epoch: HashSet<_> = batch[..10].iter().collect();
        assert_eq!(first_epoch.len(), 10);
        Ok(())
    }

    #[test]
    fn same_seed_same_order() -> Result<()> {
        let videos = [("a", 30), ("b", 12)];
        let mut first = sampler(&videos, sequence(4, 1), false, TEST_SEED);
        let mut second = sampler(&videos, sequence(4, 1), false, TEST_SEED);
        let mut other = sampler(&videos, sequence(4, 1), false, TEST_SEED + 1);
        let n = first.num_samples();

        let a = first.sample_keys(n)?;
        assert_eq!(a, second.sample_keys(n)?);
        assert_ne!(a, other.sample_keys(n)?);
        Ok(())
    }

    #[test]
    fn with_replacement_is_uniform() -> Result<()> {
        let mut sampler = sampler(&[("vid1", 10)], sequence(1, 1), true, TEST_SEED);
        assert_eq!(sampler.num_samples(), 10);

        let draws = 20_000;
        let mut counts: HashMap<FrameKey, usize> = HashMap::new();
        for key in starts(&sampler.sample_keys(draws)?) {
            *counts.entry(key).or_default() += 1;
        }
        assert_eq!(counts.len(), 10);
        for (key, count) in counts {
            let rate = count as f64 / draws as f64;
            assert!((rate - 0.1).abs() < 0.02, "{key}: {rate}");
        }
        Ok(())
    }

    #[test]
    fn with_replacement_repeats_keys() -> Result<()> {
        let mut sampler = sampler(&[("vid1", 50)], sequence(1, 1), true, TEST_SEED);
        let batch = starts(&sampler.sample_keys(50)?);
        assert!(HashSet::<_>::from_iter(batch.iter()).len() < 50);
        Ok(())
    }

    #[test]
    fn backward_steps_stay_inside_video() -> Result<()> {
        let mut sampler = sampler(&[("vid1", 6)], sequence(3, -2), false, TEST_SEED);
        assert_eq!(sampler.num_samples(), 2);
        let mut sequences = frame_numbers(&sampler.sample_keys(2)?);
        sequences.sort();
        assert_eq!(
            sequences,
            vec![vec![Some(5), Some(3), Some(1)], vec![Some(6), Some(4), Some(2)]]
        );
        Ok(())
    }

    #[test]
    fn boundary_frames_make_every_frame_eligible() -> Result<()> {
        let options = SequenceOptions {
            sequence_length: 3,
            step_size: 1,
            use_boundary_frames: true,
        };
        let mut sampler = sampler(&[("vid1", 4)], options, false, TEST_SEED);
        assert_eq!(sampler.num_samples(), 4);
        let mut sequences = frame_numbers(&sampler.sample_keys(4)?);
        sequences.sort();
        assert_eq!(sequences[3], vec![Some(4), Some(4), Some(4)]);
        assert_eq!(sequences[2], vec![Some(3), Some(4), Some(4)]);
        Ok(())
    }

    #[test]
    fn rejects_sources_without_eligible_keys() {
        let result = PermutedSampler::new(
            shared(make_index(&[("vid1", 2)], 1)),
            sequence(3, 1),
            false,
            StdRng::seed_from_u64(TEST_SEED),
        );
        assert!(result.is_err());
    }
}
