use super::{filter_boundary_frames, walk_sequence, BatchKeys, SampledKey, Sampler};
use crate::config::SequenceOptions;
use crate::error::SamplerError;
use crate::index::{FrameSource, LabelSlot};
use crate::key::FrameKey;
use anyhow::{anyhow, ensure, Result};
use rand::distr::{weighted::WeightedIndex, Distribution};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Label weights of a [`BalancedSampler`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalancedOptions {
    /// Weight of the background slot (frames without a positive label).
    /// `0.0` means background frames are never drawn.
    pub background_weight: f64,
    /// Weights of labels `1..=num_labels`; `None` means all 1.0.
    pub label_weights: Option<Vec<f64>>,
}

/// Keys of one label slot, consumed in a permuted order that is refreshed
/// independently of every other slot.
#[derive(Debug)]
struct LabelKeys {
    keys: Vec<FrameKey>,
    cursor: usize,
}

/// Class-balanced sampling: draw a label, then a sequence ending in that label.
///
/// # Arguments:
/// - `source`: Frame index with per-frame labels.
/// - `sequence`: Sequence shape. The sampled key is the *last* frame of its
///               sequence; the earlier frames are reached with `-step_size`.
/// - `options`: Label and background weights (see [`BalancedOptions`]).
/// - `rng`: Generator owned by the sampler.
///
/// # Algorithm
/// 1. At construction, every key that can end a full sequence is filed under
///    each of its labels, or under the background slot if it has none. Each
///    slot's list is shuffled.
/// 2. For each requested sequence, a slot is drawn with replacement according
///    to the weights, so a label with 5 frames is drawn as often as one with
///    500 when their weights are equal.
/// 3. The slot's next key is taken. An exhausted slot is reshuffled and
///    rewound on its own; other slots are unaffected.
/// 4. The sequence is walked backwards from the key and returned in time
///    order, the sampled key in the last row.
///
/// Slots without any eligible key get weight 0 and a warning.
///
/// # Example
/// ```ignore
/// let options = BalancedOptions { background_weight: 0.5, label_weights: None };
/// let mut sampler = BalancedSampler::new(source, sequence, options, rng)?;
/// let batch = sampler.sample_keys(32)?;
/// ```
#[derive(Debug)]
pub struct BalancedSampler {
    source: Arc<dyn FrameSource>,
    sequence: SequenceOptions,
    /// `num_labels + 1` slots, background last.
    slots: Vec<LabelKeys>,
    distribution: WeightedIndex<f64>,
    num_samples: usize,
    rng: StdRng,
}

impl BalancedSampler {
    pub fn new(
        source: Arc<dyn FrameSource>,
        sequence: SequenceOptions,
        options: BalancedOptions,
        mut rng: StdRng,
    ) -> Result<Self> {
        sequence.validate()?;
        let num_labels = source.num_labels();

        let weights = Self::slot_weights(num_labels, &options)?;

        // Keyed on the last frame, so keep room for the sequence before it.
        let eligible = if sequence.use_boundary_frames {
            source.video_keys().clone()
        } else {
            filter_boundary_frames(
                source.video_keys(),
                sequence.sequence_length,
                -sequence.step_size,
            )
        };

        let mut slot_keys: Vec<Vec<FrameKey>> = vec![Vec::new(); num_labels + 1];
        let mut num_samples = 0;
        for key in eligible.values().flatten() {
            num_samples += 1;
            let labels = source.labels_of(key);
            if labels.is_empty() {
                // background slot is last
                slot_keys[num_labels].push(key.clone());
            }
            for &label in labels {
                let slot = LabelSlot::Label(label).index(num_labels).ok_or_else(|| {
                    anyhow!("Frame {} has label {} outside 1..={}", key, label, num_labels)
                })?;
                slot_keys[slot].push(key.clone());
            }
        }

        let mut effective = weights;
        for (index, keys) in slot_keys.iter().enumerate() {
            if keys.is_empty() && effective[index] > 0.0 {
                log::warn!(
                    "BalancedSampler: {:?} has no eligible frames and will not be sampled",
                    LabelSlot::from_index(index, num_labels)
                );
                effective[index] = 0.0;
            }
        }
        ensure!(
            effective.iter().any(|&w| w > 0.0),
            SamplerError::config(
                "BalancedSampler has no label with both eligible frames and a positive weight"
            )
        );
        let distribution = WeightedIndex::new(&effective)
            .map_err(|e| anyhow!("Invalid label weights: {}", e))?;

        let slots = slot_keys
            .into_iter()
            .map(|mut keys| {
                keys.shuffle(&mut rng);
                LabelKeys { keys, cursor: 0 }
            })
            .collect();

        Ok(Self {
            source,
            sequence,
            slots,
            distribution,
            num_samples,
            rng,
        })
    }

    /// Weights for `num_labels + 1` slots, background last.
    fn slot_weights(num_labels: usize, options: &BalancedOptions) -> Result<Vec<f64>> {
        let mut weights = match &options.label_weights {
            Some(weights) => {
                ensure!(
                    weights.len() == num_labels,
                    SamplerError::config(format!(
                        "label_weights has {} entries but the source has {} labels",
                        weights.len(),
                        num_labels
                    ))
                );
                weights.clone()
            }
            None => vec![1.0; num_labels],
        };
        weights.push(options.background_weight);

        ensure!(
            weights.iter().all(|&w| w >= 0.0 && w.is_finite()),
            SamplerError::config("All label and background weights must be finite and non-negative")
        );
        Ok(weights)
    }

    fn next_key(&mut self, slot: usize) -> FrameKey {
        let num_labels = self.source.num_labels();
        let label = &mut self.slots[slot];
        if label.cursor >= label.keys.len() {
            log::debug!(
                "BalancedSampler: reshuffling {} frames of {:?}",
                label.keys.len(),
                LabelSlot::from_index(slot, num_labels)
            );
            label.keys.shuffle(&mut self.rng);
            label.cursor = 0;
        }
        let key = label.keys[label.cursor].clone();
        label.cursor += 1;
        key
    }

    /// Number of eligible keys filed under `slot`, `None` for an unknown label.
    pub fn num_keys(&self, slot: LabelSlot) -> Option<usize> {
        slot.index(self.source.num_labels())
            .map(|index| self.slots[index].keys.len())
    }
}

impl Sampler for BalancedSampler {
    fn sample_keys(&mut self, num_sequences: usize) -> Result<BatchKeys> {
        let SequenceOptions {
            sequence_length,
            step_size,
            use_boundary_frames,
        } = self.sequence;

        let mut sequences = Vec::with_capacity(num_sequences);
        for _ in 0..num_sequences {
            let slot = self.distribution.sample(&mut self.rng);
            let last = self.next_key(slot);
            let mut sequence = walk_sequence(
                self.source.as_ref(),
                &last,
                sequence_length,
                -step_size,
                use_boundary_frames,
            )?;
            sequence.reverse();
            sequences.push(sequence.into_iter().map(SampledKey::Frame).collect());
        }
        Ok(BatchKeys::from_sequences(sequence_length, sequences))
    }

    /// Eligible key count. Balanced draws do not visit every key once per
    /// epoch; this only sizes an epoch for the caller.
    fn num_samples(&self) -> usize {
        self.num_samples
    }

    fn num_labels(&self) -> usize {
        self.source.num_labels()
    }
}
