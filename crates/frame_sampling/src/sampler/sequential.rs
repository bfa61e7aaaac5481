use super::{BatchKeys, SampledKey, Sampler};
use crate::config::SequenceOptions;
use crate::error::SamplerError;
use crate::index::FrameSource;
use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Position of one lane: the video it walks and the next frame to emit.
/// `video = None` means the lane needs a new video before its next step.
#[derive(Debug, Clone, Default)]
struct Lane {
    video: Option<usize>,
    next_frame: i64,
}

/// Lock-step traversal of whole videos with a fixed number of lanes.
///
/// Each of the `batch_size` lanes walks one video forward, `step_size` frames
/// per time step, continuing across calls. When a lane runs past the end of
/// its video, the rest of that lane's sequence is `EndOfSequence` and the lane
/// picks up the next video (from a permuted video order) on the following call.
///
/// ```text
/// batch_size = 2, sequence_length = 3, a = 4 frames, b = 2 frames
///
///           call 1      call 2      call 3
/// lane 0:   a1 a2 a3  | a4 END END | <next video>
/// lane 1:   b1 b2 END | <next video>
/// ```
///
/// # Arguments:
/// - `batch_size`: Number of lanes; every `sample_keys(n)` must use `n == batch_size`.
/// - `sample_once`: If `true`, no video is started twice: once every video has
///                  been handed to a lane, idle lanes emit `EndOfSequence` forever.
///                  Used for evaluation.
///                  If `false`, the video order is reshuffled and traversal restarts.
///
/// `use_boundary_frames` has no effect: lanes never start mid-video.
#[derive(Debug)]
pub struct SequentialSampler {
    source: Arc<dyn FrameSource>,
    sequence: SequenceOptions,
    batch_size: usize,
    sample_once: bool,
    videos: Vec<String>,
    order: Vec<usize>,
    video_cursor: usize,
    lanes: Vec<Lane>,
    rng: StdRng,
}

impl SequentialSampler {
    pub fn new(
        source: Arc<dyn FrameSource>,
        sequence: SequenceOptions,
        batch_size: usize,
        sample_once: bool,
        mut rng: StdRng,
    ) -> Result<Self> {
        sequence.validate()?;
        sequence.require_forward("SequentialSampler")?;
        ensure!(
            batch_size >= 1,
            SamplerError::config("SequentialSampler requires batch_size >= 1")
        );

        let videos: Vec<String> = source
            .video_keys()
            .iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(video, _)| video.clone())
            .collect();
        ensure!(
            !videos.is_empty(),
            SamplerError::config("SequentialSampler needs at least one video")
        );

        let mut order: Vec<usize> = (0..videos.len()).collect();
        order.shuffle(&mut rng);

        Ok(Self {
            source,
            sequence,
            batch_size,
            sample_once,
            videos,
            order,
            video_cursor: 0,
            lanes: vec![Lane::default(); batch_size],
            rng,
        })
    }

    /// Next video to hand to a lane, or `None` once all videos have been
    /// started under `sample_once`.
    fn next_video(&mut self) -> Option<usize> {
        if self.video_cursor >= self.order.len() {
            if self.sample_once {
                return None;
            }
            log::info!(
                "SequentialSampler started all {} videos, reshuffling video order",
                self.order.len()
            );
            self.order.shuffle(&mut self.rng);
            self.video_cursor = 0;
        }
        let video = self.order[self.video_cursor];
        self.video_cursor += 1;
        Some(video)
    }

    /// True once `sample_once` traversal is complete: every video has been
    /// started and every lane has run off its last video.
    pub fn is_exhausted(&self) -> bool {
        self.sample_once
            && self.video_cursor >= self.order.len()
            && self.lanes.iter().all(|lane| lane.video.is_none())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Sampler for SequentialSampler {
    fn sample_keys(&mut self, num_sequences: usize) -> Result<BatchKeys> {
        ensure!(
            num_sequences == self.batch_size,
            SamplerError::BatchSizeMismatch {
                expected: self.batch_size,
                got: num_sequences,
            }
        );
        let SequenceOptions {
            sequence_length,
            step_size,
            ..
        } = self.sequence;

        let mut sequences = Vec::with_capacity(self.batch_size);
        for lane_index in 0..self.batch_size {
            if self.lanes[lane_index].video.is_none() {
                let video = self.next_video();
                self.lanes[lane_index] = Lane {
                    video,
                    next_frame: 1,
                };
            }

            let lane = &mut self.lanes[lane_index];
            let mut sequence = Vec::with_capacity(sequence_length);
            let mut ended = false;
            for _ in 0..sequence_length {
                let key = match lane.video {
                    Some(video) if !ended => {
                        self.source.key_at(&self.videos[video], lane.next_frame)
                    }
                    _ => None,
                };
                match key {
                    Some(key) => {
                        sequence.push(SampledKey::Frame(key.clone()));
                        lane.next_frame += step_size;
                    }
                    None => {
                        ended = true;
                        sequence.push(SampledKey::EndOfSequence);
                    }
                }
            }
            if ended {
                lane.video = None;
            }
            sequences.push(sequence);
        }
        Ok(BatchKeys::from_sequences(sequence_length, sequences))
    }

    /// Total frame count of the source; a progress denominator only, lanes
    /// do not consume exactly this many sequences per pass.
    fn num_samples(&self) -> usize {
        self.source.num_frames()
    }

    fn num_labels(&self) -> usize {
        self.source.num_labels()
    }
}
