use super::{walk_sequence, BatchKeys, SampledKey, Sampler};
use crate::config::SequenceOptions;
use crate::error::SamplerError;
use crate::index::FrameSource;
use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Sliding-window traversal of one video at a time.
///
/// A window of `sequence_length` frames (spaced by `step_size`) slides over
/// the current video by `stride` frames per sequence. When the next window no
/// longer fits, the sampler moves to the next video of a permuted order;
/// after the last video the order is reshuffled and traversal wraps around.
///
/// ```text
/// video of 7 frames, sequence_length = 3, stride = 2
///   [1 2 3] [3 4 5] [5 6 7] → next video
/// ```
///
/// # Arguments:
/// - `stride`: Frames between consecutive window starts. Defaults to
///             `sequence_length` (non-overlapping windows).
///
/// Reaching a video that cannot hold a single window is a configuration
/// error. With `use_boundary_frames`, any frame of the video may start a
/// window and the tail is padded with the last frame.
#[derive(Debug)]
pub struct SequentialBatchSampler {
    source: Arc<dyn FrameSource>,
    sequence: SequenceOptions,
    stride: usize,
    videos: Vec<String>,
    order: Vec<usize>,
    video_cursor: usize,
    frame_index: i64,
    rng: StdRng,
}

impl SequentialBatchSampler {
    pub fn new(
        source: Arc<dyn FrameSource>,
        sequence: SequenceOptions,
        stride: Option<usize>,
        mut rng: StdRng,
    ) -> Result<Self> {
        sequence.validate()?;
        sequence.require_forward("SequentialBatchSampler")?;
        let stride = stride.unwrap_or(sequence.sequence_length);
        ensure!(stride >= 1, SamplerError::config("stride must be >= 1"));

        let videos: Vec<String> = source.video_keys().keys().cloned().collect();
        ensure!(
            !videos.is_empty(),
            SamplerError::config("SequentialBatchSampler needs at least one video")
        );
        let mut order: Vec<usize> = (0..videos.len()).collect();
        order.shuffle(&mut rng);

        Ok(Self {
            source,
            sequence,
            stride,
            videos,
            order,
            video_cursor: 0,
            frame_index: 1,
            rng,
        })
    }

    fn current_video(&self) -> &str {
        &self.videos[self.order[self.video_cursor]]
    }

    /// Whether a full window fits from `frame_index` in the current video.
    fn is_valid_start(&self) -> bool {
        let num_frames = self.source.video_len(self.current_video()) as i64;
        let last = if self.sequence.use_boundary_frames {
            self.frame_index
        } else {
            self.frame_index + self.sequence.span() as i64
        };
        last <= num_frames
    }

    fn advance_video(&mut self) {
        self.video_cursor += 1;
        if self.video_cursor >= self.order.len() {
            log::info!(
                "SequentialBatchSampler finished all {} videos, reshuffling video order",
                self.order.len()
            );
            self.order.shuffle(&mut self.rng);
            self.video_cursor = 0;
        }
        self.frame_index = 1;
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

impl Sampler for SequentialBatchSampler {
    fn sample_keys(&mut self, num_sequences: usize) -> Result<BatchKeys> {
        let SequenceOptions {
            sequence_length,
            step_size,
            use_boundary_frames,
        } = self.sequence;

        let mut sequences = Vec::with_capacity(num_sequences);
        for _ in 0..num_sequences {
            if !self.is_valid_start() {
                if self.frame_index > 1 {
                    self.advance_video();
                }
                ensure!(
                    self.is_valid_start(),
                    SamplerError::config(format!(
                        "Video '{}' has {} frames, too short for a sequence spanning {} frames",
                        self.current_video(),
                        self.source.video_len(self.current_video()),
                        self.sequence.span() + 1
                    ))
                );
            }

            let start = self
                .source
                .key_at(self.current_video(), self.frame_index)
                .cloned()
                .ok_or_else(|| SamplerError::MissingFrame {
                    video: self.current_video().to_string(),
                    frame: self.frame_index,
                    num_frames: self.source.video_len(self.current_video()),
                })?;
            let sequence = walk_sequence(
                self.source.as_ref(),
                &start,
                sequence_length,
                step_size,
                use_boundary_frames,
            )?;
            sequences.push(sequence.into_iter().map(SampledKey::Frame).collect());
            self.frame_index += self.stride as i64;
        }
        Ok(BatchKeys::from_sequences(sequence_length, sequences))
    }

    /// Window starts in one pass over all videos that can hold a window.
    fn num_samples(&self) -> usize {
        let needed = if self.sequence.use_boundary_frames {
            1
        } else {
            self.sequence.span() + 1
        };
        self.source
            .video_keys()
            .values()
            .map(Vec::len)
            .filter(|&len| len >= needed)
            .map(|len| (len - needed) / self.stride + 1)
            .sum()
    }

    fn num_labels(&self) -> usize {
        self.source.num_labels()
    }
}
