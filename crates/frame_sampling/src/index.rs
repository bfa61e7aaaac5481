//! Video frame index: the read-only view of the frame store that samplers
//! consume.
//!
//! A `FrameSource` exposes, for every video, the ordered list of its frame
//! keys, plus the set of action labels attached to each frame. Samplers hold
//! the source behind an `Arc` and never mutate it.
//!
//! # Label ids
//! Real labels are `1..=num_labels`. A frame with no positive label is a
//! *background* frame; samplers that need it address it as
//! [`LabelSlot::Background`] (slot `num_labels + 1`), it never appears in a
//! `KeyLabelMap`.

use crate::error::SamplerError;
use crate::key::FrameKey;
use crate::readers::FrameRecord;
use anyhow::{ensure, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

/// 1-based action label id.
pub type LabelId = usize;

/// `video_id -> [FrameKey]`, where `keys[i]` is frame `i + 1`.
///
/// Videos iterate in sorted id order, which keeps every sampler construction
/// deterministic for a given seed.
pub type VideoKeyTable = BTreeMap<String, Vec<FrameKey>>;

/// `FrameKey -> labels`. Frames without labels may be absent.
pub type KeyLabelMap = HashMap<FrameKey, Vec<LabelId>>;

/// Addresses one slot of a per-label table sized `num_labels + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelSlot {
    Label(LabelId),
    Background,
}

impl LabelSlot {
    /// Position in a table of `num_labels + 1` slots; background is last.
    /// `None` for a label outside `1..=num_labels`.
    pub fn index(self, num_labels: usize) -> Option<usize> {
        match self {
            LabelSlot::Label(id) if (1..=num_labels).contains(&id) => Some(id - 1),
            LabelSlot::Label(_) => None,
            LabelSlot::Background => Some(num_labels),
        }
    }

    pub fn from_index(index: usize, num_labels: usize) -> Self {
        if index == num_labels {
            LabelSlot::Background
        } else {
            LabelSlot::Label(index + 1)
        }
    }
}

/// Read-only access to the frames of a video dataset.
///
/// Implementations must be `Send + Sync` so a source can be shared between
/// the sampler and the loader that resolves keys to images.
pub trait FrameSource: Debug + Send + Sync {
    /// Ordered frame keys of every video.
    fn video_keys(&self) -> &VideoKeyTable;

    /// Labels of every labelled frame.
    fn key_label_map(&self) -> &KeyLabelMap;

    /// Number of real labels (background excluded).
    fn num_labels(&self) -> usize;

    /// `(video, frame_number)` coordinate of `key`, checked against the index.
    fn frame_video_offset<'k>(&self, key: &'k FrameKey) -> Result<(&'k str, usize)> {
        let (video, frame) = key.video_offset();
        let known = self
            .video_keys()
            .get(video)
            .map(|keys| frame <= keys.len())
            .unwrap_or(false);
        ensure!(known, SamplerError::InvalidKey(key.to_string()));
        Ok((video, frame))
    }

    /// Labels of `key`; empty for background frames.
    fn labels_of(&self, key: &FrameKey) -> &[LabelId] {
        self.key_label_map()
            .get(key)
            .map(|labels| labels.as_slice())
            .unwrap_or(&[])
    }

    /// Key of frame `frame` (1-based, may be out of range) in `video`.
    fn key_at(&self, video: &str, frame: i64) -> Option<&FrameKey> {
        if frame < 1 {
            return None;
        }
        self.video_keys()
            .get(video)
            .and_then(|keys| keys.get(frame as usize - 1))
    }

    /// Number of frames in `video`, zero if unknown.
    fn video_len(&self, video: &str) -> usize {
        self.video_keys().get(video).map(Vec::len).unwrap_or(0)
    }

    /// Total number of frames across all videos.
    fn num_frames(&self) -> usize {
        self.video_keys().values().map(Vec::len).sum()
    }
}

/// A `FrameSource` that keeps the whole index in memory.
///
/// # Example
/// ```ignore
/// let index = InMemoryFrameIndex::new(2)
///     .with_video("vid1", 5)
///     .with_labels(FrameKey::new("vid1", 3), vec![1, 2])?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryFrameIndex {
    videos: VideoKeyTable,
    labels: KeyLabelMap,
    num_labels: usize,
}

impl InMemoryFrameIndex {
    pub fn new(num_labels: usize) -> Self {
        Self {
            videos: VideoKeyTable::new(),
            labels: KeyLabelMap::new(),
            num_labels,
        }
    }

    /// Adds (or replaces) a video with frames `1..=num_frames`.
    pub fn with_video(mut self, video: &str, num_frames: usize) -> Self {
        let keys = (1..=num_frames).map(|f| FrameKey::new(video, f)).collect();
        self.videos.insert(video.to_string(), keys);
        self
    }

    /// Attaches `labels` to `key`. Every label must be in `1..=num_labels`.
    pub fn with_labels(mut self, key: FrameKey, labels: Vec<LabelId>) -> Result<Self> {
        self.insert_labels(key, labels)?;
        Ok(self)
    }

    fn insert_labels(&mut self, key: FrameKey, mut labels: Vec<LabelId>) -> Result<()> {
        for &label in &labels {
            ensure!(
                (1..=self.num_labels).contains(&label),
                "Label {} of frame {} is outside 1..={}",
                label,
                key,
                self.num_labels
            );
        }
        labels.sort_unstable();
        labels.dedup();
        if labels.is_empty() {
            self.labels.remove(&key);
        } else {
            self.labels.insert(key, labels);
        }
        Ok(())
    }

    /// Builds an index from a stream of per-frame records, e.g. from a
    /// [`FrameListSource`](crate::readers::FrameListSource).
    ///
    /// Frame numbers must be dense per video: a video whose highest frame is
    /// `N` must list every frame `1..=N` exactly once.
    pub fn from_records<I>(records: I, num_labels: usize) -> Result<Self>
    where
        I: IntoIterator<Item = Result<FrameRecord>>,
    {
        let mut index = Self::new(num_labels);
        let mut frames: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for record in records {
            let FrameRecord { key, labels } = record?;
            frames
                .entry(key.video().to_string())
                .or_default()
                .push(key.frame_number());
            index.insert_labels(key, labels)?;
        }

        for (video, mut numbers) in frames {
            numbers.sort_unstable();
            for (expected, &number) in (1..).zip(&numbers) {
                ensure!(
                    number == expected,
                    "Video '{}' frames are not dense: expected frame {} but found {}",
                    video,
                    expected,
                    number
                );
            }
            let num_frames = numbers.len();
            index = index.with_video(&video, num_frames);
        }
        Ok(index)
    }
}

impl FrameSource for InMemoryFrameIndex {
    fn video_keys(&self) -> &VideoKeyTable {
        &self.videos
    }

    fn key_label_map(&self) -> &KeyLabelMap {
        &self.labels
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, labels: Vec<LabelId>) -> Result<FrameRecord> {
        Ok(FrameRecord {
            key: FrameKey::parse(key)?,
            labels,
        })
    }

    #[test]
    fn offset_round_trip_recovers_every_key() -> Result<()> {
        let index = InMemoryFrameIndex::new(1)
            .with_video("vid1", 5)
            .with_video("a-b", 3);

        for keys in index.video_keys().values() {
            for key in keys {
                let (video, frame) = index.frame_video_offset(key)?;
                assert_eq!(index.key_at(video, frame as i64), Some(key));
            }
        }
        assert_eq!(index.num_frames(), 8);
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let index = InMemoryFrameIndex::new(1).with_video("vid1", 2);
        assert!(index.frame_video_offset(&FrameKey::new("vid1", 3)).is_err());
        assert!(index.frame_video_offset(&FrameKey::new("vid2", 1)).is_err());
        assert!(index.key_at("vid1", 0).is_none());
        assert!(index.key_at("vid1", -1).is_none());
    }

    #[test]
    fn labels_are_validated_and_normalised() -> Result<()> {
        let index = InMemoryFrameIndex::new(3)
            .with_video("vid1", 2)
            .with_labels(FrameKey::new("vid1", 1), vec![3, 1, 3])?;
        assert_eq!(index.labels_of(&FrameKey::new("vid1", 1)), &[1, 3]);
        assert!(index.labels_of(&FrameKey::new("vid1", 2)).is_empty());

        assert!(InMemoryFrameIndex::new(3)
            .with_labels(FrameKey::new("vid1", 1), vec![4])
            .is_err());
        assert!(InMemoryFrameIndex::new(3)
            .with_labels(FrameKey::new("vid1", 1), vec![0])
            .is_err());
        Ok(())
    }

    #[test]
    fn builds_from_records() -> Result<()> {
        let records = vec![
            record("vid1-2", vec![1]),
            record("vid1-1", vec![]),
            record("vid2-1", vec![2]),
        ];
        let index = InMemoryFrameIndex::from_records(records, 2)?;
        assert_eq!(index.video_len("vid1"), 2);
        assert_eq!(index.video_len("vid2"), 1);
        assert_eq!(index.labels_of(&FrameKey::new("vid1", 2)), &[1]);
        Ok(())
    }

    #[test]
    fn rejects_sparse_frames() {
        let records = vec![record("vid1-1", vec![]), record("vid1-3", vec![])];
        assert!(InMemoryFrameIndex::from_records(records, 1).is_err());

        let duplicated = vec![record("vid1-1", vec![]), record("vid1-1", vec![])];
        assert!(InMemoryFrameIndex::from_records(duplicated, 1).is_err());
    }

    #[test]
    fn background_slot_is_last() {
        assert_eq!(LabelSlot::Label(1).index(4), Some(0));
        assert_eq!(LabelSlot::Background.index(4), Some(4));
        assert_eq!(LabelSlot::from_index(4, 4), LabelSlot::Background);
        assert_eq!(LabelSlot::from_index(2, 4), LabelSlot::Label(3));
    }

    #[test]
    fn out_of_range_labels_have_no_slot() {
        assert_eq!(LabelSlot::Label(0).index(4), None);
        assert_eq!(LabelSlot::Label(5).index(4), None);
        assert_eq!(LabelSlot::Label(4).index(4), Some(3));
    }
}
