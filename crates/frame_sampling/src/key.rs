//! Frame key addressing.
//!
//! A frame is identified by the string `"<video_id>-<frame_number>"`, where
//! `frame_number` starts at 1 and is dense within a video. The video id may
//! itself contain `-`, so parsing always splits on the *last* separator:
//!
//! ```text
//! "kitchen-cam-2-17"  →  video "kitchen-cam-2", frame 17
//! ```

use crate::error::SamplerError;
use anyhow::{ensure, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '-';

/// Identifier of one video frame.
///
/// The parsed coordinates are cached next to the raw string so that
/// `video()` and `frame_number()` are free on the sampling hot path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameKey {
    key: String,
    split: usize,
    frame: usize,
}

impl FrameKey {
    /// Builds the key for frame `frame_number` (1-based) of `video`.
    pub fn new(video: &str, frame_number: usize) -> Self {
        Self {
            key: format!("{video}{SEPARATOR}{frame_number}"),
            split: video.len(),
            frame: frame_number,
        }
    }

    /// Parses `"<video>-<frame_number>"`.
    ///
    /// # Example
    /// ```ignore
    /// let key = FrameKey::parse("vid1-3")?;
    /// assert_eq!((key.video(), key.frame_number()), ("vid1", 3));
    /// ```
    pub fn parse(key: &str) -> Result<Self> {
        let split = key
            .rfind(SEPARATOR)
            .ok_or_else(|| SamplerError::InvalidKey(key.to_string()))?;
        let (video, frame) = (&key[..split], &key[split + 1..]);
        // Canonical decimal only, so that `new(video, frame)` reproduces the key.
        let canonical = !frame.is_empty()
            && !frame.starts_with('0')
            && frame.bytes().all(|b| b.is_ascii_digit());
        ensure!(
            !video.is_empty() && canonical,
            SamplerError::InvalidKey(key.to_string())
        );
        let frame: usize = frame
            .parse()
            .map_err(|_| SamplerError::InvalidKey(key.to_string()))?;
        Ok(Self {
            key: key.to_string(),
            split,
            frame,
        })
    }

    pub fn video(&self) -> &str {
        &self.key[..self.split]
    }

    /// 1-based position of the frame inside its video.
    pub fn frame_number(&self) -> usize {
        self.frame
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// `(video, frame_number)` coordinate of this key.
    pub fn video_offset(&self) -> (&str, usize) {
        (self.video(), self.frame)
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl FromStr for FrameKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        FrameKey::parse(s)
    }
}

impl Serialize for FrameKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key)
    }
}

impl<'de> Deserialize<'de> for FrameKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FrameKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_parses_keys() -> Result<()> {
        let key = FrameKey::new("vid1", 3);
        assert_eq!(key.as_str(), "vid1-3");
        assert_eq!(FrameKey::parse("vid1-3")?, key);
        assert_eq!(key.video_offset(), ("vid1", 3));
        Ok(())
    }

    #[test]
    fn video_ids_may_contain_separator() -> Result<()> {
        let key = FrameKey::parse("kitchen-cam-2-17")?;
        assert_eq!(key.video(), "kitchen-cam-2");
        assert_eq!(key.frame_number(), 17);
        assert_eq!(FrameKey::new("kitchen-cam-2", 17), key);
        Ok(())
    }

    #[test]
    fn rejects_malformed_keys() {
        for raw in ["novideo", "-3", "vid1-", "vid1-x", "vid1-0", "vid1-03", "vid1-+3"] {
            let err = FrameKey::parse(raw).unwrap_err();
            assert_eq!(
                err.downcast_ref::<SamplerError>(),
                Some(&SamplerError::InvalidKey(raw.to_string())),
                "{raw}"
            );
        }
    }

    #[test]
    fn serializes_as_plain_string() -> Result<()> {
        let key = FrameKey::new("a-b", 12);
        let json = serde_json::to_string(&key)?;
        assert_eq!(json, "\"a-b-12\"");
        assert_eq!(serde_json::from_str::<FrameKey>(&json)?, key);
        Ok(())
    }
}
