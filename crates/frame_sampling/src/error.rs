use thiserror::Error;

/// Fatal conditions raised by the sampling layer.
///
/// Every fallible function in this crate returns `anyhow::Result`; the
/// variants below are what sits inside the `anyhow::Error` so callers can
/// classify a failure with `err.downcast_ref::<SamplerError>()`.
///
/// None of these are meant to be retried. A `MissingFrame` or
/// `BatchSizeMismatch` means the data and the configuration disagree, and
/// continuing would silently corrupt the order or composition of training data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    /// Invalid, missing or conflicting construction option.
    #[error("Invalid sampler configuration: {0}")]
    Config(String),

    /// A frame that must exist inside a video is absent while boundary
    /// replication is disabled.
    #[error("Frame {frame} of video '{video}' is missing (video has {num_frames} frames)")]
    MissingFrame {
        video: String,
        frame: i64,
        num_frames: usize,
    },

    /// `sample_keys(n)` called with a width other than the configured lanes.
    #[error("sample_keys called with n={got}, but the sampler has batch_size={expected}")]
    BatchSizeMismatch { expected: usize, got: usize },

    /// A key that does not follow `<video>-<frame_number>` or is not in the index.
    #[error("Invalid frame key '{0}'")]
    InvalidKey(String),
}

impl SamplerError {
    pub fn config(message: impl Into<String>) -> Self {
        SamplerError::Config(message.into())
    }
}
