pub mod config;
pub mod error;
pub mod index;
pub mod key;
pub mod readers;
pub mod sampler;

pub use config::{SamplerConfig, SamplerOptions, SequenceOptions};
pub use error::SamplerError;
pub use index::{FrameSource, InMemoryFrameIndex, LabelId, LabelSlot, VideoKeyTable};
pub use key::FrameKey;
pub use sampler::{AnySampler, BatchKeys, SampledKey, Sampler};
