pub mod frame_list;

pub use frame_list::{FrameListSource, FrameRecord};

use anyhow::Result;

/// A source that streams raw items of type `T`, one `Result` per item.
pub trait DataSource<T>: Send + Sync {
    fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<T>> + Send>>;
}
