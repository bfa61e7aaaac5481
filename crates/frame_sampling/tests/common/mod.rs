use frame_sampling::{readers::DataSource, readers::FrameListSource, FrameSource, InMemoryFrameIndex};

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const TEST_SEED: u64 = 7;

/// Routes `log` output through `RUST_LOG` for debugging failing tests.
pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

/// Writes a frame listing with `(video, num_frames, label_of_frame)` entries
/// and loads it back through `FrameListSource`.
pub fn index_from_listing(
    videos: &[(&str, usize)],
    num_labels: usize,
    label_of: impl Fn(&str, usize) -> Option<usize>,
) -> Result<Arc<dyn FrameSource>> {
    let mut file = NamedTempFile::new()?;
    for &(video, num_frames) in videos {
        for frame in 1..=num_frames {
            match label_of(video, frame) {
                Some(label) => writeln!(file, "{video}-{frame} {label}")?,
                None => writeln!(file, "{video}-{frame}")?,
            }
        }
    }
    let source = FrameListSource::new(file.path());
    let index = InMemoryFrameIndex::from_records(source.stream()?, num_labels)?;
    Ok(Arc::new(index))
}
