use crate::index::LabelId;
use crate::key::FrameKey;
use crate::readers::DataSource;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

/// One line of a frame listing: a frame key and its positive labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub key: FrameKey,
    pub labels: Vec<LabelId>,
}

impl FrameRecord {
    /// Parses `<frame_key> [label,label,...]`. A missing label column means
    /// the frame is background.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut columns = line.split_whitespace();
        let key = columns.next().context("Missing frame key")?;
        let key = FrameKey::parse(key)?;

        let labels = match columns.next() {
            None => Vec::new(),
            Some(column) => column
                .split(',')
                .filter(|label| !label.is_empty())
                .map(|label| {
                    label
                        .parse::<LabelId>()
                        .with_context(|| format!("Invalid label '{}' for frame {}", label, key))
                })
                .collect::<Result<_>>()?,
        };
        if let Some(extra) = columns.next() {
            anyhow::bail!("Unexpected column '{}' after labels of frame {}", extra, key);
        }
        Ok(Self { key, labels })
    }
}

/// Reads a frame listing file line by line. Skips blank lines and `#` comments.
///
/// # Example
/// ```ignore
/// // frames.txt
/// // vid1-1
/// // vid1-2 3
/// // vid1-3 3,7
/// let source = FrameListSource::new("frames.txt");
/// let index = InMemoryFrameIndex::from_records(source.stream()?, 157)?;
/// ```
pub struct FrameListSource {
    path: PathBuf,
}

impl FrameListSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DataSource<FrameRecord> for FrameListSource {
    fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<FrameRecord>> + Send>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open frame listing: {}", self.path.display()))?;

        let reader = BufReader::new(file);
        let iter = reader
            .lines()
            .enumerate()
            .filter_map(move |(line_num, line)| match line {
                Ok(text) if text.trim().is_empty() || text.trim_start().starts_with('#') => None,
                Ok(text) => Some(
                    FrameRecord::parse_line(&text)
                        .with_context(|| format!("Error parsing line {}", line_num + 1)),
                ),
                Err(e) => {
                    Some(Err(e).with_context(|| format!("Error reading line {}", line_num + 1)))
                }
            });
        Ok(Box::new(iter))
    }
}
