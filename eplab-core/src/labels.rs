use crate::error::{EplabError, Result};
use std::fs;
use std::path::Path;

/// Class labels in model output order.
///
/// Label files hold one `<index>,<label>` line per class. Only the text
/// after the first comma is kept, so labels may contain commas themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Self {
        LabelSet { labels }
    }

    pub fn load(path: &Path) -> Result<LabelSet> {
        let text = fs::read_to_string(path).map_err(|source| EplabError::LabelFile {
            path: path.to_path_buf(),
            source,
        })?;

        let mut labels = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match line.split_once(',') {
                Some((_, label)) => labels.push(label.to_string()),
                None => {
                    return Err(EplabError::MalformedLabel {
                        path: path.to_path_buf(),
                        line: idx + 1,
                    });
                }
            }
        }

        Ok(LabelSet { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}
