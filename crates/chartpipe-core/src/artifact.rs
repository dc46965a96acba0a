//! Located chart artifacts

use std::path::PathBuf;

/// A chart extracted on local disk, ready to render or show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartArtifactPath {
    /// Directory containing `Chart.yaml`
    pub root: PathBuf,
    pub name: String,
    pub version: String,
    /// Cached archive the chart was extracted from, if any
    pub archive: Option<PathBuf>,
}

impl ChartArtifactPath {
    pub fn new(root: PathBuf, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            root,
            name: name.into(),
            version: version.into(),
            archive: None,
        }
    }

    pub fn with_archive(mut self, archive: PathBuf) -> Self {
        self.archive = Some(archive);
        self
    }
}

/// A rendered or shown payload bound for the output sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub output_name: String,
    pub payload: Vec<u8>,
}
