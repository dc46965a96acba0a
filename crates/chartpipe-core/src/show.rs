//! Chart inspection without rendering

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::artifact::ChartArtifactPath;
use crate::chart::LoadedChart;
use crate::error::CoreError;

#[derive(Error, Debug)]
pub enum ShowError {
    #[error("Failed to load chart: {0}")]
    Chart(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown show format '{0}' (expected chart, values, readme or all)")]
    UnknownFormat(String),
}

/// What part of a chart to show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowFormat {
    /// `Chart.yaml` verbatim
    #[default]
    Chart,
    Values,
    Readme,
    /// Chart, values and readme separated by `---`
    All,
}

impl FromStr for ShowFormat {
    type Err = ShowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chart" => Ok(Self::Chart),
            "values" => Ok(Self::Values),
            "readme" => Ok(Self::Readme),
            "all" => Ok(Self::All),
            other => Err(ShowError::UnknownFormat(other.to_string())),
        }
    }
}

/// Returns declared chart content
#[derive(Debug, Clone, Copy, Default)]
pub struct ChartInspector;

impl ChartInspector {
    pub fn new() -> Self {
        Self
    }

    pub fn show(&self, artifact: &ChartArtifactPath, format: ShowFormat) -> Result<String, ShowError> {
        let chart = LoadedChart::load(&artifact.root)?;

        match format {
            ShowFormat::Chart => Ok(chart.raw_chart.clone()),
            ShowFormat::Values => Ok(chart.raw_values()?.unwrap_or_default()),
            ShowFormat::Readme => read_readme(&chart),
            ShowFormat::All => {
                let mut sections = vec![chart.raw_chart.clone()];
                if let Some(values) = chart.raw_values()? {
                    sections.push(values);
                }
                let readme = read_readme(&chart)?;
                if !readme.is_empty() {
                    sections.push(readme);
                }
                Ok(sections
                    .iter()
                    .map(|s| ensure_trailing_newline(s))
                    .collect::<Vec<_>>()
                    .join("---\n"))
            }
        }
    }
}

fn read_readme(chart: &LoadedChart) -> Result<String, ShowError> {
    match chart.readme_path()? {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(String::new()),
    }
}

fn ensure_trailing_newline(s: &str) -> String {
    if s.ends_with('\n') {
        s.to_string()
    } else {
        format!("{}\n", s)
    }
}
