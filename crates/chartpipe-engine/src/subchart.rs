//! Subchart discovery under `charts/`

use chartpipe_core::{Dependency, LoadedChart, extract_chart_file};
use serde_json::Value as JsonValue;
use tempfile::TempDir;

use crate::error::Result;

/// A subchart found under `charts/`
#[derive(Debug)]
pub struct SubchartInfo {
    /// Alias if the dependency sets one, otherwise the chart name
    pub name: String,

    pub chart: LoadedChart,

    /// Whether the dependency condition/tags enable it
    pub enabled: bool,
}

/// Subcharts of one chart, plus enabled dependencies with no subchart
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub subcharts: Vec<SubchartInfo>,
    pub missing: Vec<String>,

    /// Holds extracted `.tgz` subcharts alive while rendering
    _extracted: Vec<TempDir>,
}

impl DiscoveryResult {
    pub fn enabled(&self) -> impl Iterator<Item = &SubchartInfo> {
        self.subcharts.iter().filter(|s| s.enabled)
    }
}

/// Discover subcharts and evaluate their dependency conditions against `values`
///
/// Archived subcharts are extracted to temporary directories. A chart
/// declared twice under different aliases yields one entry per alias.
pub fn discover_subcharts(parent: &LoadedChart, values: &JsonValue) -> Result<DiscoveryResult> {
    let mut result = DiscoveryResult::default();
    let mut found = Vec::new();

    for entry in parent.subchart_entries()? {
        if entry.is_dir() {
            found.push(LoadedChart::load(&entry)?);
        } else {
            let tmp = tempfile::tempdir()?;
            let root = extract_chart_file(&entry, tmp.path())?;
            found.push(LoadedChart::load(root)?);
            result._extracted.push(tmp);
        }
    }

    let declared = &parent.chart.dependencies;

    for chart in found {
        let deps: Vec<&Dependency> = declared
            .iter()
            .filter(|d| d.name == chart.chart.name)
            .collect();

        match deps.as_slice() {
            [] => result.subcharts.push(SubchartInfo {
                name: chart.chart.name.clone(),
                enabled: true,
                chart,
            }),
            [dep] => result.subcharts.push(SubchartInfo {
                name: dep.effective_name().to_string(),
                enabled: dep.is_enabled(values),
                chart,
            }),
            many => {
                for dep in many {
                    result.subcharts.push(SubchartInfo {
                        name: dep.effective_name().to_string(),
                        enabled: dep.is_enabled(values),
                        chart: chart.clone(),
                    });
                }
            }
        }
    }

    for dep in declared {
        let present = result.subcharts.iter().any(|s| s.chart.chart.name == dep.name);
        if !present && dep.is_enabled(values) {
            result.missing.push(dep.effective_name().to_string());
        }
    }

    result.subcharts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(result)
}
