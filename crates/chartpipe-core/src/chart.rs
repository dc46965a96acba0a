//! Chart definition and loading

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::values::Values;

/// Chart metadata file name
pub const CHART_FILE: &str = "Chart.yaml";

/// Default values file name
pub const VALUES_FILE: &str = "values.yaml";

/// Subchart directory name
pub const CHARTS_DIR: &str = "charts";

/// Contents of `Chart.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    /// Chart API version (v1 or v2)
    pub api_version: String,

    pub name: String,

    /// Chart version (SemVer)
    #[serde(with = "version_serde")]
    pub version: Version,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub app_version: Option<String>,

    /// Platform version constraint, e.g. `>=1.21.0-0`
    #[serde(default)]
    pub kube_version: Option<String>,

    #[serde(default, rename = "type")]
    pub kind: ChartKind,

    #[serde(default)]
    pub home: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub maintainers: Vec<Maintainer>,

    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Chart {
    /// Parse and validate `Chart.yaml` content
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let chart: Chart = serde_yaml::from_str(yaml)?;
        chart.validate()?;
        Ok(chart)
    }

    fn validate(&self) -> Result<()> {
        if !matches!(self.api_version.as_str(), "v1" | "v2") {
            return Err(CoreError::InvalidChart {
                message: format!(
                    "Unsupported apiVersion '{}' in {} (expected v1 or v2)",
                    self.api_version, CHART_FILE
                ),
            });
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidChart {
                message: format!("{} is missing a name", CHART_FILE),
            });
        }
        Ok(())
    }

    pub fn is_library(&self) -> bool {
        self.kind == ChartKind::Library
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Application,
    Library,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Chart dependency declared in `Chart.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub name: String,

    /// Version constraint as written in the chart
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub repository: Option<String>,

    /// Comma-separated list of value paths; the first one that resolves decides
    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub alias: Option<String>,
}

impl Dependency {
    /// Alias if set, otherwise the chart name
    #[inline]
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether this dependency is enabled for the given values
    ///
    /// A resolvable `condition` path wins. Otherwise tags under `tags.*`
    /// enable the dependency if any of them is true. With neither, the
    /// dependency is enabled.
    pub fn is_enabled(&self, values: &JsonValue) -> bool {
        if let Some(condition) = &self.condition {
            for path in condition.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                if let Some(value) = lookup_path(values, path) {
                    return is_truthy(value);
                }
            }
        }

        let tag_values: Vec<bool> = self
            .tags
            .iter()
            .filter_map(|tag| values.get("tags").and_then(|t| t.get(tag)))
            .map(is_truthy)
            .collect();

        tag_values.is_empty() || tag_values.into_iter().any(|enabled| enabled)
    }
}

fn lookup_path<'a>(values: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(values, |current, key| current.get(key))
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Null => false,
        JsonValue::String(s) => !s.is_empty() && s != "false" && s != "0",
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

/// A chart loaded from an extracted directory
#[derive(Debug, Clone)]
pub struct LoadedChart {
    pub chart: Chart,

    /// Root directory of the chart
    pub root: PathBuf,

    pub templates_dir: PathBuf,

    pub values_path: PathBuf,

    /// `Chart.yaml` exactly as found on disk
    pub raw_chart: String,
}

impl LoadedChart {
    /// Load a chart from a directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        if !root.is_dir() {
            return Err(CoreError::ChartNotFound {
                path: root.display().to_string(),
            });
        }

        let chart_file = root.join(CHART_FILE);
        if !chart_file.exists() {
            return Err(CoreError::InvalidChart {
                message: format!("{} not found in {}", CHART_FILE, root.display()),
            });
        }

        let raw_chart = std::fs::read_to_string(&chart_file)?;
        let chart = Chart::from_yaml(&raw_chart)?;

        Ok(Self {
            chart,
            templates_dir: root.join("templates"),
            values_path: root.join(VALUES_FILE),
            root,
            raw_chart,
        })
    }

    /// Default values from `values.yaml`, empty if the file is absent
    pub fn default_values(&self) -> Result<Values> {
        if self.values_path.exists() {
            Values::from_file(&self.values_path)
        } else {
            Ok(Values::new())
        }
    }

    /// Raw `values.yaml` content
    pub fn raw_values(&self) -> Result<Option<String>> {
        if self.values_path.exists() {
            Ok(Some(std::fs::read_to_string(&self.values_path)?))
        } else {
            Ok(None)
        }
    }

    /// README file, matched case-insensitively
    pub fn readme_path(&self) -> Result<Option<PathBuf>> {
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .map(|n| n.to_string_lossy().to_lowercase().starts_with("readme"))
                        .unwrap_or(false)
            })
            .collect();
        candidates.sort();
        Ok(candidates.into_iter().next())
    }

    /// Template files in sorted order
    pub fn template_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if !self.templates_dir.exists() {
            return Ok(files);
        }

        for entry in walkdir::WalkDir::new(&self.templates_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(ext) = path.extension() {
                let ext = ext.to_string_lossy().to_lowercase();
                if matches!(
                    ext.as_str(),
                    "yaml" | "yml" | "tpl" | "j2" | "jinja2" | "txt" | "json"
                ) {
                    files.push(path.to_path_buf());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Entries under `charts/`: extracted directories and `.tgz` archives, sorted
    pub fn subchart_entries(&self) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(CHARTS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                (p.is_dir() && p.join(CHART_FILE).exists())
                    || p.extension().map(|e| e == "tgz").unwrap_or(false)
            })
            .collect();
        entries.sort();
        Ok(entries)
    }
}

/// Serde adapter for `semver::Version`, tolerating a leading `v`
mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(s.trim_start_matches('v')).map_err(serde::de::Error::custom)
    }
}
