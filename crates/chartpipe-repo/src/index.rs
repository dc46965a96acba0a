//! Classic repository index (`index.yaml`) and version selection

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{LocateError, RepoError, Result};

/// Maximum edit distance for "did you mean" suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Repository index, as served at `<repo>/index.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIndex {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Chart versions by chart name
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<String>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

/// One chart version listed in the index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Archive locations, absolute or relative to the repository URL
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 of the archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl ChartVersion {
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

impl ChartIndex {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::InvalidIndex {
            message: e.to_string(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::InvalidIndex {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    pub fn versions(&self, chart: &str) -> Option<&[ChartVersion]> {
        self.entries.get(chart).map(Vec::as_slice)
    }

    /// Closest chart name, for "did you mean" hints
    pub fn suggest(&self, chart: &str) -> Option<&str> {
        self.entries
            .keys()
            .map(|name| (name, strsim::levenshtein(chart, name)))
            .filter(|(_, distance)| *distance <= MAX_SUGGESTION_DISTANCE)
            .min_by_key(|(_, distance)| *distance)
            .map(|(name, _)| name.as_str())
    }

    /// Pick the version of `chart` to use
    ///
    /// `source_name` only labels errors.
    pub fn select(
        &self,
        chart: &str,
        pin: Option<&str>,
        source_name: &str,
    ) -> std::result::Result<&ChartVersion, LocateError> {
        let versions = self
            .versions(chart)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LocateError::ChartNotFound {
                chart: chart.to_string(),
                source_name: source_name.to_string(),
                suggestion: self.suggest(chart).map(String::from),
            })?;

        let chosen = select_version(versions.iter().map(|v| v.version.as_str()), pin)
            .ok_or_else(|| LocateError::VersionNotFound {
                chart: chart.to_string(),
                constraint: pin.unwrap_or("*").to_string(),
                available: versions
                    .iter()
                    .map(|v| v.version.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        versions
            .iter()
            .find(|v| v.version == chosen)
            .ok_or_else(|| LocateError::VersionNotFound {
                chart: chart.to_string(),
                constraint: chosen.to_string(),
                available: String::new(),
            })
    }
}

/// Parse a version, tolerating a leading `v`
pub fn parse_version(raw: &str) -> Option<Version> {
    Version::parse(raw.trim().trim_start_matches('v')).ok()
}

/// Order two version strings
///
/// Semantic version precedence first (build metadata ignored), then the
/// raw strings lexically. Unparseable versions sort below parseable ones.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let precedence = match (parse_version(a), parse_version(b)) {
        (Some(va), Some(vb)) => (va.major, va.minor, va.patch, &va.pre)
            .cmp(&(vb.major, vb.minor, vb.patch, &vb.pre)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    };
    precedence.then_with(|| a.cmp(b))
}

/// Choose among candidate versions
///
/// Without a pin the highest version wins. A pin matching a candidate
/// exactly selects it; otherwise it is read as a semver requirement and the
/// highest match wins.
pub fn select_version<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
    pin: Option<&str>,
) -> Option<&'a str> {
    let candidates: Vec<&'a str> = candidates.into_iter().collect();

    let Some(pin) = pin.map(str::trim).filter(|p| !p.is_empty()) else {
        return candidates
            .into_iter()
            .max_by(|a, b| compare_versions(a, b));
    };

    if let Some(exact) = candidates.iter().find(|c| **c == pin) {
        return Some(*exact);
    }

    let req = VersionReq::parse(pin.trim_start_matches('v')).ok()?;
    candidates
        .into_iter()
        .filter(|c| parse_version(c).is_some_and(|v| req.matches(&v)))
        .max_by(|a, b| compare_versions(a, b))
}
