//! Template rendering context

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::chart::Chart;
use crate::error::{CoreError, Result};
use crate::release::ReleaseInfo;
use crate::values::Values;

/// Context available to all templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateContext {
    /// Merged values
    pub values: JsonValue,

    pub release: ReleaseInfo,

    pub chart: ChartInfo,

    pub capabilities: Capabilities,

    /// Current template info
    pub template: TemplateInfo,
}

/// Chart information for templates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInfo {
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
    pub description: Option<String>,
}

impl From<&Chart> for ChartInfo {
    fn from(chart: &Chart) -> Self {
        Self {
            name: chart.name.clone(),
            version: chart.version.to_string(),
            app_version: chart.app_version.clone(),
            description: chart.description.clone(),
        }
    }
}

/// Target platform capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub kube_version: PlatformVersion,

    /// Available API versions
    pub api_versions: Vec<String>,
}

impl Capabilities {
    pub fn for_platform(platform: &PlatformVersion) -> Self {
        Self {
            kube_version: platform.clone(),
            api_versions: Vec::new(),
        }
    }
}

/// Target platform version, e.g. `v1.23.10` / `1` / `23`
///
/// All three parts are supplied by the caller and must agree textually.
/// The minor part may carry a provider `+` suffix (`23+`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPlatformVersion")]
pub struct PlatformVersion {
    pub version: String,
    pub major: String,
    pub minor: String,
}

#[derive(Deserialize)]
struct RawPlatformVersion {
    version: String,
    major: String,
    minor: String,
}

impl TryFrom<RawPlatformVersion> for PlatformVersion {
    type Error = CoreError;

    fn try_from(raw: RawPlatformVersion) -> Result<Self> {
        PlatformVersion::new(&raw.version, &raw.major, &raw.minor)
    }
}

impl PlatformVersion {
    pub fn new(version: &str, major: &str, minor: &str) -> Result<Self> {
        let invalid = |message: String| CoreError::InvalidPlatformVersion { message };

        let bare = version.trim_start_matches('v');
        let mut parts = bare.split('.');
        let (Some(v_major), Some(v_minor)) = (parts.next(), parts.next()) else {
            return Err(invalid(format!(
                "'{}' is not of the form vMAJOR.MINOR[.PATCH]",
                version
            )));
        };

        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid(format!("major '{}' is not numeric", major)));
        }

        let minor_digits = minor.strip_suffix('+').unwrap_or(minor);
        if minor_digits.is_empty() || !minor_digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid(format!("minor '{}' is not numeric", minor)));
        }

        if v_major != major {
            return Err(invalid(format!(
                "major '{}' does not match version '{}'",
                major, version
            )));
        }

        let v_minor_digits: String = v_minor.chars().take_while(|c| c.is_ascii_digit()).collect();
        if v_minor_digits != minor_digits {
            return Err(invalid(format!(
                "minor '{}' does not match version '{}'",
                minor, version
            )));
        }

        Ok(Self {
            version: version.to_string(),
            major: major.to_string(),
            minor: minor.to_string(),
        })
    }

    /// The version as semver, used for `kubeVersion` constraints
    ///
    /// Provider suffixes like `-gke.100` are kept as pre-release tags.
    pub fn semver(&self) -> Option<Version> {
        let bare = self.version.trim_start_matches('v');
        Version::parse(bare).ok().or_else(|| {
            // "1.23" -> "1.23.0"
            Version::parse(&format!("{}.0", bare)).ok()
        })
    }
}

impl std::fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.version)
    }
}

/// Current template information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    /// Template path relative to the chart, e.g. `wordpress/templates/svc.yaml`
    pub name: String,

    pub base_path: String,
}

impl TemplateContext {
    pub fn new(
        values: Values,
        release: ReleaseInfo,
        chart: &Chart,
        platform: &PlatformVersion,
    ) -> Self {
        Self {
            values: values.into_inner(),
            release,
            chart: ChartInfo::from(chart),
            capabilities: Capabilities::for_platform(platform),
            template: TemplateInfo::default(),
        }
    }

    /// Set the current template info
    pub fn with_template(mut self, name: &str, base_path: &str) -> Self {
        self.template = TemplateInfo {
            name: name.to_string(),
            base_path: base_path.to_string(),
        };
        self
    }
}
