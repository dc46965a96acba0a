//! Run settings
//!
//! Everything a run needs is in one `Settings` value, usually loaded from
//! `chartpipe.yaml`:
//!
//! ```yaml
//! platform:
//!   version: v1.23.10
//!   major: "1"
//!   minor: "23"
//! outputDir: .
//! timeout: 30s
//! failurePolicy: report
//! credentials:
//!   registry:
//!     type: env
//!     usernameVar: USER
//!     passwordVar: PASS
//! pipelines: []
//! ```

use chartpipe_core::PlatformVersion;
use chartpipe_repo::{Credentials, HttpSettings};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::sink::validate_output_name;
use crate::spec::{Action, PipelineSpec, SourceSpec};

/// How pipeline failures affect the run's outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Failures are logged and summarized; the run itself succeeds
    #[default]
    Report,
    /// Any failed pipeline fails the run
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Platform version every render targets
    #[serde(default = "default_platform")]
    pub platform: PlatformVersion,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Repository registry, indexes and chart archives
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Per network call; none means wait indefinitely
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Named credential declarations referenced by pipeline sources
    #[serde(default)]
    pub credentials: BTreeMap<String, Credentials>,

    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,
}

fn default_platform() -> PlatformVersion {
    PlatformVersion {
        version: "v1.23.10".to_string(),
        major: "1".to_string(),
        minor: "23".to_string(),
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("chartpipe"))
        .unwrap_or_else(|| PathBuf::from(".chartpipe"))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            output_dir: default_output_dir(),
            cache_dir: default_cache_dir(),
            timeout: None,
            failure_policy: FailurePolicy::default(),
            credentials: BTreeMap::new(),
            pipelines: Vec::new(),
        }
    }
}

impl Settings {
    /// Parse and validate settings from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| PipelineError::SettingsIo {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml(&content)
    }

    /// The three charts of the reference run, in order:
    ///
    /// 1. `show`: chart metadata of `simple` from a private raw-URL
    ///    repository, token from `GH_TOKEN`
    /// 2. `wordpress`: `bitnami/wordpress` rendered as release `test`
    /// 3. `simple`: an OCI chart rendered after logging in with
    ///    `USER`/`PASS`
    pub fn reference() -> Self {
        let mut credentials = BTreeMap::new();
        credentials.insert(
            "github".to_string(),
            Credentials::env_token("natasha41575", "GH_TOKEN"),
        );
        credentials.insert(
            "registry".to_string(),
            Credentials::from_env("USER", "PASS"),
        );

        let render_test = || Action::Render {
            release_name: "test".to_string(),
            namespace: "default".to_string(),
        };

        Self {
            credentials,
            pipelines: vec![
                PipelineSpec {
                    name: "show-chart-private-non-oci-repo".to_string(),
                    output: "show".to_string(),
                    source: SourceSpec::RemoteIndex {
                        url: "https://raw.githubusercontent.com/natasha41575/cs-helm-test/main"
                            .to_string(),
                        chart: "simple".to_string(),
                        version: None,
                        credentials: Some("github".to_string()),
                    },
                    action: Action::Show {
                        format: chartpipe_core::ShowFormat::Chart,
                    },
                    values: None,
                    set: Vec::new(),
                },
                PipelineSpec {
                    name: "template-public-non-oci-repo".to_string(),
                    output: "wordpress".to_string(),
                    source: SourceSpec::Repository {
                        name: "bitnami".to_string(),
                        url: "https://charts.bitnami.com/bitnami".to_string(),
                        chart: "wordpress".to_string(),
                        version: None,
                        pass_credentials_all: true,
                        credentials: None,
                    },
                    action: render_test(),
                    values: None,
                    set: Vec::new(),
                },
                PipelineSpec {
                    name: "template-private-oci-repo".to_string(),
                    output: "simple".to_string(),
                    source: SourceSpec::Oci {
                        uri: "oci://us-central1-docker.pkg.dev/disco-haiku-324600/config-sync-test/simple"
                            .to_string(),
                        registry: Some("https://us-central1-docker.pkg.dev".to_string()),
                        credentials: Some("registry".to_string()),
                    },
                    action: render_test(),
                    values: None,
                    set: Vec::new(),
                },
            ],
            ..Self::default()
        }
    }

    /// Check cross references the YAML schema cannot express
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| PipelineError::InvalidSettings { message };

        let mut outputs = HashSet::new();
        for pipeline in &self.pipelines {
            validate_output_name(&pipeline.output)
                .map_err(|e| invalid(format!("pipeline '{}': {}", pipeline.name, e)))?;

            if !outputs.insert(pipeline.output.as_str()) {
                return Err(invalid(format!(
                    "output '{}' is written by more than one pipeline",
                    pipeline.output
                )));
            }

            if let Some(name) = pipeline.source.credentials()
                && !self.credentials.contains_key(name)
            {
                return Err(invalid(format!(
                    "pipeline '{}' references unknown credentials '{}'",
                    pipeline.name, name
                )));
            }
        }
        Ok(())
    }

    /// Credential declaration for a source, if it names one
    pub fn credentials_for(&self, source: &SourceSpec) -> Option<&Credentials> {
        source
            .credentials()
            .and_then(|name| self.credentials.get(name))
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings::with_timeout(self.timeout)
    }
}
