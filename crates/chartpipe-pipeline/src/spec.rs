//! Pipeline specifications
//!
//! One pipeline locates one chart and writes one output:
//!
//! ```yaml
//! name: wordpress
//! output: wordpress
//! source:
//!   repository:
//!     name: bitnami
//!     url: https://charts.bitnami.com/bitnami
//!     chart: wordpress
//!     passCredentialsAll: true
//! action:
//!   render:
//!     releaseName: test
//!     namespace: default
//! ```

use chartpipe_core::{ShowFormat, Values, parse_set_values};
use chartpipe_repo::RepositoryEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    /// Label used in logs and the run summary
    pub name: String,

    /// Output name handed to the sink
    pub output: String,

    #[serde(with = "serde_yaml::with::singleton_map")]
    pub source: SourceSpec,

    #[serde(with = "serde_yaml::with::singleton_map")]
    pub action: Action,

    /// Inline values merged over the chart's `values.yaml`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<JsonValue>,

    /// `key=value` overrides applied after `values`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<String>,
}

impl PipelineSpec {
    /// Value layers for the renderer, lowest precedence first
    pub fn value_layers(&self) -> chartpipe_core::error::Result<Vec<Values>> {
        let mut layers = Vec::new();
        if let Some(values) = &self.values {
            layers.push(Values(values.clone()));
        }
        if !self.set.is_empty() {
            layers.push(parse_set_values(&self.set)?);
        }
        Ok(layers)
    }
}

/// Where the chart comes from
///
/// `credentials` names an entry of the settings' `credentials` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SourceSpec {
    /// Registered classic repository
    Repository {
        name: String,
        url: String,
        chart: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default)]
        pass_credentials_all: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<String>,
    },

    /// OCI registry; login goes to the reference's host unless `registry`
    /// says otherwise
    Oci {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registry: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<String>,
    },

    /// Unregistered repository reached directly
    RemoteIndex {
        url: String,
        chart: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<String>,
    },
}

impl SourceSpec {
    pub fn credentials(&self) -> Option<&str> {
        match self {
            Self::Repository { credentials, .. }
            | Self::Oci { credentials, .. }
            | Self::RemoteIndex { credentials, .. } => credentials.as_deref(),
        }
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Repository { .. } => "repository",
            Self::Oci { .. } => "oci",
            Self::RemoteIndex { .. } => "remote-index",
        }
    }

    /// Registry entry for a repository source
    pub fn repository_entry(&self) -> Option<RepositoryEntry> {
        match self {
            Self::Repository {
                name,
                url,
                pass_credentials_all,
                ..
            } => Some(
                RepositoryEntry::new(name, url).with_pass_credentials_all(*pass_credentials_all),
            ),
            _ => None,
        }
    }
}

/// What to do with the located chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    /// Render manifests for a release
    Render {
        release_name: String,
        #[serde(default = "default_namespace")]
        namespace: String,
    },

    /// Output declared chart content
    Show {
        #[serde(default)]
        format: ShowFormat,
    },
}

fn default_namespace() -> String {
    "default".to_string()
}
