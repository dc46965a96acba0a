//! Release identity types

use serde::{Deserialize, Serialize};

use crate::reference::ChartReference;

/// Release information for templates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub name: String,

    /// Target namespace
    pub namespace: String,

    pub revision: u32,

    pub is_install: bool,

    pub is_upgrade: bool,

    /// Always "chartpipe"
    pub service: String,
}

impl ReleaseInfo {
    /// Release info for an offline render, treated as a first install
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision: 1,
            is_install: true,
            is_upgrade: false,
            service: "chartpipe".to_string(),
        }
    }
}

/// What to render and under which release
#[derive(Debug, Clone)]
pub struct ReleaseIdentity {
    pub chart_ref: ChartReference,
    pub release_name: String,
    pub namespace: String,
}

impl ReleaseIdentity {
    pub fn new(
        chart_ref: ChartReference,
        release_name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            chart_ref,
            release_name: release_name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn release_info(&self) -> ReleaseInfo {
        ReleaseInfo::new(&self.release_name, &self.namespace)
    }
}
