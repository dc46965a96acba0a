//! References to charts in their various sources

use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Where a chart comes from
///
/// `Debug` and `Display` never print the password of a `RemoteIndex`.
#[derive(Clone, PartialEq, Eq)]
pub enum ChartReference {
    /// Chart in a registered classic repository, `repo/chart[:version]`
    Repository {
        repo: String,
        chart: String,
        version: Option<String>,
    },

    /// Chart in an OCI registry, `oci://host/path/name[:tag]`
    Oci { uri: String },

    /// Chart in an unregistered repository reached with inline credentials
    RemoteIndex {
        url: String,
        chart: String,
        version: Option<String>,
        username: Option<String>,
        password: Option<String>,
    },
}

impl ChartReference {
    pub fn repository(repo: &str, chart: &str, version: Option<&str>) -> Self {
        Self::Repository {
            repo: repo.to_string(),
            chart: chart.to_string(),
            version: version.map(String::from),
        }
    }

    pub fn oci(uri: &str) -> Result<Self> {
        validate_oci(uri)?;
        Ok(Self::Oci {
            uri: uri.to_string(),
        })
    }

    /// Name of the chart this reference points to
    pub fn chart_name(&self) -> &str {
        match self {
            Self::Repository { chart, .. } | Self::RemoteIndex { chart, .. } => chart,
            Self::Oci { uri } => {
                let path = uri.trim_start_matches("oci://");
                let last = path.rsplit('/').next().unwrap_or(path);
                let last = last.split('@').next().unwrap_or(last);
                last.split(':').next().unwrap_or(last)
            }
        }
    }
}

fn validate_oci(uri: &str) -> Result<()> {
    let invalid = |reason: &str| CoreError::InvalidReference {
        reference: uri.to_string(),
        reason: reason.to_string(),
    };

    let rest = uri
        .strip_prefix("oci://")
        .ok_or_else(|| invalid("OCI references must start with oci://"))?;
    let (host, path) = rest
        .split_once('/')
        .ok_or_else(|| invalid("missing repository path after the registry host"))?;
    if host.is_empty() {
        return Err(invalid("missing registry host"));
    }
    if path.is_empty() || path.split('/').any(str::is_empty) {
        return Err(invalid("empty path segment"));
    }
    Ok(())
}

impl FromStr for ChartReference {
    type Err = CoreError;

    /// Parse `oci://...` or `repo/chart[:version]`
    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("oci://") {
            return Self::oci(s);
        }

        let (name, version) = match s.split_once(':') {
            Some((name, version)) if !version.is_empty() => (name, Some(version)),
            Some(_) => {
                return Err(CoreError::InvalidReference {
                    reference: s.to_string(),
                    reason: "empty version after ':'".to_string(),
                });
            }
            None => (s, None),
        };

        match name.split_once('/') {
            Some((repo, chart))
                if !repo.is_empty() && !chart.is_empty() && !chart.contains('/') =>
            {
                Ok(Self::repository(repo, chart, version))
            }
            _ => Err(CoreError::InvalidReference {
                reference: s.to_string(),
                reason: "expected repo/chart[:version] or oci://host/path/chart[:tag]".to_string(),
            }),
        }
    }
}

impl fmt::Display for ChartReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository {
                repo,
                chart,
                version,
            } => match version {
                Some(v) => write!(f, "{}/{}:{}", repo, chart, v),
                None => write!(f, "{}/{}", repo, chart),
            },
            Self::Oci { uri } => write!(f, "{}", uri),
            Self::RemoteIndex {
                url,
                chart,
                version,
                ..
            } => match version {
                Some(v) => write!(f, "{} {}:{}", url, chart, v),
                None => write!(f, "{} {}", url, chart),
            },
        }
    }
}

impl fmt::Debug for ChartReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository {
                repo,
                chart,
                version,
            } => f
                .debug_struct("Repository")
                .field("repo", repo)
                .field("chart", chart)
                .field("version", version)
                .finish(),
            Self::Oci { uri } => f.debug_struct("Oci").field("uri", uri).finish(),
            Self::RemoteIndex {
                url,
                chart,
                version,
                username,
                password,
            } => f
                .debug_struct("RemoteIndex")
                .field("url", url)
                .field("chart", chart)
                .field("version", version)
                .field("username", username)
                .field("password", &password.as_ref().map(|_| "[REDACTED]"))
                .finish(),
        }
    }
}
