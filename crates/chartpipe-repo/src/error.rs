//! Error types for chart sources
//!
//! `RepoError` covers the low-level network, index and integrity failures.
//! Each pipeline stage has its own error that wraps it where needed.

use chartpipe_core::CoreError;
use thiserror::Error;

/// Low-level repository errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    // ============ Authentication Errors ============
    #[error("Authentication required for {url}")]
    AuthRequired { url: String },

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("Credential not available: {message}")]
    CredentialNotFound { message: String },

    // ============ Index Errors ============
    #[error("Invalid repository URL: {url} - {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("Index not found at {url}")]
    IndexNotFound { url: String },

    #[error("Invalid index format: {message}")]
    InvalidIndex { message: String },

    #[error("Integrity check failed for {name}: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        name: String,
        expected: String,
        actual: String,
    },

    // ============ OCI Errors ============
    #[error("OCI registry error: {message}")]
    OciError { message: String },

    #[error("Invalid OCI reference: {reference}")]
    InvalidOciReference { reference: String },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for low-level repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Timeout {
                message: e.to_string(),
            }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidRepositoryUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for RepoError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        RepoError::Timeout {
            message: e.to_string(),
        }
    }
}

/// Repository registration failures
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid repository URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to fetch index for repository '{name}': {source}")]
    Fetch {
        name: String,
        #[source]
        source: RepoError,
    },

    #[error("Failed to persist repository '{name}': {message}")]
    Persist { name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// OCI registry login failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials for registry {host}")]
    InvalidCredentials { host: String },

    #[error("Registry {host} is unreachable: {message}")]
    Unreachable { host: String, message: String },

    #[error("Registry {host} requested unsupported authentication scheme '{scheme}'")]
    UnsupportedScheme { host: String, scheme: String },

    #[error("Invalid registry host '{host}': {reason}")]
    InvalidHost { host: String, reason: String },
}

/// Chart location failures
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("Repository '{name}' is not registered")]
    RepositoryNotRegistered { name: String },

    #[error("Not authorized to pull {reference}: {reason}")]
    Unauthorized { reference: String, reason: String },

    #[error("Chart '{chart}' not found in {source_name}{}", suggestion_text(.suggestion))]
    ChartNotFound {
        chart: String,
        source_name: String,
        suggestion: Option<String>,
    },

    #[error("No version of '{chart}' matches '{constraint}' (available: {available})")]
    VersionNotFound {
        chart: String,
        constraint: String,
        available: String,
    },

    #[error(transparent)]
    Fetch(#[from] RepoError),

    #[error("Invalid chart archive: {0}")]
    Archive(#[from] CoreError),
}

fn suggestion_text(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{}'?)", s))
        .unwrap_or_default()
}

impl From<std::io::Error> for LocateError {
    fn from(e: std::io::Error) -> Self {
        LocateError::Fetch(RepoError::Io(e))
    }
}
