//! Error types for pipeline runs

use std::path::PathBuf;
use thiserror::Error;

/// Failure persisting a payload
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Invalid output name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Failed to write output '{name}': {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove output '{name}': {source}")]
    Remove {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that stop a run before any pipeline executes
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to read settings {}: {source}", .path.display())]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings: {0}")]
    SettingsParse(#[from] serde_yaml::Error),

    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    #[error("Failed to set up network clients: {0}")]
    Setup(#[from] chartpipe_repo::RepoError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
