//! CLI error types with exit code handling

use chartpipe_pipeline::PipelineError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Settings could not be used
    #[error("Configuration error: {message}")]
    #[diagnostic(code(chartpipe::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{failed} of {total} pipeline(s) failed")]
    #[diagnostic(
        code(chartpipe::cli::pipelines),
        help("see the log above for the stage and cause of each failure")
    )]
    PipelinesFailed { failed: usize, total: usize },

    /// File not found, permissions, etc.
    #[error("IO error: {message}")]
    #[diagnostic(code(chartpipe::cli::io))]
    Io { message: String },

    /// Runtime or client setup failure
    #[error("Internal error: {message}")]
    #[diagnostic(code(chartpipe::cli::internal))]
    Internal { message: String },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::PipelinesFailed { .. } => exit_codes::PIPELINE_FAILED,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<miette::Report> for CliError {
    fn from(err: miette::Report) -> Self {
        CliError::Internal {
            message: format!("{:?}", err),
        }
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::SettingsIo { .. } => CliError::Io {
                message: err.to_string(),
            },
            PipelineError::SettingsParse(_) | PipelineError::InvalidSettings { .. } => {
                CliError::config_with_help(
                    err.to_string(),
                    "check the file against the chartpipe.yaml layout: platform, outputDir, cacheDir, timeout, failurePolicy, credentials, pipelines",
                )
            }
            PipelineError::Setup(_) => CliError::internal(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
