//! chartpipe pipelines
//!
//! A run is described by [`Settings`]: a target platform, named credential
//! declarations and an ordered list of [`PipelineSpec`]s. The
//! [`PipelineOrchestrator`] runs them one after another:
//!
//! 1. register the repository (classic sources) or log in (OCI sources)
//! 2. locate and extract the chart
//! 3. render it for a release, or show its declared content
//! 4. hand the payload to an [`OutputSink`]
//!
//! A failing pipeline is logged and recorded in the [`RunSummary`]; the
//! remaining pipelines still run.

pub mod error;
pub mod orchestrator;
pub mod settings;
pub mod sink;
pub mod spec;

pub use error::{PipelineError, Result, SinkError};
pub use orchestrator::{PipelineOrchestrator, PipelineResult, PipelineState, RunSummary, Stage};
pub use settings::{FailurePolicy, Settings};
pub use sink::{FileSink, MemorySink, OutputSink, validate_output_name};
pub use spec::{Action, PipelineSpec, SourceSpec};
