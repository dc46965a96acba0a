//! chartpipe core - chart model and shared types
//!
//! This crate provides the foundational types used throughout chartpipe:
//! - `Chart` / `LoadedChart`: the chart definition and its on-disk layout
//! - `Values`: configuration values with deep merge support
//! - `ChartReference`: where a chart comes from
//! - `PlatformVersion` / `TemplateContext`: what templates render against
//! - `ChartInspector`: declared chart content without rendering

pub mod archive;
pub mod artifact;
pub mod chart;
pub mod context;
pub mod error;
pub mod reference;
pub mod release;
pub mod show;
pub mod values;

pub use archive::{extract_chart_archive, extract_chart_file, package_chart};
pub use artifact::{ChartArtifactPath, RenderedArtifact};
pub use chart::{Chart, ChartKind, Dependency, LoadedChart, Maintainer};
pub use context::{Capabilities, PlatformVersion, TemplateContext};
pub use error::CoreError;
pub use reference::ChartReference;
pub use release::{ReleaseIdentity, ReleaseInfo};
pub use show::{ChartInspector, ShowError, ShowFormat};
pub use values::{Values, parse_set_values};
