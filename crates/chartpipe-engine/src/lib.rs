//! chartpipe engine - chart rendering
//!
//! A MiniJinja-based template engine with manifest-oriented filters,
//! subchart support and miette diagnostics for template errors. Output is
//! deterministic: no time or randomness is exposed to templates.

pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod renderer;
pub mod subchart;
pub mod suggestions;

pub use engine::{Engine, EngineBuilder, RenderedChart};
pub use error::{RenderError, TemplateError, TemplateErrorKind};
pub use renderer::TemplateRenderer;
