//! Render error types

use chartpipe_core::CoreError;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::suggestions::{closest, AVAILABLE_FILTERS, AVAILABLE_FUNCTIONS, CONTEXT_VARIABLES};

/// Errors produced while rendering a chart
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Template(Box<TemplateError>),

    #[error("Chart '{chart}' declares dependencies missing from charts/: {}", missing.join(", "))]
    MissingDependencies { chart: String, missing: Vec<String> },

    #[error("Chart '{chart}' requires kubeVersion {constraint}, target platform is {platform}")]
    IncompatiblePlatform {
        chart: String,
        constraint: String,
        platform: String,
    },

    #[error("Failed to load chart: {0}")]
    Chart(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TemplateError> for RenderError {
    fn from(err: TemplateError) -> Self {
        Self::Template(Box::new(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

/// Template error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{template}: {message}")]
#[diagnostic(code(chartpipe::template::render))]
pub struct TemplateError {
    pub message: String,

    /// Template path, e.g. `wordpress/templates/svc.yaml`
    pub template: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    pub fn from_minijinja(err: minijinja::Error, template_name: &str, template_source: &str) -> Self {
        let kind = categorize(&err);
        let message = err
            .detail()
            .map(String::from)
            .unwrap_or_else(|| err.to_string())
            .replace("undefined value", "undefined variable");
        let span = err
            .line()
            .and_then(|line| calculate_span(template_source, line));
        let suggestion = suggest(&err, kind);

        Self {
            message,
            template: template_name.to_string(),
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion,
        }
    }

    /// Error without source mapping
    pub fn simple(template_name: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            template: template_name.to_string(),
            kind: TemplateErrorKind::Other,
            src: NamedSource::new(template_name, String::new()),
            span: None,
            suggestion: None,
        }
    }
}

fn categorize(err: &minijinja::Error) -> TemplateErrorKind {
    match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::Other,
    }
}

/// Span covering the whole of line `line_num` (1-based)
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (idx, line) in source.lines().enumerate() {
        if idx + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }
    None
}

/// Word preceding the caret marker in minijinja's detailed display
fn marked_name(err: &minijinja::Error) -> Option<String> {
    let detailed = format!("{:#}", err);
    let lines: Vec<&str> = detailed.lines().collect();

    let caret_idx = lines.iter().position(|l| l.contains('^'))?;
    let caret_line = lines[caret_idx];
    let source_line = lines.get(caret_idx.checked_sub(1)?)?;

    let start = caret_line.find('^')?;
    let end = caret_line.rfind('^')? + 1;
    let marked = source_line.get(start..end)?.trim();
    (!marked.is_empty()).then(|| marked.to_string())
}

fn suggest(err: &minijinja::Error, kind: TemplateErrorKind) -> Option<String> {
    match kind {
        TemplateErrorKind::UnknownFilter => {
            let name = marked_name(err)?;
            closest(&name, AVAILABLE_FILTERS).map(|m| format!("Did you mean the `{}` filter?", m))
        }
        TemplateErrorKind::UnknownFunction => {
            let name = marked_name(err)?;
            closest(&name, AVAILABLE_FUNCTIONS).map(|m| format!("Did you mean `{}()`?", m))
        }
        TemplateErrorKind::UndefinedVariable => {
            let name = marked_name(err)?;
            let root = name.split('.').next().unwrap_or(&name);
            match closest(root, CONTEXT_VARIABLES) {
                Some(m) if m != root => Some(format!(
                    "Did you mean `{}`? Top-level variables are: {}",
                    name.replacen(root, m, 1),
                    CONTEXT_VARIABLES.join(", ")
                )),
                _ => Some(format!(
                    "`{}` is not defined. Set it in values or use `| default(...)`.",
                    name
                )),
            }
        }
        TemplateErrorKind::SyntaxError => Some(
            "Check bracket matching: `{{ }}` for expressions, `{% %}` for statements".to_string(),
        ),
        _ => None,
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
