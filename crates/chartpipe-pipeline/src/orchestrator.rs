//! Runs pipelines in order, isolating their failures
//!
//! Each pipeline moves through
//! `Pending -> Located -> Rendered -> Written`, or stops in `Failed` at the
//! stage that went wrong. A failed pipeline never stops the ones after it.

use chartpipe_core::{ChartInspector, ChartReference, ReleaseIdentity, RenderedArtifact};
use chartpipe_engine::TemplateRenderer;
use chartpipe_repo::{
    ChartLocator, CredentialProvider, OciReference, RegistryAuthenticator, RegistrySession,
    RepositoryRegistrar, ResolvedCredentials,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::settings::Settings;
use crate::sink::OutputSink;
use crate::spec::{Action, PipelineSpec, SourceSpec};

/// Step of a pipeline, as reported on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Register,
    Login,
    Locate,
    Render,
    Show,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Register => "register",
            Stage::Login => "login",
            Stage::Locate => "locate",
            Stage::Render => "render",
            Stage::Show => "show",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum PipelineState {
    Pending,
    Located,
    /// Payload produced, by rendering or showing
    Rendered,
    Written,
    Failed { stage: Stage, detail: String },
}

/// Terminal outcome of one pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub name: String,
    pub output: String,
    pub state: PipelineState,
}

impl PipelineResult {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Written
    }

    pub fn error_detail(&self) -> Option<&str> {
        match &self.state {
            PipelineState::Failed { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.state {
            PipelineState::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Results of a run, in pipeline order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub results: Vec<PipelineResult>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(PipelineResult::succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PipelineResult> {
        self.results.iter().filter(|r| !r.succeeded())
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn get(&self, name: &str) -> Option<&PipelineResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

/// Why a pipeline stopped
struct StageFailure {
    stage: Stage,
    detail: String,
}

fn at<E: fmt::Display>(stage: Stage) -> impl FnOnce(E) -> StageFailure {
    move |e| StageFailure {
        stage,
        detail: e.to_string(),
    }
}

/// Clients shared by every pipeline of one run
struct RunContext {
    registrar: Arc<RepositoryRegistrar>,
    authenticator: RegistryAuthenticator,
    locator: ChartLocator,
}

type ProgressFn = Box<dyn Fn(&PipelineSpec) + Send + Sync>;

/// Drives the pipelines of a `Settings` value
pub struct PipelineOrchestrator {
    settings: Settings,
    provider: CredentialProvider,
    sink: Arc<dyn OutputSink>,
    renderer: TemplateRenderer,
    inspector: ChartInspector,
    on_start: Option<ProgressFn>,
}

impl PipelineOrchestrator {
    pub fn new(settings: Settings, provider: CredentialProvider, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            settings,
            provider,
            sink,
            renderer: TemplateRenderer::default(),
            inspector: ChartInspector::new(),
            on_start: None,
        }
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Called with each pipeline just before it runs
    pub fn on_start(mut self, callback: impl Fn(&PipelineSpec) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(callback));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run every pipeline in order
    ///
    /// Errors here are setup failures only. Pipeline failures are reported
    /// in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let http = self.settings.http_settings();
        let registrar = Arc::new(RepositoryRegistrar::new(&self.settings.cache_dir, http));
        let authenticator = RegistryAuthenticator::new(http)?;

        let mut locator = ChartLocator::new(registrar.clone(), self.provider.clone());
        for pipeline in &self.settings.pipelines {
            if let (SourceSpec::Repository { name, .. }, Some(credentials)) = (
                &pipeline.source,
                self.settings.credentials_for(&pipeline.source),
            ) {
                locator = locator.with_repository_credentials(name, credentials.clone());
            }
        }

        let context = RunContext {
            registrar,
            authenticator,
            locator,
        };

        self.clear_outputs();

        let mut summary = RunSummary::default();
        for spec in &self.settings.pipelines {
            if let Some(callback) = &self.on_start {
                callback(spec);
            }
            summary.results.push(self.run_pipeline(spec, &context).await);
        }

        tracing::info!(
            succeeded = summary.succeeded_count(),
            failed = summary.results.len() - summary.succeeded_count(),
            "run finished"
        );
        Ok(summary)
    }

    /// A missing output afterwards then always means a failed pipeline
    fn clear_outputs(&self) {
        for spec in &self.settings.pipelines {
            if let Err(e) = self.sink.remove(&spec.output) {
                tracing::warn!(pipeline = %spec.name, output = %spec.output, error = %e, "could not remove previous output");
            }
        }
    }

    async fn run_pipeline(&self, spec: &PipelineSpec, context: &RunContext) -> PipelineResult {
        let source = spec.source.kind();
        tracing::info!(pipeline = %spec.name, source, "running pipeline");

        let mut state = PipelineState::Pending;
        if let Err(failure) = self.execute(spec, context, &mut state).await {
            tracing::error!(
                pipeline = %spec.name,
                stage = %failure.stage,
                source,
                error = %failure.detail,
                "pipeline failed"
            );
            state = PipelineState::Failed {
                stage: failure.stage,
                detail: failure.detail,
            };
        }

        PipelineResult {
            name: spec.name.clone(),
            output: spec.output.clone(),
            state,
        }
    }

    async fn execute(
        &self,
        spec: &PipelineSpec,
        context: &RunContext,
        state: &mut PipelineState,
    ) -> std::result::Result<(), StageFailure> {
        let credentials = self
            .settings
            .credentials_for(&spec.source)
            .map(|declared| self.provider.resolve(declared));

        // Dropped when this pipeline ends
        let mut session: Option<RegistrySession> = None;

        let reference = match &spec.source {
            SourceSpec::Repository {
                name,
                chart,
                version,
                ..
            } => {
                if let Some(entry) = spec.source.repository_entry()
                    && let Err(e) = context
                        .registrar
                        .register_or_update(entry, credentials)
                        .await
                {
                    tracing::warn!(
                        pipeline = %spec.name,
                        stage = %Stage::Register,
                        source = spec.source.kind(),
                        repo = %name,
                        error = %e,
                        "repository registration failed, using the cached index if there is one"
                    );
                }
                ChartReference::repository(name, chart, version.as_deref())
            }

            SourceSpec::Oci { uri, registry, .. } => {
                let reference = ChartReference::oci(uri).map_err(at(Stage::Locate))?;
                let parsed = OciReference::parse(uri).map_err(at(Stage::Locate))?;
                let host = registry.clone().unwrap_or(parsed.registry);

                let (username, password) = match credentials {
                    None => (String::new(), String::new()),
                    Some(ResolvedCredentials::Basic { username, password }) => (username, password),
                    Some(ResolvedCredentials::Bearer { .. }) => {
                        return Err(StageFailure {
                            stage: Stage::Login,
                            detail: format!("login to {} needs a username and password", host),
                        });
                    }
                };

                session = Some(
                    context
                        .authenticator
                        .login(&host, &username, &password)
                        .await
                        .map_err(at(Stage::Login))?,
                );
                reference
            }

            SourceSpec::RemoteIndex {
                url,
                chart,
                version,
                ..
            } => {
                let (username, password) = match credentials {
                    None => (None, None),
                    Some(ResolvedCredentials::Basic { username, password }) => {
                        (Some(username), Some(password))
                    }
                    Some(ResolvedCredentials::Bearer { .. }) => {
                        return Err(StageFailure {
                            stage: Stage::Locate,
                            detail: format!("{} needs a username and password, not a token", url),
                        });
                    }
                };
                ChartReference::RemoteIndex {
                    url: url.clone(),
                    chart: chart.clone(),
                    version: version.clone(),
                    username,
                    password,
                }
            }
        };

        let artifact = context
            .locator
            .locate(&reference, session.as_ref())
            .await
            .map_err(at(Stage::Locate))?;
        *state = PipelineState::Located;
        tracing::debug!(
            pipeline = %spec.name,
            chart = %artifact.name,
            version = %artifact.version,
            "chart located"
        );

        let payload = match &spec.action {
            Action::Render {
                release_name,
                namespace,
            } => {
                let layers = spec.value_layers().map_err(at(Stage::Render))?;
                let identity = ReleaseIdentity::new(reference, release_name, namespace);
                self.renderer
                    .render_with_values(&artifact, &identity, &self.settings.platform, &layers)
                    .map_err(at(Stage::Render))?
            }
            Action::Show { format } => self
                .inspector
                .show(&artifact, *format)
                .map_err(at(Stage::Show))?
                .into_bytes(),
        };
        *state = PipelineState::Rendered;

        let rendered = RenderedArtifact {
            output_name: spec.output.clone(),
            payload,
        };
        self.sink
            .write(&rendered.output_name, &rendered.payload)
            .map_err(at(Stage::Write))?;
        *state = PipelineState::Written;

        tracing::info!(
            pipeline = %spec.name,
            output = %rendered.output_name,
            bytes = rendered.payload.len(),
            "output written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(state: PipelineState) -> PipelineResult {
        PipelineResult {
            name: "p".to_string(),
            output: "p".to_string(),
            state,
        }
    }

    #[test]
    fn test_result_accessors() {
        let ok = result(PipelineState::Written);
        assert!(ok.succeeded());
        assert_eq!(ok.error_detail(), None);

        let failed = result(PipelineState::Failed {
            stage: Stage::Login,
            detail: "Invalid credentials for registry r.example.com".to_string(),
        });
        assert!(!failed.succeeded());
        assert_eq!(failed.failed_stage(), Some(Stage::Login));
        assert!(failed.error_detail().unwrap().contains("Invalid credentials"));

        assert!(!result(PipelineState::Located).succeeded());
    }

    #[test]
    fn test_summary() {
        let summary = RunSummary {
            results: vec![
                result(PipelineState::Written),
                result(PipelineState::Failed {
                    stage: Stage::Locate,
                    detail: "not found".to_string(),
                }),
            ],
        };
        assert!(!summary.all_succeeded());
        assert_eq!(summary.succeeded_count(), 1);
        assert_eq!(summary.failed().count(), 1);
        assert!(RunSummary::default().all_succeeded());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Register.to_string(), "register");
        assert_eq!(Stage::Write.to_string(), "write");
    }
}
