//! chartpipe - resolve charts from repositories and registries, render them to files

use chartpipe_pipeline::{FailurePolicy, FileSink, PipelineOrchestrator, Settings};
use chartpipe_repo::CredentialProvider;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod display;
mod error;
mod exit_codes;
mod logging;

use error::{CliError, Result};
use logging::LogFormat;

#[derive(Parser)]
#[command(name = "chartpipe")]
#[command(version)]
#[command(
    about = "Resolve charts from classic repositories and OCI registries and render them to files",
    long_about = "Runs the pipelines of a chartpipe.yaml file in order. Each pipeline locates one chart, \
                  renders or shows it and writes one output file. Without --config the built-in \
                  reference pipelines run."
)]
struct Cli {
    /// Settings file
    #[arg(short, long, env = "CHARTPIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for output files (overrides outputDir)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory for the repository registry and chart cache (overrides cacheDir)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Timeout for each network call, e.g. 30s or 2m (overrides timeout)
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Exit non-zero when any pipeline fails
    #[arg(long)]
    fail_on_error: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// Log format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

fn main() {
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version come through here too
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let code = match execute(cli) {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}

fn execute(cli: Cli) -> Result<()> {
    logging::init(cli.log_format, cli.debug)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::internal(format!("failed to start async runtime: {e}")))?;
    runtime.block_on(run(cli))
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => {
            tracing::debug!("no settings file given, running the reference pipelines");
            Settings::reference()
        }
    };

    if let Some(dir) = &cli.output_dir {
        settings.output_dir = dir.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        settings.cache_dir = dir.clone();
    }
    if cli.timeout.is_some() {
        settings.timeout = cli.timeout;
    }
    if cli.fail_on_error {
        settings.failure_policy = FailurePolicy::Fail;
    }
    Ok(settings)
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    tracing::debug!(
        pipelines = settings.pipelines.len(),
        output_dir = %settings.output_dir.display(),
        cache_dir = %settings.cache_dir.display(),
        "settings loaded"
    );

    let output_dir = settings.output_dir.clone();
    let policy = settings.failure_policy;
    let sink = Arc::new(FileSink::new(&output_dir));

    let summary = PipelineOrchestrator::new(settings, CredentialProvider::from_process(), sink)
        .on_start(display::pipeline_started)
        .run()
        .await?;

    display::print_summary(&summary, &output_dir);

    if policy == FailurePolicy::Fail && !summary.all_succeeded() {
        return Err(CliError::PipelinesFailed {
            failed: summary.failed().count(),
            total: summary.results.len(),
        });
    }
    Ok(())
}
