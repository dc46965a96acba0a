//! Chart rendering with subcharts into a single manifest stream

use chartpipe_core::{
    ChartArtifactPath, CoreError, LoadedChart, PlatformVersion, ReleaseIdentity, ReleaseInfo,
    TemplateContext, Values,
};
use regex::Regex;
use semver::VersionReq;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::engine::Engine;
use crate::error::{RenderError, Result};
use crate::filters::parse_loose_version;
use crate::subchart::discover_subcharts;

/// Nested subchart levels rendered before giving up
const MAX_SUBCHART_DEPTH: usize = 10;

/// Renders a located chart for a release against a target platform
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    engine: Engine,
}

impl TemplateRenderer {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Render with the chart's own `values.yaml` only
    pub fn render(
        &self,
        artifact: &ChartArtifactPath,
        identity: &ReleaseIdentity,
        platform: &PlatformVersion,
    ) -> Result<Vec<u8>> {
        self.render_with_values(artifact, identity, platform, &[])
    }

    /// Render with value layers merged over `values.yaml`, later layers winning
    pub fn render_with_values(
        &self,
        artifact: &ChartArtifactPath,
        identity: &ReleaseIdentity,
        platform: &PlatformVersion,
        overrides: &[Values],
    ) -> Result<Vec<u8>> {
        let chart = LoadedChart::load(&artifact.root)?;

        if chart.chart.is_library() {
            return Err(RenderError::Chart(CoreError::InvalidChart {
                message: format!("library chart '{}' cannot be rendered", chart.chart.name),
            }));
        }

        let mut values = chart.default_values()?;
        for layer in overrides {
            values.merge(layer);
        }

        let release = identity.release_info();
        let mut manifests = BTreeMap::new();
        let prefix = chart.chart.name.clone();
        self.render_recursive(&chart, values, &release, platform, &prefix, 0, &mut manifests)?;

        Ok(assemble(&manifests))
    }

    #[allow(clippy::too_many_arguments)]
    fn render_recursive(
        &self,
        chart: &LoadedChart,
        values: Values,
        release: &ReleaseInfo,
        platform: &PlatformVersion,
        source_prefix: &str,
        depth: usize,
        manifests: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        check_platform(chart, platform)?;

        let discovery = discover_subcharts(chart, values.inner())?;
        if !discovery.missing.is_empty() {
            return Err(RenderError::MissingDependencies {
                chart: chart.chart.name.clone(),
                missing: discovery.missing.clone(),
            });
        }

        for subchart in discovery.enabled() {
            if depth >= MAX_SUBCHART_DEPTH {
                tracing::warn!(
                    chart = %chart.chart.name,
                    subchart = %subchart.name,
                    "maximum subchart depth reached, not rendering deeper"
                );
                break;
            }
            let scoped = Values::for_subchart(
                subchart.chart.default_values()?,
                &values,
                &subchart.name,
            );
            let prefix = format!("{}/charts/{}", source_prefix, subchart.name);
            self.render_recursive(
                &subchart.chart,
                scoped,
                release,
                platform,
                &prefix,
                depth + 1,
                manifests,
            )?;
        }

        for skipped in discovery.subcharts.iter().filter(|s| !s.enabled) {
            tracing::debug!(chart = %chart.chart.name, subchart = %skipped.name, "subchart disabled");
        }

        if chart.chart.is_library() {
            return Ok(());
        }

        let context = TemplateContext::new(values, release.clone(), &chart.chart, platform);
        let rendered = self.engine.render_chart(chart, &context, source_prefix)?;
        manifests.extend(rendered.manifests);
        Ok(())
    }
}

static OPERATOR_SPACE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"([<>=~^!]+)\s+"));

/// Normalize a `kubeVersion` constraint to `semver` syntax
///
/// Accepts `||` alternatives and space separated comparators, e.g.
/// `>= 1.19.0-0 < 1.30.0`.
fn parse_constraint(constraint: &str) -> Option<Vec<VersionReq>> {
    let regex = OPERATOR_SPACE.as_ref().ok()?;
    constraint
        .split("||")
        .map(|alt| {
            let joined = regex.replace_all(alt.trim(), "$1");
            let parts: Vec<&str> = joined
                .split([' ', ','])
                .filter(|p| !p.is_empty())
                .collect();
            VersionReq::parse(&parts.join(", ")).ok()
        })
        .collect()
}

fn check_platform(chart: &LoadedChart, platform: &PlatformVersion) -> Result<()> {
    let Some(constraint) = chart.chart.kube_version.as_deref() else {
        return Ok(());
    };

    let reqs = parse_constraint(constraint).ok_or_else(|| {
        RenderError::Chart(CoreError::InvalidChart {
            message: format!(
                "chart '{}' has an invalid kubeVersion '{}'",
                chart.chart.name, constraint
            ),
        })
    })?;

    let Some(version) = parse_loose_version(&platform.version) else {
        tracing::warn!(platform = %platform, "platform version is not semver, skipping kubeVersion check");
        return Ok(());
    };

    if reqs.iter().any(|req| req.matches(&version)) {
        Ok(())
    } else {
        Err(RenderError::IncompatiblePlatform {
            chart: chart.chart.name.clone(),
            constraint: constraint.to_string(),
            platform: platform.version.clone(),
        })
    }
}

/// `---\n# Source: <path>\n<content>\n` per manifest, in source order
fn assemble(manifests: &BTreeMap<String, String>) -> Vec<u8> {
    let mut out = String::new();
    for (source, content) in manifests {
        out.push_str("---\n# Source: ");
        out.push_str(source);
        out.push('\n');
        out.push_str(content.trim_end());
        out.push('\n');
    }
    out.into_bytes()
}
