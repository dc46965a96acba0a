//! Template engine based on MiniJinja

use chartpipe_core::{LoadedChart, TemplateContext};
use minijinja::Environment;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{RenderError, Result, TemplateError};
use crate::filters;
use crate::functions;

/// Templates rendered for one chart, without subcharts
#[derive(Debug, Default)]
pub struct RenderedChart {
    /// Rendered manifests keyed by source path (`<chart>/templates/<file>`)
    pub manifests: BTreeMap<String, String>,

    /// Rendered NOTES.txt, never part of the manifest output
    pub notes: Option<String>,
}

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Fail on undefined variables
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine::new(self.strict_mode)
    }
}

/// The template engine
#[derive(Debug, Clone)]
pub struct Engine {
    strict_mode: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Engine {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        env.set_undefined_behavior(if self.strict_mode {
            minijinja::UndefinedBehavior::Strict
        } else {
            minijinja::UndefinedBehavior::Lenient
        });
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("empty", filters::empty);
        env.add_filter("haskey", filters::haskey);
        env.add_filter("keys", filters::keys);
        env.add_filter("merge", filters::merge);
        env.add_filter("sha256", filters::sha256);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);
        env.add_filter("semver_match", filters::semver_match);

        env.add_function("fail", functions::fail);
        env.add_function("dict", functions::dict);
        env.add_function("list", functions::list);
        env.add_function("get", functions::get);
        env.add_function("coalesce", functions::coalesce);
        env.add_function("ternary", functions::ternary);
        env.add_function("tostring", functions::tostring);
        env.add_function("toint", functions::toint);
        env.add_function("printf", functions::printf);

        env
    }

    fn context_value(context: &TemplateContext) -> minijinja::Value {
        minijinja::context! {
            values => &context.values,
            release => &context.release,
            chart => &context.chart,
            capabilities => &context.capabilities,
            template => &context.template,
        }
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &TemplateContext,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();
        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;

        let tmpl = env
            .get_template(template_name)
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;

        tmpl.render(Self::context_value(context))
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template).into())
    }

    /// Render every non-helper template of one chart
    ///
    /// `source_prefix` names the chart in source paths: `wordpress` for the
    /// top-level chart, `wordpress/charts/mariadb` for a subchart. All
    /// templates are loaded first so helpers can be imported by name.
    pub fn render_chart(
        &self,
        chart: &LoadedChart,
        context: &TemplateContext,
        source_prefix: &str,
    ) -> Result<RenderedChart> {
        let template_files = chart.template_files()?;
        let mut env = self.create_environment();
        let mut sources = BTreeMap::new();

        for file_path in &template_files {
            let name = relative_name(file_path, &chart.templates_dir);
            let content = std::fs::read_to_string(file_path)?;
            let source = format!("{}/templates/{}", source_prefix, name);
            env.add_template_owned(name.clone(), content.clone())
                .map_err(|e| TemplateError::from_minijinja(e, &source, &content))?;
            sources.insert(name, content);
        }

        let mut rendered = RenderedChart::default();
        let base_path = format!("{}/templates", source_prefix);

        for (name, content) in &sources {
            let file_name = name.rsplit('/').next().unwrap_or(name);
            if file_name.starts_with('_') {
                continue;
            }

            let source = format!("{}/{}", base_path, name);
            let ctx = context.clone().with_template(&source, &base_path);

            let output = env
                .get_template(name)
                .and_then(|tmpl| tmpl.render(Self::context_value(&ctx)))
                .map_err(|e| RenderError::from(TemplateError::from_minijinja(e, &source, content)))?;

            if name.eq_ignore_ascii_case("NOTES.txt") {
                rendered.notes = Some(output);
                continue;
            }

            let trimmed = output.trim();
            if trimmed.is_empty() || trimmed == "---" {
                continue;
            }
            rendered.manifests.insert(source, output);
        }

        Ok(rendered)
    }
}

fn relative_name(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
