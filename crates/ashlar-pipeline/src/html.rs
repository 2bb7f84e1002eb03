//! Template rendering to HTML.

use std::path::Path;
use std::sync::Arc;

use ashlar_graph::{Task, TaskContext, TaskError, TaskReport};
use minijinja::{context, path_loader, Environment};

use crate::config::PipelineConfig;
use crate::files;

/// Page templates, relative to the source root.
const PAGES: &str = "html/*.html";

/// Renders every page template into the build root.
///
/// Templates are loaded relative to the source root, so pages can include
/// partials and generated fragments by their path inside it (for example
/// `{% include "assets/styles/sprites/sprite-svg-symbol.html" %}`).
pub struct HtmlTask {
    config: Arc<PipelineConfig>,
}

impl HtmlTask {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    fn environment(&self, source: &Path) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_loader(path_loader(source));
        env.add_global("production", self.config.profile.is_production());
        env
    }
}

impl Task for HtmlTask {
    fn name(&self) -> &'static str {
        "html"
    }

    fn title(&self) -> &'static str {
        "HTML"
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let source = self.config.source();
        let pages = files::select(&source, PAGES)?;
        let env = self.environment(&source);
        let mut report = TaskReport::new();

        for page in pages {
            let name = template_name(&source, &page);
            let html = env
                .get_template(&name)
                .and_then(|tmpl| tmpl.render(context! {}))
                .map_err(|e| TaskError::malformed(&page, describe(&e)))?;

            let out = self.config.build().join(files::file_name(&page)?);
            report.push(files::write(&out, tidy(&html))?);
        }

        Ok(report)
    }
}

/// Loader name of a template: its path under the source root with `/`.
fn template_name(source: &Path, page: &Path) -> String {
    let relative = page.strip_prefix(source).unwrap_or(page);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Error text with the template location and every nested cause.
fn describe(err: &minijinja::Error) -> String {
    let mut message = err.to_string();
    let mut cause = std::error::Error::source(err);

    while let Some(inner) = cause {
        message.push_str("\n  caused by: ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }

    message
}

/// Strip trailing whitespace and collapse runs of blank lines.
pub fn tidy(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut blank = true;

    for line in html.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            if blank {
                continue;
            }
            blank = true;
        } else {
            blank = false;
        }
        out.push_str(line);
        out.push('\n');
    }

    while out.ends_with("\n\n") {
        out.pop();
    }

    out
}
