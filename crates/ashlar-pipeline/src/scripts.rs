//! Script minification and library concatenation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ashlar_graph::{Task, TaskContext, TaskError, TaskReport};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::config::PipelineConfig;
use crate::files;

const SCRIPTS: &str = "assets/scripts/*.js";
const LIBS_DIR: &str = "assets/scripts/libs";
const LIBS_ENTRY: &str = "jquery.min.js";
const SCRIPTS_OUT: &str = "js";
const LIBS_OUT: &str = "js/libs.min.js";

/// Minify a browser script.
pub fn minify_js(path: &Path, source: &str) -> Result<String, TaskError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::cjs()).parse();

    if let Some(err) = parsed.errors.first() {
        return Err(TaskError::malformed(path, err));
    }

    let mut program = parsed.program;
    let minified = Minifier::new(MinifierOptions::default()).build(&allocator, &mut program);

    Ok(Codegen::new()
        .with_options(CodegenOptions::minify())
        .with_scoping(minified.scoping)
        .build(&program)
        .code)
}

/// Minifies every top-level script into the build tree.
pub struct ScriptsTask {
    config: Arc<PipelineConfig>,
}

impl ScriptsTask {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

impl Task for ScriptsTask {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn title(&self) -> &'static str {
        "Scripts"
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let out = self.config.build_path(SCRIPTS_OUT);
        let mut report = TaskReport::new();

        for script in files::select(&self.config.source(), SCRIPTS)? {
            let code = minify_js(&script, &files::read_to_string(&script)?)?;
            report.push(files::write(&out.join(files::file_name(&script)?), code)?);
        }

        Ok(report)
    }
}

/// Put `entry` first (when it exists), then the matched files in order,
/// each at most once.
pub fn library_order(entry: &Path, matched: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut ordered = Vec::with_capacity(matched.len() + 1);
    if entry.is_file() {
        ordered.push(entry.to_path_buf());
    }

    for path in matched {
        if !ordered.contains(&path) {
            ordered.push(path);
        }
    }

    ordered
}

/// Concatenates third-party libraries into one file, entry library first.
pub struct LibsTask {
    config: Arc<PipelineConfig>,
}

impl LibsTask {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

impl Task for LibsTask {
    fn name(&self) -> &'static str {
        "scripts:libs"
    }

    fn title(&self) -> &'static str {
        "Libraries"
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let dir = self.config.source_path(LIBS_DIR);
        let ordered = library_order(&dir.join(LIBS_ENTRY), files::select(&dir, "**/*.js")?);

        if ordered.is_empty() {
            return Ok(TaskReport::new());
        }

        let parts = ordered
            .iter()
            .map(|path| files::read_to_string(path))
            .collect::<Result<Vec<_>, _>>()?;

        let out = self.config.build_path(LIBS_OUT);
        let mut report = TaskReport::new();
        report.push(files::write(&out, parts.join("\n"))?);
        Ok(report)
    }
}
