//! Font copying.

use std::sync::Arc;

use ashlar_graph::{Task, TaskContext, TaskError, TaskReport};

use crate::config::PipelineConfig;
use crate::files;

const FONTS_DIR: &str = "assets/fonts";
const FONTS_OUT: &str = "fonts";

/// Copies every font file into the build tree, keeping sub-directories.
pub struct FontsTask {
    config: Arc<PipelineConfig>,
}

impl FontsTask {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

impl Task for FontsTask {
    fn name(&self) -> &'static str {
        "fonts"
    }

    fn title(&self) -> &'static str {
        "Fonts"
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let base = self.config.source_path(FONTS_DIR);
        let out = self.config.build_path(FONTS_OUT);
        let mut report = TaskReport::new();

        for font in files::select(&base, "**/*.*")? {
            let relative = font.strip_prefix(&base).unwrap_or(&font);
            tracing::debug!("fonts: {}", relative.display());
            report.push(files::copy(&font, &out.join(relative))?);
        }

        Ok(report)
    }
}
