//! Removal of the previous build.

use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;

use ashlar_graph::{Task, TaskContext, TaskError, TaskReport};

use crate::config::PipelineConfig;

/// Deletes the build tree. A missing tree is not an error.
pub struct CleanTask {
    config: Arc<PipelineConfig>,
}

impl CleanTask {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

impl Task for CleanTask {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn title(&self) -> &'static str {
        "Clean"
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let build = self.config.build();

        match fs::remove_dir_all(&build) {
            Ok(()) => tracing::debug!("Removed {}", build.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(TaskError::io(&build, e)),
        }

        Ok(TaskReport::new())
    }
}
