//! Image optimization into the build tree.

use std::path::PathBuf;
use std::sync::Arc;

use ashlar_graph::{Task, TaskContext, TaskError, TaskReport};
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::files;
use crate::optimize::optimize;

const IMAGES: &str = "assets/images/*.*";
const IMAGES_OUT: &str = "img";

/// Optimizes the top-level images and writes them next to the sprites.
pub struct ImagesTask {
    config: Arc<PipelineConfig>,
}

impl ImagesTask {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

impl Task for ImagesTask {
    fn name(&self) -> &'static str {
        "images"
    }

    fn title(&self) -> &'static str {
        "Images"
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let images = files::select(&self.config.source(), IMAGES)?;
        let out = self.config.build_path(IMAGES_OUT);

        let written: Vec<PathBuf> = images
            .par_iter()
            .map(|image| {
                tracing::debug!("images: {}", image.display());
                let bytes = optimize(image, files::read(image)?)?;
                files::write(&out.join(files::file_name(image)?), bytes)
            })
            .collect::<Result<_, TaskError>>()?;

        Ok(TaskReport { outputs: written })
    }
}
