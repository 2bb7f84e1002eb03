//! Registration of the transform tasks and the `build` composite.

use std::sync::Arc;

use ashlar_graph::{Step, TaskGraphBuilder};

use crate::config::PipelineConfig;
use crate::{
    CleanTask, FontsTask, HtmlTask, ImagesTask, LibsTask, PngSpriteTask, ScriptsTask,
    StylesTask, SvgCssTask, SvgSymbolTask,
};

/// Task names as they appear on the command line.
pub mod names {
    pub const CLEAN: &str = "clean";
    pub const HTML: &str = "html";
    pub const STYLES: &str = "styles";
    pub const SCRIPTS: &str = "scripts";
    pub const SCRIPTS_LIBS: &str = "scripts:libs";
    pub const IMAGES: &str = "images";
    pub const FONTS: &str = "fonts";
    pub const SPRITE_SVG_SYMBOL: &str = "sprite:svg-symbol";
    pub const SPRITE_SVG_CSS: &str = "sprite:svg-css";
    pub const SPRITE_PNG: &str = "sprite:png";
    pub const BUILD: &str = "build";
}

/// Clean, then the sprites (their fragments feed html and styles), then
/// every other transform.
pub fn build_step() -> Step {
    Step::series([
        Step::task(names::CLEAN),
        Step::parallel([
            names::SPRITE_SVG_SYMBOL,
            names::SPRITE_SVG_CSS,
            names::SPRITE_PNG,
        ]),
        Step::parallel([
            names::HTML,
            names::STYLES,
            names::SCRIPTS,
            names::SCRIPTS_LIBS,
            names::IMAGES,
            names::FONTS,
        ]),
    ])
}

/// Add every transform task and the `build` composite to `builder`.
pub fn register(builder: TaskGraphBuilder, config: &Arc<PipelineConfig>) -> TaskGraphBuilder {
    builder
        .task(CleanTask::new(Arc::clone(config)))
        .task(HtmlTask::new(Arc::clone(config)))
        .task(StylesTask::new(Arc::clone(config)))
        .task(ScriptsTask::new(Arc::clone(config)))
        .task(LibsTask::new(Arc::clone(config)))
        .task(ImagesTask::new(Arc::clone(config)))
        .task(FontsTask::new(Arc::clone(config)))
        .task(SvgSymbolTask::new(Arc::clone(config)))
        .task(SvgCssTask::new(Arc::clone(config)))
        .task(PngSpriteTask::new(Arc::clone(config)))
        .define(names::BUILD, build_step())
}
