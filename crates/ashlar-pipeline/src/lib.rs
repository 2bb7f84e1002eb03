//! Asset transform tasks for the ashlar build pipeline.
//!
//! Every task reads a glob-selected file set under the source root, runs it
//! through one or more transformations and writes the results under the
//! build root. [`register`] adds all of them, plus the `build` composite, to
//! a task graph.

pub mod clean;
pub mod config;
pub mod files;
pub mod fonts;
pub mod html;
pub mod images;
pub mod optimize;
pub mod pipeline;
pub mod scripts;
pub mod sprite;
pub mod styles;

pub use clean::CleanTask;
pub use config::{PipelineConfig, Profile};
pub use fonts::FontsTask;
pub use html::HtmlTask;
pub use images::ImagesTask;
pub use pipeline::{build_step, names, register};
pub use scripts::{LibsTask, ScriptsTask};
pub use sprite::{PngSpriteTask, SvgCssTask, SvgSymbolTask};
pub use styles::StylesTask;
