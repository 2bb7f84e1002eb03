//! Background-image SVG sprite with a generated stylesheet.

use std::sync::Arc;

use ashlar_graph::{Task, TaskContext, TaskError, TaskReport};
use serde::Serialize;

use super::{
    collect, number, offset, parse_svg, render_fragment, write_outputs, SvgShape, FRAGMENTS_DIR,
    SPRITES_OUT, SPRITES_URL,
};
use crate::config::PipelineConfig;
use crate::files;
use crate::optimize::minify_svg;

const SOURCE_DIR: &str = "assets/images/sprite-svg-css";
const SPRITE_NAME: &str = "sprite-css.svg";
const FRAGMENT_NAME: &str = "_sprite-svg-css.scss";
const TEMPLATE: &str = "sprite-svg-css";

const BUILTIN_TEMPLATE: &str = r#"// Generated by ashlar from {{ image }}. Do not edit.
{% for shape in shapes %}
.{{ shape.id }} {
  background: url("{{ image }}") no-repeat {{ shape.offset_x }} {{ shape.offset_y }};
  width: {{ shape.width }}px;
  height: {{ shape.height }}px;
}
{% endfor %}"#;

#[derive(Debug, Serialize)]
struct CssContext {
    image: String,
    width: String,
    height: String,
    shapes: Vec<CssEntry>,
}

#[derive(Debug, Serialize)]
struct CssEntry {
    id: String,
    x: String,
    y: String,
    offset_x: String,
    offset_y: String,
    width: String,
    height: String,
}

/// Stack the shapes vertically. Returns the sprite and each shape's
/// vertical offset, in input order.
pub fn stacked_sprite(shapes: &[SvgShape]) -> (String, Vec<f64>) {
    let width = shapes.iter().map(|s| s.width).fold(0.0, f64::max);
    let height: f64 = shapes.iter().map(|s| s.height).sum();

    let mut sprite = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = number(width),
        h = number(height),
    );

    let mut offsets = Vec::with_capacity(shapes.len());
    let mut y = 0.0;
    for shape in shapes {
        sprite.push_str(&format!(
            r#"<svg x="0" y="{}" width="{}" height="{}" viewBox="{}">{}</svg>"#,
            number(y),
            number(shape.width),
            number(shape.height),
            shape.view_box,
            shape.body
        ));
        offsets.push(y);
        y += shape.height;
    }

    sprite.push_str("</svg>");
    (sprite, offsets)
}

/// Builds the stacked SVG sprite and its SCSS partial.
pub struct SvgCssTask {
    config: Arc<PipelineConfig>,
}

impl SvgCssTask {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

impl Task for SvgCssTask {
    fn name(&self) -> &'static str {
        "sprite:svg-css"
    }

    fn title(&self) -> &'static str {
        "SVG CSS sprite"
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let sources = collect(&self.config.source_path(SOURCE_DIR), "svg")?;
        if sources.is_empty() {
            return Ok(TaskReport::new());
        }

        let shapes = sources
            .iter()
            .map(|source| {
                let svg = minify_svg(&files::read_to_string(&source.path)?);
                parse_svg(&source.id, &svg).map_err(|e| TaskError::malformed(&source.path, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (sprite, offsets) = stacked_sprite(&shapes);

        let ctx = CssContext {
            image: format!("{}/{}", SPRITES_URL, SPRITE_NAME),
            width: number(shapes.iter().map(|s| s.width).fold(0.0, f64::max)),
            height: number(shapes.iter().map(|s| s.height).sum()),
            shapes: shapes
                .iter()
                .zip(&offsets)
                .map(|(shape, &y)| CssEntry {
                    id: shape.id.clone(),
                    x: "0".to_string(),
                    y: number(y),
                    offset_x: "0".to_string(),
                    offset_y: offset(y),
                    width: number(shape.width),
                    height: number(shape.height),
                })
                .collect(),
        };

        let fragment = render_fragment(&self.config, TEMPLATE, BUILTIN_TEMPLATE, ctx)?;

        write_outputs(
            vec![(
                self.config.build_path(SPRITES_OUT).join(SPRITE_NAME),
                sprite.into_bytes(),
            )],
            (
                self.config.source_path(FRAGMENTS_DIR).join(FRAGMENT_NAME),
                fragment,
            ),
        )
    }
}
