//! Inline `<symbol>` SVG sprite.

use std::sync::Arc;

use ashlar_graph::{Task, TaskContext, TaskError, TaskReport};
use serde::Serialize;

use super::{
    collect, parse_svg, render_fragment, write_outputs, SvgShape, FRAGMENTS_DIR, SPRITES_OUT,
};
use crate::config::PipelineConfig;
use crate::files;
use crate::optimize::minify_svg;

const SOURCE_DIR: &str = "assets/images/sprite-svg-symbol";
const SPRITE_NAME: &str = "sprite-symbol.svg";
const FRAGMENT_NAME: &str = "sprite-svg-symbol.html";
const TEMPLATE: &str = "sprite-svg-symbol";

/// The inline sprite itself, ready to be pasted into a page.
const BUILTIN_TEMPLATE: &str = "{{ sprite }}\n";

#[derive(Serialize)]
struct SymbolContext<'a> {
    sprite: &'a str,
    shapes: Vec<SymbolEntry<'a>>,
}

#[derive(Serialize)]
struct SymbolEntry<'a> {
    id: &'a str,
    width: f64,
    height: f64,
    view_box: &'a str,
}

/// Wrap every shape in a `<symbol>` of one hidden root.
pub fn symbol_sprite(shapes: &[SvgShape]) -> String {
    let mut sprite = String::from(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" style="position:absolute;width:0;height:0;overflow:hidden" aria-hidden="true">"#,
    );

    for shape in shapes {
        sprite.push_str(&format!(
            r#"<symbol id="{}" viewBox="{}">{}</symbol>"#,
            shape.id, shape.view_box, shape.body
        ));
    }

    sprite.push_str("</svg>");
    sprite
}

/// Builds the `<symbol>` sprite and the markup fragment that inlines it.
pub struct SvgSymbolTask {
    config: Arc<PipelineConfig>,
}

impl SvgSymbolTask {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

impl Task for SvgSymbolTask {
    fn name(&self) -> &'static str {
        "sprite:svg-symbol"
    }

    fn title(&self) -> &'static str {
        "SVG symbol sprite"
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

        let sprite = symbol_sprite(&shapes);
        let fragment = render_fragment(
            &self.config,
            TEMPLATE,
            BUILTIN_TEMPLATE,
            SymbolContext {
                sprite: &sprite,
                shapes: shapes
                    .iter()
                    .map(|shape| SymbolEntry {
                        id: &shape.id,
                        width: shape.width,
                        height: shape.height,
                        view_box: &shape.view_box,
                    })
                    .collect(),
            },
        )?;

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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wraps_shapes_in_symbols() {
        let shapes = vec![
            parse_svg("arrow", r#"<svg viewBox="0 0 8 8"><path d="M0 0"/></svg>"#).unwrap(),
            parse_svg("close", r#"<svg viewBox="0 0 4 4"><circle r="2"/></svg>"#).unwrap(),
        ];

        let sprite = symbol_sprite(&shapes);

        assert!(sprite.starts_with("<svg "));
        assert!(!sprite.contains("<?xml"));
        assert!(sprite.contains(r#"<symbol id="arrow" viewBox="0 0 8 8"><path d="M0 0"/></symbol>"#));
        assert!(sprite.contains(r#"<symbol id="close" viewBox="0 0 4 4"><circle r="2"/></symbol>"#));
        assert_eq!(sprite.matches("<symbol").count(), 2);
    }
}
