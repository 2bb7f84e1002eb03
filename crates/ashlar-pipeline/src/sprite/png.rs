//! Raster sprite sheet with an optional retina sheet.
//!
//! Images are packed with a shelf packer: tallest first, left to right,
//! opening a new shelf when the row is full. `name@2x.png` files form the
//! retina sheet, laid out exactly like the base sheet at twice the scale.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use ashlar_graph::{Task, TaskContext, TaskError, TaskReport};
use image::{imageops, RgbaImage};
use serde::Serialize;

use super::{
    collect, offset, render_fragment, write_outputs, SpriteSource, FRAGMENTS_DIR, RETINA_SUFFIX,
    SPRITES_OUT, SPRITES_URL,
};
use crate::config::PipelineConfig;
use crate::optimize::encode_png;

const SOURCE_DIR: &str = "assets/images/sprite-png";
const SPRITE_NAME: &str = "sprite.png";
const RETINA_NAME: &str = "sprite@2x.png";
const FRAGMENT_NAME: &str = "_sprite-png.scss";
const TEMPLATE: &str = "sprite-png";

const BUILTIN_TEMPLATE: &str = r#"// Generated by ashlar from {{ image }}. Do not edit.
{% for sprite in sprites %}
.sprite-{{ sprite.id }} {
  background-image: url("{{ image }}");
  background-position: {{ sprite.offset_x }} {{ sprite.offset_y }};
  width: {{ sprite.width }}px;
  height: {{ sprite.height }}px;
}
{% endfor %}
{% if retina_image %}
@media (-webkit-min-device-pixel-ratio: 2), (min-resolution: 192dpi) {
{% for sprite in sprites %}
  .sprite-{{ sprite.id }} {
    background-image: url("{{ retina_image }}");
    background-size: {{ width }}px {{ height }}px;
  }
{% endfor %}
}
{% endif %}"#;

/// Position of one image inside the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub id: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A packed sheet; placements are sorted by identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub placements: Vec<Placement>,
}

/// Pack `(id, width, height)` boxes onto shelves.
///
/// The row width is the larger of the widest box and the side of a square
/// holding the total area, which keeps the sheet roughly square.
pub fn pack(boxes: &[(String, u32, u32)]) -> Layout {
    if boxes.is_empty() {
        return Layout {
            width: 0,
            height: 0,
            placements: Vec::new(),
        };
    }

    let area: u64 = boxes.iter().map(|(_, w, h)| *w as u64 * *h as u64).sum();
    let widest = boxes.iter().map(|(_, w, _)| *w).max().unwrap_or(0);
    let row_width = widest.max((area as f64).sqrt().ceil() as u32);

    let mut sorted: Vec<&(String, u32, u32)> = boxes.iter().collect();
    sorted.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

    let mut placements = Vec::with_capacity(boxes.len());
    let (mut x, mut y, mut shelf_height, mut width) = (0u32, 0u32, 0u32, 0u32);

    for (id, w, h) in sorted {
        if x > 0 && x + w > row_width {
            y += shelf_height;
            x = 0;
            shelf_height = 0;
        }

        placements.push(Placement {
            id: id.clone(),
            x,
            y,
            width: *w,
            height: *h,
        });

        x += w;
        width = width.max(x);
        shelf_height = shelf_height.max(*h);
    }

    placements.sort_by(|a, b| a.id.cmp(&b.id));

    Layout {
        width,
        height: y + shelf_height,
        placements,
    }
}

/// A base image and its optional high-density counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct SpritePair {
    pub id: String,
    pub base: SpriteSource,
    pub retina: Option<SpriteSource>,
}

/// Group `name.png` with `name@2x.png` under the identifier `name`.
///
/// A retina image without its base is an error, and once any retina image
/// exists every base image needs one.
pub fn pair_sources(sources: Vec<SpriteSource>) -> Result<Vec<SpritePair>, TaskError> {
    let mut bases = BTreeMap::new();
    let mut retinas = BTreeMap::new();

    for source in sources {
        match source.id.strip_suffix(RETINA_SUFFIX) {
            Some(id) => retinas.insert(id.to_string(), source),
            None => bases.insert(source.id.clone(), source),
        };
    }

    if let Some((id, orphan)) = retinas.iter().find(|(id, _)| !bases.contains_key(*id)) {
        return Err(TaskError::malformed(
            &orphan.path,
            format!("retina image has no base image '{}'", id),
        ));
    }

    if !retinas.is_empty() {
        if let Some((id, base)) = bases.iter().find(|(id, _)| !retinas.contains_key(*id)) {
            return Err(TaskError::malformed(
                &base.path,
                format!("missing retina image '{}{}'", id, RETINA_SUFFIX),
            ));
        }
    }

    Ok(bases
        .into_iter()
        .map(|(id, base)| {
            let retina = retinas.remove(&id);
            SpritePair { id, base, retina }
        })
        .collect())
}

fn load(path: &Path) -> Result<RgbaImage, TaskError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| TaskError::malformed(path, e))
}

#[derive(Serialize)]
struct PngContext<'a> {
    image: String,
    retina_image: Option<String>,
    width: u32,
    height: u32,
    sprites: Vec<PngEntry<'a>>,
}

#[derive(Serialize)]
struct PngEntry<'a> {
    id: &'a str,
    x: u32,
    y: u32,
    offset_x: String,
    offset_y: String,
    width: u32,
    height: u32,
    source: String,
    retina_source: Option<String>,
}

/// Builds the PNG sprite sheets and their SCSS partial.
pub struct PngSpriteTask {
    config: Arc<PipelineConfig>,
}

impl PngSpriteTask {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

impl Task for PngSpriteTask {
    fn name(&self) -> &'static str {
        "sprite:png"
    }

    fn title(&self) -> &'static str {
        "PNG sprite"
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let sources = collect(&self.config.source_path(SOURCE_DIR), "png")?;
        if sources.is_empty() {
            return Ok(TaskReport::new());
        }

        let pairs = pair_sources(sources)?;
        let bases = pairs
            .iter()
            .map(|pair| load(&pair.base.path))
            .collect::<Result<Vec<_>, _>>()?;

        let boxes: Vec<(String, u32, u32)> = pairs
            .iter()
            .zip(&bases)
            .map(|(pair, img)| (pair.id.clone(), img.width(), img.height()))
            .collect();
        let layout = pack(&boxes);

        let sheet_path = self.config.build_path(SPRITES_OUT).join(SPRITE_NAME);
        let mut sheet = RgbaImage::new(layout.width, layout.height);
        for (placement, img) in layout.placements.iter().zip(&bases) {
            imageops::replace(&mut sheet, img, placement.x as i64, placement.y as i64);
        }
        let mut assets = vec![(sheet_path.clone(), encode_png(&sheet_path, &sheet)?)];

        let has_retina = pairs.iter().any(|pair| pair.retina.is_some());
        if has_retina {
            let retina_path = self.config.build_path(SPRITES_OUT).join(RETINA_NAME);
            let mut retina_sheet = RgbaImage::new(layout.width * 2, layout.height * 2);

            for (pair, placement) in pairs.iter().zip(&layout.placements) {
                let Some(retina) = &pair.retina else {
                    continue;
                };
                let img = load(&retina.path)?;
                if img.dimensions() != (placement.width * 2, placement.height * 2) {
                    return Err(TaskError::malformed(
                        &retina.path,
                        format!(
                            "retina image is {}x{}, expected {}x{}",
                            img.width(),
                            img.height(),
                            placement.width * 2,
                            placement.height * 2
                        ),
                    ));
                }
                imageops::replace(
                    &mut retina_sheet,
                    &img,
                    placement.x as i64 * 2,
                    placement.y as i64 * 2,
                );
            }

            assets.push((retina_path.clone(), encode_png(&retina_path, &retina_sheet)?));
        }

        let ctx = PngContext {
            image: format!("{}/{}", SPRITES_URL, SPRITE_NAME),
            retina_image: has_retina.then(|| format!("{}/{}", SPRITES_URL, RETINA_NAME)),
            width: layout.width,
            height: layout.height,
            sprites: pairs
                .iter()
                .zip(&layout.placements)
                .map(|(pair, placement)| PngEntry {
                    id: &pair.id,
                    x: placement.x,
                    y: placement.y,
                    offset_x: offset(placement.x as f64),
                    offset_y: offset(placement.y as f64),
                    width: placement.width,
                    height: placement.height,
                    source: file_name(&pair.base),
                    retina_source: pair.retina.as_ref().map(file_name),
                })
                .collect(),
        };

        let fragment = render_fragment(&self.config, TEMPLATE, BUILTIN_TEMPLATE, ctx)?;

        write_outputs(
            assets,
            (
                self.config.source_path(FRAGMENTS_DIR).join(FRAGMENT_NAME),
                fragment,
            ),
        )
    }
}

fn file_name(source: &SpriteSource) -> String {
    source
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
