//! Sprite generation.
//!
//! Each generator reads a directory of same-format images and produces two
//! correlated outputs: the combined asset in the build tree and a fragment
//! (stylesheet or markup) in the source tree that maps every identifier to
//! its place in the asset. Fragments are rendered from built-in templates
//! unless the project ships its own under `assets/styles/sprites/templates`.

mod css;
mod png;
mod svg;
mod symbol;

use std::path::{Path, PathBuf};

use ashlar_graph::{TaskError, TaskReport};
use minijinja::Environment;
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::PipelineConfig;
use crate::files;

pub use css::SvgCssTask;
pub use png::{pack, Layout, PngSpriteTask, Placement};
pub use svg::{parse_svg, SvgShape};
pub use symbol::SvgSymbolTask;

/// Build directory of the combined assets.
const SPRITES_OUT: &str = "img/sprites";

/// Source directory the fragments are written to.
const FRAGMENTS_DIR: &str = "assets/styles/sprites";

/// URL of the sprite directory as seen from the built stylesheet.
const SPRITES_URL: &str = "../img/sprites";

/// Marks the double-resolution variant of a raster sprite image.
const RETINA_SUFFIX: &str = "@2x";

/// An input image of a sprite.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteSource {
    /// Identifier derived from the path under the sprite directory
    pub id: String,
    pub path: PathBuf,
}

/// Identifier of a sprite image: its path under the sprite directory
/// without the extension, with separators replaced by `-`.
pub fn identifier(relative: &Path) -> String {
    relative
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("-")
}

/// Whether `id` can be used verbatim as an SVG `id` and a CSS class name:
/// ASCII letters, digits, `-` and `_`, with an optional retina suffix.
pub fn is_valid_identifier(id: &str) -> bool {
    let base = id.strip_suffix(RETINA_SUFFIX).unwrap_or(id);
    !base.is_empty()
        && !base.starts_with(|c: char| c.is_ascii_digit())
        && base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Every file with extension `ext` under `dir`, sorted by path.
pub fn collect(dir: &Path, ext: &str) -> Result<Vec<SpriteSource>, TaskError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut sources = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            TaskError::io(&path, e.into())
        })?;

        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if !entry.file_type().is_file() || !matches {
            continue;
        }

        let relative = path.strip_prefix(dir).unwrap_or(path);
        let id = identifier(relative);
        if !is_valid_identifier(&id) {
            return Err(TaskError::malformed(
                path,
                format!(
                    "sprite identifier '{}' may only contain letters, digits, '-' and '_'",
                    id
                ),
            ));
        }

        sources.push(SpriteSource {
            id,
            path: path.to_path_buf(),
        });
    }

    Ok(sources)
}

/// Render a fragment from the project template `<kind>.template`, falling
/// back to the built-in one.
fn render_fragment(
    config: &PipelineConfig,
    kind: &str,
    builtin: &str,
    ctx: impl Serialize,
) -> Result<String, TaskError> {
    let custom = config
        .source_path(FRAGMENTS_DIR)
        .join("templates")
        .join(format!("{}.template", kind));

    let (origin, source) = if custom.is_file() {
        let source = files::read_to_string(&custom)?;
        (custom, source)
    } else {
        (PathBuf::from(kind), builtin.to_string())
    };

    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.add_template_owned(kind.to_string(), source)
        .map_err(|e| TaskError::malformed(&origin, e))?;

    env.get_template(kind)
        .and_then(|tmpl| tmpl.render(ctx))
        .map_err(|e| TaskError::malformed(&origin, e))
}

/// Write the combined assets and the fragment concurrently.
fn write_outputs(
    assets: Vec<(PathBuf, Vec<u8>)>,
    fragment: (PathBuf, String),
) -> Result<TaskReport, TaskError> {
    let (assets, fragment) = rayon::join(
        || {
            assets
                .iter()
                .map(|(path, bytes)| files::write(path, bytes))
                .collect::<Result<Vec<_>, _>>()
        },
        || files::write(&fragment.0, &fragment.1),
    );

    let mut report = TaskReport::new();
    for path in assets? {
        report.push(path);
    }
    report.push(fragment?);
    Ok(report)
}

/// Format a length without a trailing `.0`.
fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.3}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// CSS offset for a background position: `0` or `-<n>px`.
fn offset(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        format!("-{}px", number(value))
    }
}
