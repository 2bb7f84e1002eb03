//! Lossless image optimization.
//!
//! PNG is re-encoded and SVG markup is cleaned. JPEG and GIF are copied
//! byte-for-byte: re-encoding JPEG through `image` is lossy.

use std::path::Path;
use std::sync::LazyLock;

use ashlar_graph::TaskError;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};
use regex::Regex;

static XML_PROLOG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<\?xml[^>]*\?>").unwrap());
static DOCTYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<!DOCTYPE[^>]*>").unwrap());
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static METADATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<metadata\b.*?</metadata>").unwrap());
static BETWEEN_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").unwrap());

/// Optimize an image by file extension. Unknown formats pass through.
pub fn optimize(path: &Path, bytes: Vec<u8>) -> Result<Vec<u8>, TaskError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "png" => optimize_png(path, bytes),
        "svg" => {
            let text = String::from_utf8(bytes)
                .map_err(|e| TaskError::malformed(path, format!("SVG is not UTF-8: {}", e)))?;
            Ok(minify_svg(&text).into_bytes())
        }
        _ => Ok(bytes),
    }
}

/// Re-encode a PNG with the strongest lossless settings, keeping whichever
/// of the two encodings is smaller.
pub fn optimize_png(path: &Path, bytes: Vec<u8>) -> Result<Vec<u8>, TaskError> {
    let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|e| TaskError::malformed(path, e))?;

    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive)
        .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())
        .map_err(|e| TaskError::malformed(path, e))?;

    Ok(if out.len() < bytes.len() { out } else { bytes })
}

/// Encode an RGBA buffer as a compressed PNG.
pub fn encode_png(path: &Path, img: &RgbaImage) -> Result<Vec<u8>, TaskError> {
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
        .map_err(|e| TaskError::malformed(path, e))?;
    Ok(out)
}

/// Drop the XML prolog, doctype, comments, metadata and whitespace between
/// tags. Geometry and the `viewBox` are untouched.
pub fn minify_svg(svg: &str) -> String {
    let svg = XML_PROLOG.replace_all(svg, "");
    let svg = DOCTYPE.replace_all(&svg, "");
    let svg = COMMENT.replace_all(&svg, "");
    let svg = METADATA.replace_all(&svg, "");
    let svg = BETWEEN_TAGS.replace_all(&svg, "><");
    svg.trim().to_string()
}
