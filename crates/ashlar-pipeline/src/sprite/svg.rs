//! SVG root parsing for the vector sprites.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One optimized SVG image, split into its root geometry and its body.
#[derive(Debug, Clone, PartialEq)]
pub struct SvgShape {
    pub id: String,
    pub width: f64,
    pub height: f64,
    pub view_box: String,
    /// Markup between the root `<svg>` tags
    pub body: String,
}

/// Parse the root element of `svg`.
///
/// Width and height come from the root attributes, falling back to the
/// `viewBox`; a missing `viewBox` is derived from the size.
pub fn parse_svg(id: &str, svg: &str) -> Result<SvgShape, String> {
    let mut reader = Reader::from_str(svg);

    loop {
        match reader.read_event() {
            Ok(Event::Start(root)) if root.name().as_ref() == b"svg" => {
                let (width, height, view_box) = geometry(&root)?;
                let start = reader.buffer_position();
                let end = svg
                    .rfind("</svg>")
                    .filter(|&end| end >= start)
                    .ok_or_else(|| "missing closing </svg>".to_string())?;

                return Ok(SvgShape {
                    id: id.to_string(),
                    width,
                    height,
                    view_box,
                    body: svg[start..end].trim().to_string(),
                });
            }
            Ok(Event::Empty(root)) if root.name().as_ref() == b"svg" => {
                let (width, height, view_box) = geometry(&root)?;
                return Ok(SvgShape {
                    id: id.to_string(),
                    width,
                    height,
                    view_box,
                    body: String::new(),
                });
            }
            Ok(Event::Start(other)) | Ok(Event::Empty(other)) => {
                return Err(format!(
                    "expected <svg> root, found <{}>",
                    String::from_utf8_lossy(other.name().as_ref())
                ));
            }
            Ok(Event::Eof) => return Err("no <svg> root element".to_string()),
            Ok(_) => continue,
            Err(e) => {
                return Err(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
    }
}

fn geometry(root: &BytesStart<'_>) -> Result<(f64, f64, String), String> {
    let mut width = None;
    let mut height = None;
    let mut view_box = None;

    for attr in root.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        match attr.key.as_ref() {
            b"width" => width = length(&value),
            b"height" => height = length(&value),
            b"viewBox" => view_box = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let box_size = view_box.as_deref().and_then(|vb| {
        let parts: Vec<f64> = vb
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .filter_map(|part| part.parse().ok())
            .collect();
        match parts.as_slice() {
            [_, _, w, h] => Some((*w, *h)),
            _ => None,
        }
    });

    let (width, height) = match (width, height, box_size) {
        (Some(w), Some(h), _) => (w, h),
        (w, h, Some((bw, bh))) => (w.unwrap_or(bw), h.unwrap_or(bh)),
        _ => return Err("SVG has neither width/height nor a viewBox".to_string()),
    };

    let view_box = view_box.unwrap_or_else(|| {
        format!("0 0 {} {}", super::number(width), super::number(height))
    });

    Ok((width, height, view_box))
}

/// Leading number of a length attribute (`24`, `24px`, `1.5em`).
fn length(value: &str) -> Option<f64> {
    let value = value.trim();
    let end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_size_and_body() {
        let shape = parse_svg(
            "arrow",
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="24px" height="16" viewBox="0 0 12 8"><path d="M0 0"/></svg>"#,
        )
        .unwrap();

        assert_eq!(shape.width, 24.0);
        assert_eq!(shape.height, 16.0);
        assert_eq!(shape.view_box, "0 0 12 8");
        assert_eq!(shape.body, r#"<path d="M0 0"/>"#);
    }

    #[test]
    fn falls_back_to_view_box() {
        let shape = parse_svg("dot", r#"<svg viewBox="0,0,10,20"><circle r="5"/></svg>"#).unwrap();

        assert_eq!((shape.width, shape.height), (10.0, 20.0));
    }

    #[test]
    fn derives_view_box_from_size() {
        let shape = parse_svg("dot", r#"<svg width="8" height="8"/>"#).unwrap();

        assert_eq!(shape.view_box, "0 0 8 8");
        assert_eq!(shape.body, "");
    }

    #[test]
    fn rejects_missing_size() {
        let err = parse_svg("dot", "<svg><circle r=\"5\"/></svg>").unwrap_err();

        assert!(err.contains("viewBox"));
    }

    #[test]
    fn rejects_non_svg_root() {
        let err = parse_svg("page", "<html></html>").unwrap_err();

        assert!(err.contains("<html>"));
    }
}
