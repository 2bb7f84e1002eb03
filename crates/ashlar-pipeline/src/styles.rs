//! Stylesheet compilation.
//!
//! SCSS is compiled with grass, then lightningcss adds vendor prefixes for
//! the supported browsers. The development profile keeps the output readable
//! and writes a source map next to it; production minifies and skips the map.
//!
//! grass does not emit source maps, so the development map points at the
//! CSS grass produced for the entry (`index.css`, embedded as
//! `sourcesContent`), not at the SCSS sources.

use std::path::Path;
use std::sync::Arc;

use ashlar_graph::{Task, TaskContext, TaskError, TaskReport};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;

use crate::config::{PipelineConfig, Profile};
use crate::files;

const ENTRY: &str = "assets/styles/index.scss";
const OUTPUT: &str = "css/styles.min.css";

/// Browser support used for prefixing.
const BROWSERS: &str = "last 5 versions";

/// A processed stylesheet and its optional source map.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCss {
    pub code: String,
    pub map: Option<String>,
}

/// Compile an SCSS entry file into plain CSS.
pub fn compile_scss(entry: &Path) -> Result<String, TaskError> {
    let options = grass::Options::default().style(grass::OutputStyle::Expanded);
    grass::from_path(entry, &options).map_err(|e| TaskError::malformed(entry, e))
}

fn targets() -> Result<Targets, TaskError> {
    let browsers = Browsers::from_browserslist([BROWSERS])
        .map_err(|e| TaskError::Config(format!("Browser query '{}': {}", BROWSERS, e)))?;

    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

/// Prefix the CSS and print it for `profile`.
///
/// `path` names the stylesheet in errors; `map_name` is the file the
/// development source map is written to.
pub fn process_css(
    path: &Path,
    css: &str,
    profile: Profile,
    map_name: &str,
) -> Result<CompiledCss, TaskError> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut stylesheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: filename.clone(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| TaskError::malformed(path, e))?;

    stylesheet
        .minify(MinifyOptions {
            targets: targets()?,
            ..MinifyOptions::default()
        })
        .map_err(|e| TaskError::malformed(path, e))?;

    let mut source_map = match profile {
        Profile::Development => {
            let mut map = SourceMap::new("/");
            map.add_source(&intermediate_name(path));
            map.set_source_content(0, css)
                .map_err(|e| TaskError::Config(format!("Source map: {}", e)))?;
            Some(map)
        }
        Profile::Production => None,
    };

    let printed = stylesheet
        .to_css(PrinterOptions {
            minify: profile.is_production(),
            source_map: source_map.as_mut(),
            targets: targets()?,
            ..PrinterOptions::default()
        })
        .map_err(|e| TaskError::malformed(path, e))?;

    let mut code = printed.code;
    let map = match source_map.as_mut() {
        Some(map) => {
            let json = map
                .to_json(None)
                .map_err(|e| TaskError::Config(format!("Source map: {}", e)))?;
            code.push_str(&format!("\n/*# sourceMappingURL={} */\n", map_name));
            Some(json)
        }
        None => None,
    };

    Ok(CompiledCss { code, map })
}

/// Name of the compiled CSS of `path` as listed in the source map.
fn intermediate_name(path: &Path) -> String {
    path.with_extension("css")
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Builds the single site stylesheet from the SCSS entry file.
pub struct StylesTask {
    config: Arc<PipelineConfig>,
}

impl StylesTask {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

impl Task for StylesTask {
    fn name(&self) -> &'static str {
        "styles"
    }

    fn title(&self) -> &'static str {
        "Styles"
    }

    fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        let entry = self.config.source_path(ENTRY);
        if !entry.is_file() {
            tracing::debug!("No stylesheet entry at {}", entry.display());
            return Ok(TaskReport::new());
        }

        let out = self.config.build_path(OUTPUT);
        let map_path = out.with_extension("css.map");
        let map_name = files::file_name(&map_path)?.to_string_lossy().into_owned();

        let css = compile_scss(&entry)?;
        let compiled = process_css(&entry, &css, self.config.profile, &map_name)?;

        let mut report = TaskReport::new();
        report.push(files::write(&out, &compiled.code)?);
        if let Some(map) = compiled.map {
            report.push(files::write(&map_path, map)?);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SCSS: &str = r#"
$accent: #ff0000;

.button {
  color: $accent;

  &:hover {
    user-select: none;
  }
}
"#;

    #[test]
    fn compiles_nested_scss() {
        let temp = tempdir().unwrap();
        let entry = temp.path().join("index.scss");
        fs::write(&entry, SCSS).unwrap();

        let css = compile_scss(&entry).unwrap();

        assert!(css.contains(".button:hover"));
        assert!(!css.contains("$accent"));
    }

    #[test]
    fn reports_scss_errors_with_file() {
        let temp = tempdir().unwrap();
        let entry = temp.path().join("index.scss");
        fs::write(&entry, ".button { color: $missing; }").unwrap();

        let err = compile_scss(&entry).unwrap_err();

        assert!(matches!(err, TaskError::Malformed { ref path, .. } if path == &entry));
    }

    #[test]
    fn development_keeps_source_map() {
        let css = ".button {\n  color: red;\n}\n";

        let compiled = process_css(
            Path::new("index.scss"),
            css,
            Profile::Development,
            "styles.min.css.map",
        )
        .unwrap();

        let map = compiled.map.expect("source map");
        assert!(map.contains("\"mappings\""));
        assert!(map.contains("\"index.css\""));
        assert!(!map.contains("index.scss"));
        assert!(compiled
            .code
            .contains("/*# sourceMappingURL=styles.min.css.map */"));
        assert!(compiled.code.contains('\n'));
    }

    #[test]
    fn production_minifies_without_map() {
        let css = ".button {\n  color: red;\n  margin: 0 0 0 0;\n}\n";

        let compiled = process_css(
            Path::new("index.scss"),
            css,
            Profile::Production,
            "styles.min.css.map",
        )
        .unwrap();

        assert!(compiled.map.is_none());
        assert!(!compiled.code.contains('\n'));
        assert!(!compiled.code.contains("sourceMappingURL"));
    }

    #[test]
    fn adds_vendor_prefixes() {
        let css = ".button { user-select: none; }";

        let compiled = process_css(
            Path::new("index.scss"),
            css,
            Profile::Production,
            "styles.min.css.map",
        )
        .unwrap();

        assert!(compiled.code.contains("-webkit-user-select"));
    }
}
