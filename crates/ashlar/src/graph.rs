//! Assembly of the full task graph.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ashlar_graph::{Step, TaskGraph};
use ashlar_pipeline::{names, PipelineConfig, Profile};
use ashlar_server::{default_bindings, ServeTask, ServerConfig, WatchConfig, DEBOUNCE};

use crate::config::ConfigFile;

/// Name of the development server task.
pub const SERVE: &str = "serve";

/// Name of the task run when none is given.
pub const DEFAULT: &str = "default";

/// Command-line overrides of the server settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOverrides {
    pub port: Option<u16>,
    pub no_open: bool,
}

/// Every transform task, `build`, `serve` and `default`.
pub fn assemble(
    file: &ConfigFile,
    root: &Path,
    profile: Profile,
    overrides: ServerOverrides,
) -> Result<TaskGraph> {
    let pipeline = Arc::new(PipelineConfig {
        root: root.to_path_buf(),
        source_dir: file.paths.source.clone().into(),
        build_dir: file.paths.build.clone().into(),
        profile,
    });

    let server = ServerConfig {
        root: pipeline.build(),
        host: file.server.host.clone(),
        port: overrides.port.unwrap_or(file.server.port),
        open: file.server.open && !overrides.no_open,
    };

    let watch = WatchConfig {
        root: root.to_path_buf(),
        watch_dir: pipeline.source(),
        bindings: file
            .watch
            .clone()
            .unwrap_or_else(|| default_bindings(&file.paths.source)),
        debounce: DEBOUNCE,
    };

    ashlar_pipeline::register(TaskGraph::builder(), &pipeline)
        .task(ServeTask::new(server, watch))
        .define(DEFAULT, Step::series([names::BUILD, SERVE]))
        .build()
        .context("Invalid task graph")
}
