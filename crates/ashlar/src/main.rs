//! Ashlar CLI - static asset build pipeline with a live-reload dev server.

use std::path::PathBuf;

use anyhow::Result;
use ashlar_pipeline::Profile;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;
mod graph;

use graph::ServerOverrides;

#[derive(Parser)]
#[command(name = "ashlar")]
#[command(about = "Static asset build pipeline with a live-reload dev server")]
#[command(version)]
pub struct Cli {
    /// Tasks to run in series
    #[arg(value_name = "TASK", default_value = graph::DEFAULT)]
    tasks: Vec<String>,

    /// Path to ashlar.toml config file
    #[arg(short, long, default_value = "ashlar.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print the registered tasks and exit
    #[arg(short, long)]
    list: bool,

    /// Port for the dev server
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not open browser
    #[arg(long)]
    no_open: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let file = config::load_config(&cli.config)?;
    let profile = Profile::from_env();
    tracing::debug!("Profile: {:?}", profile);

    let graph = graph::assemble(
        &file,
        &config::project_root(&cli.config),
        profile,
        ServerOverrides {
            port: cli.port,
            no_open: cli.no_open,
        },
    )?;

    if cli.list {
        commands::list::run(&graph);
        return Ok(());
    }

    commands::run::run(graph, &cli.tasks).await
}
