//! Task run command.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use ashlar_graph::{Executor, TaskGraph};

/// Run `tasks` one after another. Any failure ends the run with an error.
pub async fn run(graph: TaskGraph, tasks: &[String]) -> Result<()> {
    if let Some(unknown) = tasks.iter().find(|name| !graph.contains(name)) {
        bail!("Task '{}' is not defined (see --list)", unknown);
    }

    let executor = Executor::new(graph);
    let started = Instant::now();

    executor
        .run_series(tasks)
        .await
        .with_context(|| format!("Failed to run {}", tasks.join(", ")))?;

    tracing::info!(
        "Finished {} in {} ms",
        tasks.join(", "),
        started.elapsed().as_millis()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::graph::{assemble, ServerOverrides};
    use ashlar_pipeline::Profile;
    use std::fs;
    use tempfile::tempdir;

    fn graph(root: &std::path::Path, profile: Profile) -> TaskGraph {
        assemble(&ConfigFile::default(), root, profile, ServerOverrides::default()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_tasks_in_order() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("app/assets/scripts/libs")).unwrap();
        fs::write(root.join("app/assets/scripts/libs/jquery.min.js"), "var $;").unwrap();
        fs::create_dir_all(root.join("build")).unwrap();
        fs::write(root.join("build/old.js"), "stale").unwrap();

        let tasks = vec!["clean".to_string(), "scripts:libs".to_string()];
        run(graph(root, Profile::Production), &tasks).await.unwrap();

        assert!(!root.join("build/old.js").exists());
        assert_eq!(
            fs::read_to_string(root.join("build/js/libs.min.js")).unwrap(),
            "var $;"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_task_fails_before_running() {
        let temp = tempdir().unwrap();

        let err = run(graph(temp.path(), Profile::Development), &["deploy".to_string()])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("'deploy' is not defined"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn task_failure_is_an_error() {
        let temp = tempdir().unwrap();
        let scripts = temp.path().join("app/assets/scripts");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(scripts.join("main.js"), "function (").unwrap();

        let err = run(graph(temp.path(), Profile::Development), &["scripts".to_string()])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to run scripts"));
        assert!(format!("{:#}", err).contains("main.js"));
    }
}
