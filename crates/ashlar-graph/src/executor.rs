//! Async executor for the task graph.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use tokio::runtime::Handle;
use tokio::task::JoinSet;

use crate::graph::{Node, Step, TaskGraph};
use crate::traits::{Task, TaskContext, TaskError};

/// Errors that can occur while running tasks.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Task '{0}' is not defined")]
    UnknownTask(String),

    #[error("{title}: {source}")]
    Task {
        name: String,
        title: String,
        #[source]
        source: TaskError,
    },

    #[error("Task '{0}' panicked")]
    Panicked(String),

    #[error("{}", summarize(.0))]
    Group(Vec<RunError>),
}

impl RunError {
    /// Whether the error must end a watch session.
    pub fn is_fatal(&self) -> bool {
        match self {
            RunError::UnknownTask(_) => true,
            RunError::Task { source, .. } => source.is_fatal(),
            RunError::Panicked(_) => false,
            RunError::Group(errors) => errors.iter().any(RunError::is_fatal),
        }
    }

    /// Names of the leaf tasks that failed.
    pub fn failed_tasks(&self) -> Vec<&str> {
        match self {
            RunError::UnknownTask(name) | RunError::Panicked(name) => vec![name.as_str()],
            RunError::Task { name, .. } => vec![name.as_str()],
            RunError::Group(errors) => errors.iter().flat_map(RunError::failed_tasks).collect(),
        }
    }
}

fn summarize(errors: &[RunError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs named entries of a [`TaskGraph`].
///
/// Cloning is cheap; every clone shares the same graph.
#[derive(Clone)]
pub struct Executor {
    graph: Arc<TaskGraph>,
}

impl Executor {
    /// Create an executor over a validated graph.
    pub fn new(graph: TaskGraph) -> Self {
        Self {
            graph: Arc::new(graph),
        }
    }

    /// The graph being executed.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Run one named entry to completion.
    pub async fn run(&self, name: &str) -> Result<(), RunError> {
        self.clone().run_step(Step::task(name)).await
    }

    /// Run several named entries one after another.
    pub async fn run_series<S: AsRef<str>>(&self, names: &[S]) -> Result<(), RunError> {
        let step = Step::series(names.iter().map(|name| name.as_ref()));
        self.clone().run_step(step).await
    }

    fn run_step(self, step: Step) -> BoxFuture<'static, Result<(), RunError>> {
        async move {
            match step {
                Step::Task(name) => self.run_named(name).await,
                Step::Series(steps) => {
                    for step in steps {
                        self.clone().run_step(step).await?;
                    }
                    Ok(())
                }
                Step::Parallel(steps) => self.run_parallel(steps).await,
            }
        }
        .boxed()
    }

    async fn run_named(self, name: String) -> Result<(), RunError> {
        let graph = Arc::clone(&self.graph);

        match graph.get(&name) {
            Some(Node::Task(task)) => self.run_leaf(Arc::clone(task)).await,
            Some(Node::Composite(step)) => self.run_step(step.clone()).await,
            None => Err(RunError::UnknownTask(name)),
        }
    }

    /// Start every step, then wait for all of them. Siblings of a failed
    /// step are left to finish.
    async fn run_parallel(self, steps: Vec<Step>) -> Result<(), RunError> {
        let mut set = JoinSet::new();
        let mut labels = HashMap::new();
        for step in steps {
            let label = step.references().join(", ");
            let handle = set.spawn(self.clone().run_step(step));
            labels.insert(handle.id(), label);
        }

        let mut failures = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => failures.push(err),
                Err(err) => {
                    let label = labels.remove(&err.id()).unwrap_or_default();
                    tracing::error!(task = %label, "{}: {}", label, err);
                    failures.push(RunError::Panicked(label));
                }
            }
        }

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(RunError::Group(failures)),
        }
    }

    async fn run_leaf(self, task: Arc<dyn Task>) -> Result<(), RunError> {
        let name = task.name();
        let title = task.title();
        let ctx = TaskContext {
            executor: self,
            runtime: Handle::current(),
        };

        tracing::info!("Starting '{}'...", name);
        let started = Instant::now();

        match tokio::task::spawn_blocking(move || task.run(&ctx)).await {
            Ok(Ok(report)) => {
                tracing::info!(
                    "Finished '{}' after {} ms ({} files)",
                    name,
                    started.elapsed().as_millis(),
                    report.len()
                );
                Ok(())
            }
            Ok(Err(source)) => {
                tracing::error!(task = name, "{}: {}", title, source);
                Err(RunError::Task {
                    name: name.to_string(),
                    title: title.to_string(),
                    source,
                })
            }
            Err(err) => {
                tracing::error!(task = name, "{}: task panicked: {}", title, err);
                Err(RunError::Panicked(name.to_string()))
            }
        }
    }
}
