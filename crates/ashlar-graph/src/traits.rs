//! Trait definitions for build tasks.

use std::path::{Path, PathBuf};

use tokio::runtime::Handle;

use crate::executor::Executor;

/// Context handed to a task when it runs.
#[derive(Clone)]
pub struct TaskContext {
    /// Executor that is running the task, for tasks that schedule others
    pub executor: Executor,

    /// Handle to the runtime driving the executor
    pub runtime: Handle,
}

/// Files written by a single task run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskReport {
    /// Paths of the written files, in write order
    pub outputs: Vec<PathBuf>,
}

impl TaskReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a written file.
    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.outputs.push(path.into());
    }

    /// Merge another report into this one.
    pub fn extend(&mut self, other: TaskReport) {
        self.outputs.extend(other.outputs);
    }

    /// Number of written files.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether the run wrote nothing.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Errors a task can report.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Malformed source content, reported by a transformation
    #[error("{path}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// Filesystem failure while reading or writing
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A transformation was invoked with a configuration it rejects
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TaskError {
    /// Malformed content in `path`.
    pub fn malformed(path: &Path, message: impl ToString) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    /// I/O failure on `path`.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Configuration errors are programming errors and end any session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// A named unit of build work.
///
/// Implementations hold static configuration only. `run` is called on the
/// blocking pool, once per build or watch trigger.
pub trait Task: Send + Sync {
    /// Name used on the command line and in the graph (e.g. "scripts:libs")
    fn name(&self) -> &'static str;

    /// Display name used in error notifications (e.g. "HTML")
    fn title(&self) -> &'static str;

    /// Run the task to completion.
    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_errors_are_fatal() {
        let path = Path::new("app/html/index.html");

        assert!(!TaskError::malformed(path, "unexpected end of block").is_fatal());
        assert!(!TaskError::io(path, std::io::Error::other("denied")).is_fatal());
        assert!(TaskError::Config("bad browser query".to_string()).is_fatal());
    }

    #[test]
    fn malformed_error_names_the_file() {
        let err = TaskError::malformed(Path::new("app/html/index.html"), "syntax error");

        assert_eq!(err.to_string(), "app/html/index.html: syntax error");
    }

    #[test]
    fn report_merges_outputs() {
        let mut report = TaskReport::new();
        report.push("build/index.html");

        let mut other = TaskReport::new();
        other.push("build/about.html");
        report.extend(other);

        assert_eq!(report.len(), 2);
        assert!(!report.is_empty());
    }
}
