//! Immutable task graph.
//!
//! Leaves are [`Task`] implementations; composites are [`Step`] trees that
//! refer to other entries by name. The graph is validated once when built
//! and never changes afterwards.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::traits::Task;

/// Ordering of work inside a composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A named entry of the graph (leaf or composite)
    Task(String),

    /// Steps that run strictly one after another
    Series(Vec<Step>),

    /// Steps that may run concurrently
    Parallel(Vec<Step>),
}

impl Step {
    /// Reference a named entry.
    pub fn task(name: impl Into<String>) -> Self {
        Self::Task(name.into())
    }

    /// Build a series from anything convertible into steps.
    pub fn series<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        Self::Series(steps.into_iter().map(Into::into).collect())
    }

    /// Build a parallel group from anything convertible into steps.
    pub fn parallel<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        Self::Parallel(steps.into_iter().map(Into::into).collect())
    }

    /// Names referenced anywhere inside this step.
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Step::Task(name) => names.push(name),
            Step::Series(steps) | Step::Parallel(steps) => {
                for step in steps {
                    step.collect_references(names);
                }
            }
        }
    }
}

impl From<&str> for Step {
    fn from(name: &str) -> Self {
        Step::task(name)
    }
}

impl From<String> for Step {
    fn from(name: String) -> Self {
        Step::Task(name)
    }
}

/// An entry of the graph.
#[derive(Clone)]
pub enum Node {
    /// A leaf unit of work
    Task(Arc<dyn Task>),

    /// A named arrangement of other entries
    Composite(Step),
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Task(task) => f.debug_tuple("Task").field(&task.name()).finish(),
            Node::Composite(step) => f.debug_tuple("Composite").field(step).finish(),
        }
    }
}

/// Errors found while validating a graph.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Task '{0}' is registered more than once")]
    Duplicate(String),

    #[error("Task '{name}' referenced by '{referenced_by}' is not defined")]
    Unknown { name: String, referenced_by: String },

    #[error("Task '{0}' depends on itself")]
    Cycle(String),
}

/// The set of all tasks and their ordering constraints.
#[derive(Debug)]
pub struct TaskGraph {
    nodes: BTreeMap<String, Node>,
}

impl TaskGraph {
    /// Start building a graph.
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::default()
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Check whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}

/// Collects entries and validates them into a [`TaskGraph`].
#[derive(Default)]
pub struct TaskGraphBuilder {
    entries: Vec<(String, Node)>,
}

impl TaskGraphBuilder {
    /// Register a leaf task under its own name.
    pub fn task(self, task: impl Task + 'static) -> Self {
        self.shared_task(Arc::new(task))
    }

    /// Register an already shared leaf task.
    pub fn shared_task(mut self, task: Arc<dyn Task>) -> Self {
        self.entries.push((task.name().to_string(), Node::Task(task)));
        self
    }

    /// Register a named composite.
    pub fn define(mut self, name: impl Into<String>, step: Step) -> Self {
        self.entries.push((name.into(), Node::Composite(step)));
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<TaskGraph, GraphError> {
        let mut nodes = BTreeMap::new();

        for (name, node) in self.entries {
            if nodes.contains_key(&name) {
                return Err(GraphError::Duplicate(name));
            }
            nodes.insert(name, node);
        }

        for (name, node) in &nodes {
            if let Node::Composite(step) = node {
                for reference in step.references() {
                    if !nodes.contains_key(reference) {
                        return Err(GraphError::Unknown {
                            name: reference.to_string(),
                            referenced_by: name.clone(),
                        });
                    }
                }
            }
        }

        {
            let mut states = HashMap::new();
            for name in nodes.keys() {
                visit(&nodes, name, &mut states)?;
            }
        }

        Ok(TaskGraph { nodes })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Depth-first walk over composites, failing on a back edge.
fn visit<'a>(
    nodes: &'a BTreeMap<String, Node>,
    name: &'a str,
    states: &mut HashMap<&'a str, Visit>,
) -> Result<(), GraphError> {
    match states.get(name) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => return Err(GraphError::Cycle(name.to_string())),
        None => {}
    }

    states.insert(name, Visit::InProgress);

    if let Some(Node::Composite(step)) = nodes.get(name) {
        for reference in step.references() {
            visit(nodes, reference, states)?;
        }
    }

    states.insert(name, Visit::Done);
    Ok(())
}
