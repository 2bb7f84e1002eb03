//! Task graph and executor for the ashlar asset pipeline.
//!
//! Tasks are registered once into an immutable [`TaskGraph`]. Named
//! composites describe ordering as series and parallel groups, and the
//! [`Executor`] walks them on the tokio runtime.

pub mod executor;
pub mod graph;
pub mod traits;

pub use executor::{Executor, RunError};
pub use graph::{GraphError, Node, Step, TaskGraph, TaskGraphBuilder};
pub use traits::{Task, TaskContext, TaskError, TaskReport};
