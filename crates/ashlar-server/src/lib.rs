//! Development server with live reload for the ashlar pipeline.
//!
//! Serves the build tree, watches the source tree and re-runs the tasks
//! bound to each changed path, then tells connected browsers to reload.

pub mod reload;
pub mod serve;
pub mod server;
pub mod watcher;

pub use reload::{ReloadHub, ReloadMessage};
pub use serve::ServeTask;
pub use server::{DevServer, ServerConfig, ServerError};
pub use watcher::{
    default_bindings, BindingSet, WatchBinding, WatchConfig, WatchSession, DEBOUNCE,
};
