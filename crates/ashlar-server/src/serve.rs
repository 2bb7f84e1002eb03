//! The `serve` task: development server plus watch session.

use ashlar_graph::{Executor, Task, TaskContext, TaskError, TaskReport};

use crate::reload::ReloadHub;
use crate::server::{shutdown_signal, DevServer, ServerConfig, ServerError};
use crate::watcher::{WatchConfig, WatchSession};

/// Serves the build tree and re-runs bound tasks on source changes until
/// Ctrl-C or a fatal error.
pub struct ServeTask {
    server: ServerConfig,
    watch: WatchConfig,
}

impl ServeTask {
    pub fn new(server: ServerConfig, watch: WatchConfig) -> Self {
        Self { server, watch }
    }

    async fn serve(&self, executor: Executor) -> Result<(), ServerError> {
        let hub = ReloadHub::new();
        let server = DevServer::new(self.server.clone(), hub.clone());
        let listener = server.bind().await?;
        let session = WatchSession::start(self.watch.clone(), executor, hub)?;

        tokio::select! {
            res = server.serve(listener, shutdown_signal()) => res,
            res = session.run() => res,
        }
    }
}

impl Task for ServeTask {
    fn name(&self) -> &'static str {
        "serve"
    }

    fn title(&self) -> &'static str {
        "Serve"
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskReport, TaskError> {
        ctx.runtime
            .block_on(self.serve(ctx.executor.clone()))
            .map_err(|e| TaskError::Config(e.to_string()))?;

        Ok(TaskReport::new())
    }
}
