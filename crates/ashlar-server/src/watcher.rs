//! File watching and the per-binding rebuild workers.
//!
//! Every binding owns one worker with a single-slot queue. A change that
//! arrives while the worker is idle starts a run; a change that arrives
//! while a run is in progress leaves one pending request; further changes
//! fold into that request. Runs of one binding therefore never overlap.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use glob::{MatchOptions, Pattern};
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use ashlar_graph::{Executor, RunError};

use crate::reload::ReloadHub;
use crate::server::ServerError;

/// Quiet period before a burst of file events is delivered.
pub const DEBOUNCE: Duration = Duration::from_millis(250);

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Re-run `tasks` when a file matching `pattern` changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchBinding {
    /// Glob relative to the project root; `*` does not cross `/`
    pub pattern: String,

    /// Tasks run in series on a change
    pub tasks: Vec<String>,

    /// Reload connected browsers after a successful run
    #[serde(default = "default_reload")]
    pub reload: bool,
}

fn default_reload() -> bool {
    true
}

impl WatchBinding {
    pub fn new(pattern: impl Into<String>, tasks: &[&str]) -> Self {
        Self {
            pattern: pattern.into(),
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
            reload: true,
        }
    }
}

/// The stock bindings for a source tree at `source` (relative to the root).
pub fn default_bindings(source: &str) -> Vec<WatchBinding> {
    let source = Pattern::escape(&relative_prefix(Path::new(source)));
    let at = |pattern: &str| {
        if source.is_empty() {
            pattern.to_string()
        } else {
            format!("{}/{}", source, pattern)
        }
    };

    vec![
        WatchBinding::new(at("**/*.html"), &["html"]),
        WatchBinding::new(at("**/*.scss"), &["styles"]),
        WatchBinding::new(at("assets/scripts/*.js"), &["scripts"]),
        WatchBinding::new(at("assets/scripts/libs/*.js"), &["scripts:libs"]),
        WatchBinding::new(at("assets/images/sprite-svg-symbol/*.svg"), &["sprite:svg-symbol"]),
        WatchBinding::new(at("assets/images/sprite-svg-css/*.svg"), &["sprite:svg-css"]),
        WatchBinding::new(at("assets/images/sprite-png/*.png"), &["sprite:png"]),
        WatchBinding::new(at("assets/images/*.*"), &["images"]),
        WatchBinding::new(at("assets/fonts/**/*.*"), &["fonts"]),
    ]
}

/// `source` in the form changed paths take once the root is stripped:
/// `.` segments and trailing separators removed, `/` between segments.
fn relative_prefix(source: &Path) -> String {
    source
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Compiled bindings, matched against root-relative paths.
#[derive(Debug, Clone)]
pub struct BindingSet {
    bindings: Vec<(Pattern, WatchBinding)>,
}

impl BindingSet {
    pub fn compile(bindings: Vec<WatchBinding>) -> Result<Self, ServerError> {
        let bindings = bindings
            .into_iter()
            .map(|binding| {
                let pattern =
                    Pattern::new(&binding.pattern).map_err(|e| ServerError::Pattern {
                        pattern: binding.pattern.clone(),
                        message: e.to_string(),
                    })?;
                Ok((pattern, binding))
            })
            .collect::<Result<Vec<_>, ServerError>>()?;

        Ok(Self { bindings })
    }

    /// Indices of the bindings whose pattern matches `relative`.
    pub fn matching(&self, relative: &Path) -> Vec<usize> {
        self.bindings
            .iter()
            .enumerate()
            .filter(|(_, (pattern, _))| pattern.matches_path_with(relative, MATCH_OPTIONS))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn bindings(&self) -> impl Iterator<Item = &WatchBinding> {
        self.bindings.iter().map(|(_, binding)| binding)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Request side of a binding worker.
#[derive(Debug, Clone)]
struct Trigger {
    tx: mpsc::Sender<()>,
}

impl Trigger {
    /// Queue a run. Returns false when the request folded into a pending one.
    fn fire(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Closed(())) => false,
        }
    }
}

/// Run the binding's tasks once per queued request until the queue closes
/// or a run fails fatally.
async fn worker(
    binding: WatchBinding,
    executor: Executor,
    hub: ReloadHub,
    mut requests: mpsc::Receiver<()>,
    fatal: mpsc::Sender<RunError>,
) {
    while requests.recv().await.is_some() {
        tracing::debug!("Change matched '{}'", binding.pattern);

        match executor.run_series(&binding.tasks).await {
            Ok(()) => {
                if binding.reload {
                    hub.reload();
                }
            }
            Err(err) if err.is_fatal() => {
                let _ = fatal.send(err).await;
                break;
            }
            // Already logged by the executor
            Err(_) => {}
        }
    }
}

/// Where and what to watch.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Paths are matched relative to this directory
    pub root: PathBuf,

    /// Directory watched recursively
    pub watch_dir: PathBuf,

    pub bindings: Vec<WatchBinding>,

    pub debounce: Duration,
}

/// A running watch: the debouncer, one worker per binding and the
/// dispatcher between them. Dropping it deregisters the watcher and lets
/// the workers finish their current run and exit.
pub struct WatchSession {
    roots: [PathBuf; 2],
    bindings: BindingSet,
    triggers: Vec<Trigger>,
    events: mpsc::UnboundedReceiver<DebounceEventResult>,
    fatal: mpsc::Receiver<RunError>,
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

impl WatchSession {
    /// Validate the bindings against the executor's graph, register the
    /// watcher and spawn the workers. Must be called inside the runtime.
    pub fn start(
        config: WatchConfig,
        executor: Executor,
        hub: ReloadHub,
    ) -> Result<Self, ServerError> {
        let bindings = BindingSet::compile(config.bindings)?;

        for binding in bindings.bindings() {
            if let Some(task) = binding.tasks.iter().find(|t| !executor.graph().contains(t)) {
                return Err(ServerError::UnknownTask {
                    pattern: binding.pattern.clone(),
                    task: task.clone(),
                });
            }
        }

        let (event_tx, events) = mpsc::unbounded_channel();
        let mut debouncer = new_debouncer(config.debounce, move |res: DebounceEventResult| {
            let _ = event_tx.send(res);
        })
        .map_err(|e| ServerError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&config.watch_dir, RecursiveMode::Recursive)
            .map_err(|e| {
                ServerError::Watch(format!("{}: {}", config.watch_dir.display(), e))
            })?;

        tracing::info!(
            "Watching {} ({} bindings)",
            config.watch_dir.display(),
            bindings.len()
        );

        let (fatal_tx, fatal) = mpsc::channel(1);
        let triggers = spawn_workers(&bindings, &executor, &hub, &fatal_tx);

        let absolute = std::path::absolute(&config.root).unwrap_or(config.root.clone());
        Ok(Self {
            roots: [canonical(&config.root), absolute],
            bindings,
            triggers,
            events,
            fatal,
            _debouncer: debouncer,
        })
    }

    /// Dispatch file events until a run fails fatally.
    pub async fn run(mut self) -> Result<(), ServerError> {
        loop {
            tokio::select! {
                Some(err) = self.fatal.recv() => return Err(ServerError::Fatal(err)),
                event = self.events.recv() => match event {
                    Some(Ok(events)) => {
                        for event in events {
                            self.dispatch(&event.path);
                        }
                    }
                    Some(Err(e)) => tracing::error!("Watch error: {}", e),
                    None => return Err(ServerError::Watch("watcher stopped".to_string())),
                },
            }
        }
    }

    /// Queue every binding whose pattern matches `path`.
    fn dispatch(&self, path: &Path) {
        let relative = self
            .roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);

        for index in self.bindings.matching(relative) {
            if !self.triggers[index].fire() {
                tracing::debug!("Coalesced change to {}", relative.display());
            }
        }
    }
}

fn spawn_workers(
    bindings: &BindingSet,
    executor: &Executor,
    hub: &ReloadHub,
    fatal: &mpsc::Sender<RunError>,
) -> Vec<Trigger> {
    bindings
        .bindings()
        .map(|binding| {
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(worker(
                binding.clone(),
                executor.clone(),
                hub.clone(),
                rx,
                fatal.clone(),
            ));
            Trigger { tx }
        })
        .collect()
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ashlar_graph::{Task, TaskContext, TaskError, TaskGraph, TaskReport};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Counter {
        name: &'static str,
        runs: Arc<AtomicUsize>,
        delay: Duration,
        error: Option<fn() -> TaskError>,
    }

    impl Task for Counter {
        fn name(&self) -> &'static str {
            self.name
        }

        fn title(&self) -> &'static str {
            self.name
        }

        fn run(&self, _ctx: &TaskContext) -> Result<TaskReport, TaskError> {
            std::thread::sleep(self.delay);
            self.runs.fetch_add(1, Ordering::SeqCst);
            match self.error {
                Some(error) => Err(error()),
                None => Ok(TaskReport::new()),
            }
        }
    }

    fn counter(name: &'static str, delay: Duration) -> (Counter, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = Counter {
            name,
            runs: Arc::clone(&runs),
            delay,
            error: None,
        };
        (task, runs)
    }

    fn executor(task: Counter) -> Executor {
        Executor::new(TaskGraph::builder().task(task).build().unwrap())
    }

    fn matches(bindings: &BindingSet, path: &str) -> Vec<String> {
        bindings
            .matching(Path::new(path))
            .into_iter()
            .flat_map(|i| bindings.bindings[i].1.tasks.clone())
            .collect()
    }

    #[test]
    fn default_bindings_route_changes_to_tasks() {
        let bindings = BindingSet::compile(default_bindings("app")).unwrap();

        assert_eq!(matches(&bindings, "app/html/index.html"), vec!["html"]);
        assert_eq!(
            matches(&bindings, "app/assets/styles/sprites/_sprite-png.scss"),
            vec!["styles"]
        );
        assert_eq!(matches(&bindings, "app/assets/scripts/main.js"), vec!["scripts"]);
        assert_eq!(
            matches(&bindings, "app/assets/scripts/libs/slider.js"),
            vec!["scripts:libs"]
        );
        assert_eq!(
            matches(&bindings, "app/assets/images/sprite-png/icon.png"),
            vec!["sprite:png"]
        );
        assert_eq!(matches(&bindings, "app/assets/images/photo.jpg"), vec!["images"]);
        assert_eq!(
            matches(&bindings, "app/assets/fonts/roboto/roboto.woff2"),
            vec!["fonts"]
        );
    }

    #[test]
    fn source_spelling_does_not_change_routing() {
        for source in ["./app", "app/", "./app/"] {
            let bindings = BindingSet::compile(default_bindings(source)).unwrap();

            assert_eq!(
                matches(&bindings, "app/html/index.html"),
                vec!["html"],
                "source '{}'",
                source
            );
            assert_eq!(
                matches(&bindings, "app/assets/scripts/main.js"),
                vec!["scripts"],
                "source '{}'",
                source
            );
        }
    }

    #[test]
    fn nested_and_current_sources() {
        let nested = BindingSet::compile(default_bindings("./site/src")).unwrap();
        assert_eq!(matches(&nested, "site/src/html/index.html"), vec!["html"]);

        let current = BindingSet::compile(default_bindings(".")).unwrap();
        assert_eq!(matches(&current, "assets/fonts/a.woff2"), vec!["fonts"]);
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let bindings = BindingSet::compile(default_bindings("app")).unwrap();

        assert!(matches(&bindings, "app/assets/scripts/vendor/lib.js").is_empty());
        assert!(matches(&bindings, "build/index.html").is_empty());
    }

    #[test]
    fn generated_fragments_trigger_their_consumers() {
        let bindings = BindingSet::compile(default_bindings("app")).unwrap();

        assert_eq!(
            matches(&bindings, "app/assets/styles/sprites/sprite-svg-symbol.html"),
            vec!["html"]
        );
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = BindingSet::compile(vec![WatchBinding::new("app/[", &["html"])]).unwrap_err();

        assert!(matches!(err, ServerError::Pattern { ref pattern, .. } if pattern == "app/["));
    }

    #[test]
    fn reload_defaults_to_on() {
        let binding: WatchBinding = serde_json::from_str(
            r#"{ "pattern": "app/**/*.scss", "tasks": ["styles"] }"#,
        )
        .unwrap();

        assert!(binding.reload);
    }

    #[tokio::test]
    async fn triggers_coalesce_while_a_request_is_pending() {
        let (tx, mut rx) = mpsc::channel(1);
        let trigger = Trigger { tx };

        assert!(trigger.fire());
        assert!(!trigger.fire());
        assert!(!trigger.fire());

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
        assert!(trigger.fire());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn burst_of_changes_runs_at_most_twice() {
        let (task, runs) = counter("styles", Duration::from_millis(150));
        let bindings = BindingSet::compile(vec![WatchBinding::new("*.scss", &["styles"])]).unwrap();
        let (fatal_tx, _fatal) = mpsc::channel(1);
        let triggers = spawn_workers(&bindings, &executor(task), &ReloadHub::new(), &fatal_tx);

        for _ in 0..5 {
            triggers[0].fire();
        }
        tokio::time::sleep(Duration::from_millis(600)).await;

        let count = runs.load(Ordering::SeqCst);
        assert!((1..=2).contains(&count), "ran {} times", count);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn successful_run_reloads_clients() {
        let (task, runs) = counter("html", Duration::ZERO);
        let hub = ReloadHub::new();
        let mut client = hub.subscribe();
        let bindings = BindingSet::compile(vec![WatchBinding::new("*.html", &["html"])]).unwrap();
        let (fatal_tx, _fatal) = mpsc::channel(1);
        let triggers = spawn_workers(&bindings, &executor(task), &hub, &fatal_tx);

        triggers[0].fire();
        let msg = tokio::time::timeout(Duration::from_secs(2), client.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(msg, crate::reload::ReloadMessage::Reload);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_run_keeps_the_worker_alive() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = Counter {
            name: "html",
            runs: Arc::clone(&runs),
            delay: Duration::ZERO,
            error: Some(|| TaskError::malformed(Path::new("index.html"), "bad tag")),
        };
        let hub = ReloadHub::new();
        let mut client = hub.subscribe();
        let bindings = BindingSet::compile(vec![WatchBinding::new("*.html", &["html"])]).unwrap();
        let (fatal_tx, mut fatal) = mpsc::channel(1);
        let triggers = spawn_workers(&bindings, &executor(task), &hub, &fatal_tx);

        triggers[0].fire();
        tokio::time::sleep(Duration::from_millis(200)).await;
        triggers[0].fire();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(client.try_recv().is_err());
        assert!(fatal.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn configuration_errors_stop_the_worker() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = Counter {
            name: "styles",
            runs: Arc::clone(&runs),
            delay: Duration::ZERO,
            error: Some(|| TaskError::Config("unknown browser query".to_string())),
        };
        let bindings = BindingSet::compile(vec![WatchBinding::new("*.scss", &["styles"])]).unwrap();
        let (fatal_tx, mut fatal) = mpsc::channel(1);
        let triggers = spawn_workers(&bindings, &executor(task), &ReloadHub::new(), &fatal_tx);

        triggers[0].fire();
        let err = tokio::time::timeout(Duration::from_secs(2), fatal.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(err.is_fatal());
        assert_eq!(err.failed_tasks(), vec!["styles"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_binding_task_is_rejected_at_start() {
        let temp = tempdir().unwrap();
        let (task, _) = counter("html", Duration::ZERO);
        let config = WatchConfig {
            root: temp.path().to_path_buf(),
            watch_dir: temp.path().to_path_buf(),
            bindings: vec![WatchBinding::new("*.js", &["scripts"])],
            debounce: DEBOUNCE,
        };

        let err = WatchSession::start(config, executor(task), ReloadHub::new())
            .err()
            .unwrap();

        assert!(matches!(err, ServerError::UnknownTask { ref task, .. } if task == "scripts"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_change_runs_the_bound_task() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("app/html")).unwrap();
        let (task, runs) = counter("html", Duration::ZERO);
        let hub = ReloadHub::new();
        let mut client = hub.subscribe();
        let config = WatchConfig {
            root: temp.path().to_path_buf(),
            watch_dir: temp.path().join("app"),
            bindings: default_bindings("app")
                .into_iter()
                .filter(|binding| binding.tasks == ["html"])
                .collect(),
            debounce: Duration::from_millis(50),
        };

        let session = WatchSession::start(config, executor(task), hub).unwrap();
        let running = tokio::spawn(session.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(temp.path().join("app/html/index.html"), "<p>changed</p>").unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(5), client.recv()).await;
        running.abort();

        assert!(msg.is_ok(), "timeout waiting for reload");
        assert!(runs.load(Ordering::SeqCst) >= 1);
    }
}
