//! Static file server for the build tree.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use axum::{
    body::{to_bytes, Body},
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::services::ServeDir;

use ashlar_graph::RunError;

use crate::reload::{
    client_script, inject_script, ReloadHub, ReloadMessage, RELOAD_PATH, SCRIPT_PATH,
};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory served at `/`
    pub root: PathBuf,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Open a browser on start
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("build"),
            host: "127.0.0.1".to_string(),
            port: 3000,
            open: true,
        }
    }
}

impl ServerConfig {
    /// Address shown to the user and opened in the browser.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] io::Error),

    #[error("Invalid watch pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("Watch pattern '{pattern}' names unknown task '{task}'")]
    UnknownTask { pattern: String, task: String },

    #[error("File watch error: {0}")]
    Watch(String),

    #[error("Watch stopped: {0}")]
    Fatal(#[source] RunError),
}

/// Development server over the build tree with live reload.
pub struct DevServer {
    config: ServerConfig,
    hub: ReloadHub,
}

impl DevServer {
    pub fn new(config: ServerConfig, hub: ReloadHub) -> Self {
        Self { config, hub }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Routes: the reload socket and script, then the build tree. HTML
    /// responses get the client script injected.
    pub fn router(&self) -> Router {
        Router::new()
            .route(RELOAD_PATH, get(ws_handler))
            .route(SCRIPT_PATH, get(script_handler))
            .fallback_service(ServeDir::new(&self.config.root))
            .layer(middleware::map_response(inject_reload))
            .with_state(self.hub.clone())
    }

    /// Bind the listening socket.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Serving {} at {}", self.config.root.display(), self.config.url());

        if self.config.open {
            if let Err(e) = open::that(self.config.url()) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn inject_reload(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"));

    if !is_html || response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::ETAG);
    Response::from_parts(parts, Body::from(html))
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<ReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if send(&mut socket, &ReloadMessage::Connected).await.is_err() {
        return;
    }

    while let Some(msg) = next_message(&mut rx).await {
        if send(&mut socket, &msg).await.is_err() {
            break;
        }
    }
}

/// The next message for a client, or `None` once the hub is gone. A client
/// that fell behind gets a single reload for everything it missed.
async fn next_message(rx: &mut broadcast::Receiver<ReloadMessage>) -> Option<ReloadMessage> {
    match rx.recv().await {
        Ok(msg) => Some(msg),
        Err(RecvError::Lagged(skipped)) => {
            tracing::debug!("Reload client lagged by {} messages", skipped);
            Some(ReloadMessage::Reload)
        }
        Err(RecvError::Closed) => None,
    }
}

async fn send(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

async fn script_handler() -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/javascript"),
        )],
        client_script(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use std::fs;
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn get_page(server: &DevServer, uri: &str) -> (StatusCode, String) {
        let response = server
            .router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn server(root: PathBuf) -> DevServer {
        DevServer::new(
            ServerConfig {
                root,
                open: false,
                ..ServerConfig::default()
            },
            ReloadHub::new(),
        )
    }

    #[tokio::test]
    async fn injects_client_into_html_pages() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("index.html"),
            "<html><body><h1>Home</h1></body></html>",
        )
        .unwrap();

        let (status, body) = get_page(&server(temp.path().to_path_buf()), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            r#"<html><body><h1>Home</h1><script src="/__reload.js"></script></body></html>"#
        );
    }

    #[tokio::test]
    async fn leaves_other_assets_untouched() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::write(temp.path().join("css/styles.min.css"), "body{}").unwrap();

        let (status, body) = get_page(&server(temp.path().to_path_buf()), "/css/styles.min.css").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body{}");
    }

    #[tokio::test]
    async fn serves_the_client_script() {
        let temp = tempdir().unwrap();

        let (status, body) = get_page(&server(temp.path().to_path_buf()), SCRIPT_PATH).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("location.reload()"));
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let temp = tempdir().unwrap();

        let (status, _) = get_page(&server(temp.path().to_path_buf()), "/missing.html").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lagging_client_still_reloads() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        for _ in 0..40 {
            hub.reload();
        }

        assert_eq!(next_message(&mut rx).await, Some(ReloadMessage::Reload));
        assert_eq!(next_message(&mut rx).await, Some(ReloadMessage::Reload));
    }

    #[tokio::test]
    async fn closed_hub_ends_the_client() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();
        drop(hub);

        assert_eq!(next_message(&mut rx).await, None);
    }

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let server = DevServer::new(
            ServerConfig {
                port,
                open: false,
                ..ServerConfig::default()
            },
            ReloadHub::new(),
        );

        let err = server.bind().await.unwrap_err();

        assert!(err.to_string().contains(&format!("127.0.0.1:{}", port)));
    }
}
