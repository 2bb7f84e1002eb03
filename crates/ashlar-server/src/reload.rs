//! WebSocket live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// WebSocket endpoint clients connect to.
pub const RELOAD_PATH: &str = "/__reload";

/// URL of the client script.
pub const SCRIPT_PATH: &str = "/__reload.js";

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Connection established
    Connected,
}

/// Broadcasts reload messages to every connected client.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers is fine
        let _ = self.sender.send(msg);
    }

    /// Ask every connected page to reload.
    pub fn reload(&self) {
        tracing::debug!("Reloading {} client(s)", self.subscriber_count());
        self.send(ReloadMessage::Reload);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Number of connected clients.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Browser side of the reload channel. Connects back to the serving host,
/// reloads on `reload` and retries with a growing delay after a disconnect.
pub fn client_script() -> String {
    format!(
        r#"(function() {{
  'use strict';

  var attempts = 0;
  var maxAttempts = 10;

  function connect() {{
    var scheme = location.protocol === 'https:' ? 'wss://' : 'ws://';
    var ws = new WebSocket(scheme + location.host + '{}');

    ws.onopen = function() {{
      if (attempts > 0) {{
        location.reload();
      }}
      attempts = 0;
    }};

    ws.onmessage = function(event) {{
      var msg = JSON.parse(event.data);
      if (msg.type === 'reload') {{
        location.reload();
      }}
    }};

    ws.onclose = function() {{
      if (attempts < maxAttempts) {{
        attempts++;
        setTimeout(connect, 1000 * attempts);
      }}
    }};
  }}

  connect();
}})();
"#,
        RELOAD_PATH
    )
}

/// Insert the client script tag before the last `</body>`, or append it
/// when the page has none.
pub fn inject_script(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, SCRIPT_PATH);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..at]);
            out.push_str(&tag);
            out.push_str(&html[at..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_broadcasts_to_every_subscriber() {
        let hub = ReloadHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.reload();

        assert_eq!(first.try_recv().unwrap(), ReloadMessage::Reload);
        assert_eq!(second.try_recv().unwrap(), ReloadMessage::Reload);
    }

    #[test]
    fn sending_without_clients_is_a_no_op() {
        let hub = ReloadHub::new();

        hub.reload();

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn serializes_messages() {
        let json = serde_json::to_string(&ReloadMessage::Reload).unwrap();

        assert_eq!(json, r#"{"type":"reload"}"#);
    }

    #[test]
    fn injects_before_closing_body() {
        let html = "<html><body><p>Hi</p></BODY></html>";

        assert_eq!(
            inject_script(html),
            r#"<html><body><p>Hi</p><script src="/__reload.js"></script></BODY></html>"#
        );
    }

    #[test]
    fn appends_when_body_is_missing() {
        assert_eq!(
            inject_script("<p>fragment</p>"),
            r#"<p>fragment</p><script src="/__reload.js"></script>"#
        );
    }

    #[test]
    fn client_connects_to_reload_endpoint() {
        assert!(client_script().contains("'/__reload'"));
    }
}
