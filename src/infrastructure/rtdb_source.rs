// Realtime-database transport - REST pull + event-stream push
use anyhow::Context;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::{StatusCode, header};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::application::telemetry_source::{PayloadStream, TelemetrySource};

const EVENT_STREAM_MIME: &str = "text/event-stream";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("realtime database request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("realtime database returned status {0}")]
    Status(StatusCode),
}

/// Telemetry source backed by a Firebase Realtime Database instance.
///
/// Pull: `GET {database_url}/{path}.json`. Push: the streaming REST
/// protocol - the same URL requested with `Accept: text/event-stream`,
/// which delivers `put`/`patch` events for the watched path. A partial
/// update (`patch`, or a `put` below the root) is resolved by re-pulling
/// the full snapshot so subscribers always see whole documents.
#[derive(Debug, Clone)]
pub struct RtdbSource {
    client: reqwest::Client,
    database_url: String,
    path: String,
    auth_token: Option<String>,
}

impl RtdbSource {
    pub fn new(database_url: String, path: String, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            database_url: database_url.trim_end_matches('/').to_string(),
            path: path.trim_matches('/').to_string(),
            auth_token,
        }
    }

    fn snapshot_url(&self) -> String {
        let path = self
            .path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let mut url = format!("{}/{}.json", self.database_url, path);
        if let Some(token) = &self.auth_token {
            url.push_str("?auth=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }

    async fn pull_snapshot(&self) -> Result<Option<Value>, SourceError> {
        let response = self
            .client
            .get(self.snapshot_url())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status()));
        }

        let value = response.json::<Value>().await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn open_event_stream(&self) -> Result<PayloadStream, SourceError> {
        let response = self
            .client
            .get(self.snapshot_url())
            .header(header::ACCEPT, EVENT_STREAM_MIME)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status()));
        }

        let source = self.clone();
        let mut body = Box::pin(response.bytes_stream());
        let stream = async_stream::stream! {
            let mut buffer = BytesMut::new();
            let mut event = ServerEvent::default();
            'conn: loop {
                let chunk = match body.next().await {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        tracing::warn!("event stream read failed: {e}");
                        break;
                    }
                    None => break,
                };
                buffer.extend_from_slice(&chunk);

                while let Some(line) = take_line(&mut buffer) {
                    if !line.is_empty() {
                        event.feed_line(&line);
                        continue;
                    }
                    // A blank line terminates one event.
                    let finished = std::mem::take(&mut event);
                    match finished.name.as_str() {
                        "cancel" | "auth_revoked" => {
                            tracing::warn!("event stream closed by server: {}", finished.name);
                            break 'conn;
                        }
                        _ => {
                            if let Some(payload) = source.resolve_event(&finished).await {
                                yield payload;
                            }
                        }
                    }
                }
            }
        };

        Ok(stream.boxed())
    }

    /// Turn one server event into a full snapshot, if it carries one.
    async fn resolve_event(&self, event: &ServerEvent) -> Option<Value> {
        if event.name != "put" && event.name != "patch" {
            // keep-alive and unknown events carry no snapshot
            return None;
        }

        let frame: PutFrame = match serde_json::from_str(&event.data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("undecodable {} frame: {e}", event.name);
                return None;
            }
        };

        if event.name == "put" && frame.path == "/" {
            return (!frame.data.is_null()).then_some(frame.data);
        }

        // Partial update below the watched root: re-pull the whole document.
        match self.pull_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("re-pull after partial update failed: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl TelemetrySource for RtdbSource {
    async fn fetch_latest(&self) -> anyhow::Result<Option<Value>> {
        self.pull_snapshot()
            .await
            .context("pull from realtime database")
    }

    async fn subscribe(&self) -> anyhow::Result<PayloadStream> {
        self.open_event_stream()
            .await
            .context("open realtime database event stream")
    }
}

/// One server-sent event, accumulated line by line.
#[derive(Debug, Default, Clone, PartialEq)]
struct ServerEvent {
    name: String,
    data: String,
}

impl ServerEvent {
    fn feed_line(&mut self, line: &str) {
        if let Some(rest) = line.strip_prefix("event:") {
            self.name = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
        // comment lines and unknown fields are ignored
    }
}

/// Body of an RTDB `put`/`patch` event.
#[derive(Debug, Deserialize)]
struct PutFrame {
    path: String,
    #[serde(default)]
    data: Value,
}

/// Pop one `\n`-terminated line off the buffer, without its terminator.
fn take_line(buffer: &mut BytesMut) -> Option<String> {
    let newline = buffer.iter().position(|&b| b == b'\n')?;
    let line = buffer.split_to(newline + 1);
    let line = &line[..newline];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    Some(String::from_utf8_lossy(line).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> RtdbSource {
        RtdbSource::new(
            "https://pack.example.firebaseio.com/".to_string(),
            "BMS".to_string(),
            None,
        )
    }

    #[test]
    fn test_snapshot_url_trims_and_encodes() {
        let source = RtdbSource::new(
            "https://pack.example.firebaseio.com/".to_string(),
            "/packs/unit 7/".to_string(),
            None,
        );
        assert_eq!(
            source.snapshot_url(),
            "https://pack.example.firebaseio.com/packs/unit%207.json"
        );
    }

    #[test]
    fn test_snapshot_url_appends_auth_token() {
        let source = RtdbSource::new(
            "https://pack.example.firebaseio.com".to_string(),
            "BMS".to_string(),
            Some("se cret".to_string()),
        );
        assert_eq!(
            source.snapshot_url(),
            "https://pack.example.firebaseio.com/BMS.json?auth=se%20cret"
        );
    }

    #[test]
    fn test_server_event_accumulates_fields() {
        let mut event = ServerEvent::default();
        event.feed_line("event: put");
        event.feed_line("data: {\"path\":\"/\",");
        event.feed_line("data: \"data\":{}}");
        assert_eq!(event.name, "put");
        assert_eq!(event.data, "{\"path\":\"/\",\n\"data\":{}}");
    }

    #[test]
    fn test_take_line_handles_crlf_and_partials() {
        let mut buffer = BytesMut::from(&b"event: put\r\ndata: {}\n\npartial"[..]);
        assert_eq!(take_line(&mut buffer).as_deref(), Some("event: put"));
        assert_eq!(take_line(&mut buffer).as_deref(), Some("data: {}"));
        assert_eq!(take_line(&mut buffer).as_deref(), Some(""));
        assert_eq!(take_line(&mut buffer), None);
        assert_eq!(&buffer[..], b"partial");
    }

    #[tokio::test]
    async fn test_root_put_event_resolves_to_payload() {
        let event = ServerEvent {
            name: "put".to_string(),
            data: r#"{"path":"/","data":{"SOC":85}}"#.to_string(),
        };
        assert_eq!(
            source().resolve_event(&event).await,
            Some(json!({"SOC": 85}))
        );
    }

    #[tokio::test]
    async fn test_null_root_put_and_keepalive_resolve_to_nothing() {
        let put = ServerEvent {
            name: "put".to_string(),
            data: r#"{"path":"/","data":null}"#.to_string(),
        };
        assert_eq!(source().resolve_event(&put).await, None);

        let keep_alive = ServerEvent {
            name: "keep-alive".to_string(),
            data: "null".to_string(),
        };
        assert_eq!(source().resolve_event(&keep_alive).await, None);
    }
}
