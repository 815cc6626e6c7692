//! Firebase Realtime Database client over REST and server-sent events.
//!
//! Writes map to single HTTP requests (`PUT`, `PATCH`, `DELETE`) on
//! `{endpoint}/{path}.json`. The live feed is an `text/event-stream`
//! request on the same URL; `put` and `patch` events are applied to a local
//! mirror of the subtree and every change is delivered as a full snapshot.
//!
//! The endpoint key, when non-empty, is sent as the `auth` query parameter.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use iotdash_types::ConnectionConfig;

use crate::client::{Connector, SnapshotFeed, TreeClient, feed_channel};
use crate::error::{Error, Result};
use crate::path;

/// Timeout applied to every request except the live feed.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for establishing a TCP/TLS connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const FEED_BUFFER: usize = 16;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A Firebase Realtime Database REST client bound to one endpoint.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    endpoint: Url,
    auth: Option<String>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RestClient {
    /// Create a client for `config` with its own HTTP client.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Self::with_client(config, http)
    }

    /// Create a client for `config` sharing an existing HTTP client.
    pub fn with_client(config: &ConnectionConfig, http: Client) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::invalid_config(e.to_string()))?;

        let base_url = config.base_url().to_string();
        let endpoint = Url::parse(&base_url)
            .map_err(|e| Error::invalid_config(format!("invalid endpoint URL: {}", e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::invalid_config("endpoint URL cannot carry a path"));
        }

        let key = config.endpoint_key.trim();
        Ok(Self {
            http,
            base_url,
            endpoint,
            auth: (!key.is_empty()).then(|| key.to_string()),
        })
    }

    /// The endpoint URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The REST URL of `path`.
    ///
    /// Every segment is percent-encoded on its own, so a key holding `?`,
    /// `%` or a space addresses exactly that child.
    pub fn url(&self, path: &str) -> Url {
        let mut segments: Vec<&str> = path::segments(path).collect();
        let last = format!("{}.json", segments.pop().unwrap_or_default());

        let mut url = self.endpoint.clone();
        if let Ok(mut out) = url.path_segments_mut() {
            out.pop_if_empty().extend(segments).push(&last);
        }
        url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.auth {
            Some(key) => builder.query(&[("auth", key.as_str())]),
            None => builder,
        }
    }

    async fn write(&self, builder: RequestBuilder) -> Result<()> {
        let response = builder
            .query(&[("print", "silent")])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    /// Run one event-stream connection until it ends, fails or the feed is
    /// dropped. `backoff` is reset once the server accepts the request.
    async fn stream_once(
        &self,
        path: &str,
        tx: &mpsc::Sender<Result<Value>>,
        backoff: &mut Duration,
    ) -> Result<()> {
        let response = self
            .request(Method::GET, path)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;
        *backoff = INITIAL_BACKOFF;
        debug!("Event stream open on '{}'", path);

        let mut body = Box::pin(response.bytes_stream());
        let mut parser = SseParser::default();
        let mut mirror = Value::Null;

        loop {
            tokio::select! {
                _ = tx.closed() => return Ok(()),
                chunk = body.next() => {
                    let Some(chunk) = chunk else {
                        debug!("Event stream on '{}' ended", path);
                        return Ok(());
                    };
                    for event in parser.push(&chunk?) {
                        if let Some(snapshot) = apply_event(&mut mirror, &event)? {
                            if tx.send(Ok(snapshot)).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl TreeClient for RestClient {
    async fn probe(&self, path: &str) -> Result<()> {
        let response = self
            .request(Method::GET, path)
            .query(&[("shallow", "true")])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    async fn watch(&self, path: &str) -> Result<SnapshotFeed> {
        let (tx, feed) = feed_channel(FEED_BUFFER);
        let client = self.clone();
        let path = path::join(&[path]);

        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;
            loop {
                if let Err(e) = client.stream_once(&path, &tx, &mut backoff).await {
                    warn!("Event stream on '{}' failed: {}", path, e);
                    if tx.send(Err(e)).await.is_err() {
                        break;
                    }
                }
                if tx.is_closed() {
                    break;
                }

                debug!("Reopening event stream in {:?}", backoff);
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            debug!("Event stream task for '{}' stopped", path);
        });

        Ok(feed)
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.write(self.request(Method::PUT, path).json(&value))
            .await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        self.write(self.request(Method::PATCH, path).json(&fields))
            .await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.write(self.request(Method::DELETE, path)).await
    }
}

/// Opens [`RestClient`] sessions sharing one HTTP connection pool.
#[derive(Clone)]
pub struct RestConnector {
    http: Client,
}

impl RestConnector {
    /// Create a connector with a fresh HTTP client.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// Create a connector with a custom reqwest Client.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Connector for RestConnector {
    type Client = RestClient;

    async fn open(&self, config: &ConnectionConfig) -> Result<std::sync::Arc<RestClient>> {
        let client = RestClient::with_client(config, self.http.clone())?;
        debug!("Opening REST session for {}", client.base_url());
        Ok(std::sync::Arc::new(client))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| status.to_string());

    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    event: String,
    data: Vec<String>,
}

impl SseParser {
    /// Feed a chunk of the body and return every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.event.is_empty() || !self.data.is_empty() {
                    events.push(SseEvent {
                        event: std::mem::take(&mut self.event),
                        data: std::mem::take(&mut self.data).join("\n"),
                    });
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = value.to_string(),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }
}

#[derive(Debug, Deserialize)]
struct ChangePayload {
    path: String,
    data: Value,
}

/// Apply `event` to `mirror`. Returns the new snapshot when the mirror
/// changed.
pub(crate) fn apply_event(mirror: &mut Value, event: &SseEvent) -> Result<Option<Value>> {
    match event.event.as_str() {
        "put" => {
            let payload: ChangePayload = serde_json::from_str(&event.data)?;
            path::set(mirror, &payload.path, payload.data);
            Ok(Some(mirror.clone()))
        }
        "patch" => {
            let payload: ChangePayload = serde_json::from_str(&event.data)?;
            let Value::Object(fields) = payload.data else {
                return Err(Error::InvalidData(
                    "patch event data is not an object".to_string(),
                ));
            };
            path::update(mirror, &payload.path, fields);
            Ok(Some(mirror.clone()))
        }
        "keep-alive" => Ok(None),
        "cancel" => Err(Error::Stream(format!(
            "listener cancelled by server: {}",
            event.data.trim_matches('"')
        ))),
        "auth_revoked" => Err(Error::Stream("credential revoked".to_string())),
        other => {
            debug!("Ignoring event stream event '{}'", other);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, data: &str) -> SseEvent {
        SseEvent {
            event: name.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_url_building() {
        let config = ConnectionConfig::new("https://demo.firebaseio.com/", "");
        let client = RestClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://demo.firebaseio.com");
        assert_eq!(
            client.url("/iot/monitoring/").as_str(),
            "https://demo.firebaseio.com/iot/monitoring.json"
        );
        assert_eq!(client.url("").as_str(), "https://demo.firebaseio.com/.json");
    }

    #[test]
    fn test_url_encodes_each_segment() {
        let config = ConnectionConfig::new("https://demo.firebaseio.com", "");
        let client = RestClient::new(&config).unwrap();

        let url = client.url("iot/monitoring/what?/value");
        assert_eq!(url.path(), "/iot/monitoring/what%3F/value.json");
        assert_eq!(url.query(), None);

        let url = client.url("iot/monitoring/a%2Fb");
        assert_eq!(url.path(), "/iot/monitoring/a%252Fb.json");

        let url = client.url("iot/monitoring/living room/café");
        assert_eq!(url.path(), "/iot/monitoring/living%20room/caf%C3%A9.json");

        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 4);
    }

    #[test]
    fn test_url_keeps_endpoint_prefix() {
        let config = ConnectionConfig::new("https://proxy.local/rtdb/", "");
        let client = RestClient::new(&config).unwrap();
        assert_eq!(
            client.url("iot/fan").as_str(),
            "https://proxy.local/rtdb/iot/fan.json"
        );
    }

    #[test]
    fn test_request_query_does_not_swallow_path() {
        let config = ConnectionConfig::new("https://demo.firebaseio.com", "secret");
        let client = RestClient::new(&config).unwrap();
        let request = client
            .request(Method::PUT, "iot/monitoring/what?/value")
            .build()
            .unwrap();
        assert_eq!(request.url().path(), "/iot/monitoring/what%3F/value.json");
        assert_eq!(request.url().query(), Some("auth=secret"));
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = ConnectionConfig::new("demo.firebaseio.com", "");
        assert!(matches!(
            RestClient::new(&config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_key_sends_no_auth() {
        let with_key = RestClient::new(&ConnectionConfig::new("https://a.b", "secret")).unwrap();
        let without = RestClient::new(&ConnectionConfig::new("https://a.b", "  ")).unwrap();
        assert!(with_key.auth.is_some());
        assert!(without.auth.is_none());
        assert!(!format!("{:?}", with_key).contains("secret"));
    }

    #[test]
    fn test_sse_parser_split_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"event: put\nda").is_empty());
        let events = parser.push(b"ta: {\"path\":\"/\",\"data\":null}\n\n");
        assert_eq!(events, vec![event("put", r#"{"path":"/","data":null}"#)]);
    }

    #[test]
    fn test_sse_parser_crlf_comments_and_multiline() {
        let mut parser = SseParser::default();
        let events = parser.push(b": hello\r\nevent: keep-alive\r\ndata: null\r\n\r\nevent: x\ndata: a\ndata: b\n\n");
        assert_eq!(events, vec![event("keep-alive", "null"), event("x", "a\nb")]);
    }

    #[test]
    fn test_apply_put_and_patch() {
        let mut mirror = Value::Null;

        let snapshot = apply_event(
            &mut mirror,
            &event(
                "put",
                r#"{"path":"/","data":{"fan":{"type":"dimmer","value":0}}}"#,
            ),
        )
        .unwrap();
        assert_eq!(snapshot, Some(json!({"fan": {"type": "dimmer", "value": 0}})));

        apply_event(&mut mirror, &event("put", r#"{"path":"/fan/value","data":512}"#)).unwrap();
        assert_eq!(mirror["fan"]["value"], json!(512));

        apply_event(
            &mut mirror,
            &event("patch", r#"{"path":"/","data":{"fan/value":3,"lamp":{"type":"switch","value":1}}}"#),
        )
        .unwrap();
        assert_eq!(mirror["fan"]["value"], json!(3));
        assert_eq!(mirror["lamp"]["value"], json!(1));

        let snapshot =
            apply_event(&mut mirror, &event("put", r#"{"path":"/","data":null}"#)).unwrap();
        assert_eq!(snapshot, Some(Value::Null));
    }

    #[test]
    fn test_apply_control_events() {
        let mut mirror = json!({"a": 1});
        assert_eq!(
            apply_event(&mut mirror, &event("keep-alive", "null")).unwrap(),
            None
        );
        assert!(matches!(
            apply_event(&mut mirror, &event("cancel", "\"Permission denied\"")),
            Err(Error::Stream(msg)) if msg.contains("Permission denied")
        ));
        assert!(matches!(
            apply_event(&mut mirror, &event("auth_revoked", "null")),
            Err(Error::Stream(_))
        ));
        assert_eq!(mirror, json!({"a": 1}));
    }

    #[test]
    fn test_apply_rejects_bad_payload() {
        let mut mirror = Value::Null;
        assert!(apply_event(&mut mirror, &event("put", "not json")).is_err());
        assert!(apply_event(&mut mirror, &event("patch", r#"{"path":"/","data":5}"#)).is_err());
    }
}
