//! Event stream from the service
//!
//! The service pushes progress over a websocket scoped to one client id.
//! Text frames carry a `{type, data}` envelope; binary frames carry preview
//! images and are of no interest to job tracking.

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::types::{ClientId, JobId};
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};

/// One frame received from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON envelope
    Text(String),
    /// Binary payload (previews)
    Binary(Vec<u8>),
}

/// Persistent event connection
#[async_trait]
pub trait EventStream: Send {
    /// Whether the connection is currently open
    fn is_open(&self) -> bool;

    /// Open the connection; does nothing when already open
    async fn connect(&mut self) -> Result<(), ConnectorError>;

    /// Next data frame, or `None` once the connection has closed
    async fn next_frame(&mut self) -> Result<Option<Frame>, ConnectorError>;

    /// Drop frames already buffered, without waiting for more
    ///
    /// A close found here leaves the stream reporting not open, so it is
    /// reopened before the next submission.
    fn discard_pending(&mut self) {}
}

/// Parsed text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// `executing`: a node started, or (with no node) a job finished
    Executing {
        node: Option<String>,
        prompt_id: Option<String>,
    },
    /// Any other message type (`status`, `progress`, `executed`, ...)
    Other { kind: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl ExecutionEvent {
    /// Parse a text frame envelope
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let Envelope { kind, data } = serde_json::from_str(text)?;
        if kind != "executing" {
            return Ok(Self::Other { kind });
        }

        let node = match data.get("node") {
            None | Some(Value::Null) => None,
            Some(Value::String(node)) => Some(node.clone()),
            Some(other) => Some(other.to_string()),
        };
        let prompt_id = data
            .get("prompt_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self::Executing { node, prompt_id })
    }

    /// Whether this is the "nothing left to execute" signal for `job_id`
    #[must_use]
    pub fn is_terminal_for(&self, job_id: &JobId) -> bool {
        matches!(
            self,
            Self::Executing { node: None, prompt_id: Some(id) } if id == job_id.as_str()
        )
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event stream over a websocket
pub struct WebSocketEvents {
    url: String,
    socket: Option<Socket>,
}

impl std::fmt::Debug for WebSocketEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketEvents")
            .field("url", &self.url)
            .field("open", &self.socket.is_some())
            .finish()
    }
}

impl WebSocketEvents {
    /// Create an unconnected stream for `url`
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            socket: None,
        }
    }

    /// Create an unconnected stream for a client on the configured service
    #[must_use]
    pub fn from_config(config: &ConnectorConfig, client_id: &ClientId) -> Self {
        Self::new(config.ws_url(client_id.as_str()))
    }

    /// Endpoint URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Drop the connection; the next `connect` reopens it
    pub fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            debug!(url = %self.url, "event stream dropped");
        }
    }
}

#[async_trait]
impl EventStream for WebSocketEvents {
    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        if self.socket.is_some() {
            return Ok(());
        }
        let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectorError::EventStream(format!("connect to {}: {e}", self.url)))?;
        info!(url = %self.url, "event stream connected");
        self.socket = Some(socket);
        Ok(())
    }

    fn discard_pending(&mut self) {
        while let Some(socket) = self.socket.as_mut() {
            let polled = socket.next().now_or_never();
            match polled {
                None => return,
                Some(Some(Ok(Message::Close(reason)))) => {
                    debug!(?reason, "event stream closed while idle");
                    self.socket = None;
                }
                Some(Some(Err(e))) => {
                    debug!(error = %e, "event stream failed while idle");
                    self.socket = None;
                }
                Some(None) => {
                    debug!("event stream ended while idle");
                    self.socket = None;
                }
                Some(Some(Ok(_))) => trace!("stale frame discarded"),
            }
        }
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, ConnectorError> {
        loop {
            let Some(socket) = self.socket.as_mut() else {
                return Err(ConnectorError::EventStream("event stream is not connected".into()));
            };

            match socket.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(Frame::Text(text))),
                Some(Ok(Message::Binary(bytes))) => return Ok(Some(Frame::Binary(bytes))),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    trace!("control frame");
                }
                Some(Ok(Message::Close(reason))) => {
                    debug!(?reason, "event stream closed by peer");
                    self.socket = None;
                    return Ok(None);
                }
                None => {
                    self.socket = None;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.socket = None;
                    return Err(ConnectorError::EventStream(e.to_string()));
                }
            }
        }
    }
}
