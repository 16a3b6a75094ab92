//! Transport session contract for the push provider.

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use eventrace_core::WatchError;

/// Push provider endpoint as a scheme/host/path triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_scheme() -> String { "wss".into() }
fn default_host() -> String { "api.blocknative.com".into() }
fn default_path() -> String { "/v0".into() }

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            path: default_path(),
        }
    }
}

impl Endpoint {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            path: path.into(),
        }
    }

    /// Parse into a URL, failing with [`SessionError::Connect`].
    pub fn url(&self) -> Result<url::Url, SessionError> {
        url::Url::parse(&self.to_string()).map_err(|e| SessionError::Connect {
            url: self.to_string(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() || self.path.starts_with('/') {
            write!(f, "{}://{}{}", self.scheme, self.host, self.path)
        } else {
            write!(f, "{}://{}/{}", self.scheme, self.host, self.path)
        }
    }
}

/// Static provider API key. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Identity of one opened session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors from a transport session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The channel could not be established.
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// The remote went away without the close handshake.
    #[error("abnormal closure: {0}")]
    AbnormalClosure(String),

    /// The remote closed the channel with a proper close handshake.
    #[error("connection closed: {0}")]
    Closed(String),

    /// A message arrived but did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other send/receive failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session was already closed locally.
    #[error("session is not open")]
    NotOpen,
}

impl SessionError {
    pub fn is_abnormal_closure(&self) -> bool {
        matches!(self, Self::AbnormalClosure(_))
    }

    /// Returns `true` when no further message can arrive on this session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed(_) | Self::NotOpen)
    }
}

impl From<SessionError> for WatchError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Connect { url, reason } => WatchError::Connect { endpoint: url, reason },
            SessionError::AbnormalClosure(reason) => WatchError::AbnormalClosure(reason),
            SessionError::Decode(e) => WatchError::Protocol(e.to_string()),
            other => WatchError::Protocol(other.to_string()),
        }
    }
}

/// A single duplex JSON message channel to the push provider.
#[async_trait]
pub trait TransportSession: Send {
    fn id(&self) -> SessionId;

    /// Write one already-serialized message.
    async fn send_text(&mut self, text: String) -> Result<(), SessionError>;

    /// Wait for the next data message.
    async fn receive_text(&mut self) -> Result<String, SessionError>;

    /// Release the channel. Idempotent.
    async fn close(&mut self);

    /// Serialize `message` to JSON and write it.
    async fn send<M: Serialize + Sync>(&mut self, message: &M) -> Result<(), SessionError> {
        let text = serde_json::to_string(message)?;
        self.send_text(text).await
    }

    /// Receive the next message and decode it as `T`.
    async fn receive_as<T: DeserializeOwned>(&mut self) -> Result<T, SessionError> {
        let text = self.receive_text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Receive the next message and discard it unread.
    async fn receive_ignore(&mut self) -> Result<(), SessionError> {
        self.receive_text().await.map(|_| ())
    }
}

/// Opens transport sessions.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: TransportSession + 'static;

    /// Establish a new channel. No message is sent.
    async fn open(&self, endpoint: &Endpoint, api_key: &ApiKey) -> Result<Self::Session, SessionError>;
}
