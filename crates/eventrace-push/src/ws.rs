//! WebSocket transport session (tokio-tungstenite).

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::session::{ApiKey, Connector, Endpoint, SessionError, SessionId, TransportSession};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens [`WsSession`]s, numbering them in open order.
#[derive(Debug, Default)]
pub struct WsConnector {
    next_id: AtomicU64,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Session = WsSession;

    /// The push provider authenticates per message (`dappId`), so the
    /// WebSocket handshake itself carries no credentials.
    async fn open(&self, endpoint: &Endpoint, _api_key: &ApiKey) -> Result<WsSession, SessionError> {
        let url = endpoint.url()?;
        info!(url = %url, "connecting via WebSocket");

        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SessionError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        info!(url = %url, session = %id, "WebSocket connected");
        Ok(WsSession {
            id,
            stream: Some(stream),
            closing: false,
        })
    }
}

/// One live WebSocket connection.
pub struct WsSession {
    id: SessionId,
    stream: Option<WsStream>,
    /// Set once the remote sent its close frame.
    closing: bool,
}

#[async_trait]
impl TransportSession for WsSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::NotOpen)?;
        debug!(session = %self.id, "WS send: {}", text.chars().take(120).collect::<String>());
        stream.send(Message::Text(text)).await.map_err(classify_error)
    }

    async fn receive_text(&mut self) -> Result<String, SessionError> {
        loop {
            let stream = self.stream.as_mut().ok_or(SessionError::NotOpen)?;
            match stream.next().await {
                None if self.closing => return Err(SessionError::Closed("closed by server".into())),
                None => {
                    return Err(SessionError::AbnormalClosure(
                        "stream ended without close frame".into(),
                    ))
                }
                Some(Err(e)) => return Err(classify_error(e)),
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes)
                        .map_err(|e| SessionError::Transport(format!("binary frame is not UTF-8: {e}")))
                }
                Some(Ok(Message::Ping(data))) => {
                    // Respond to server pings to keep the connection alive
                    let _ = stream.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    self.closing = true;
                    return Err(classify_close(frame));
                }
                Some(Ok(_)) => {} // pong / raw frame — ignore
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
            debug!(session = %self.id, "WS session closed");
        }
    }
}

/// Map a close frame onto the session error taxonomy.
///
/// Code 1006 is reserved for connections lost without a close frame, so a
/// peer reporting it is treated the same as a dropped socket.
pub(crate) fn classify_close(frame: Option<CloseFrame<'_>>) -> SessionError {
    match frame {
        Some(f) if f.code == CloseCode::Abnormal => SessionError::AbnormalClosure(f.reason.to_string()),
        Some(f) => SessionError::Closed(format!("{}: {}", u16::from(f.code), f.reason)),
        None => SessionError::Closed("no close code".into()),
    }
}

pub(crate) fn classify_error(e: WsError) -> SessionError {
    match e {
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            SessionError::AbnormalClosure("reset without closing handshake".into())
        }
        WsError::Io(io_err)
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
            ) =>
        {
            SessionError::AbnormalClosure(io_err.to_string())
        }
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            SessionError::Closed("connection already closed".into())
        }
        other => SessionError::Transport(other.to_string()),
    }
}
