//! `WsLogSubscriber` — `eth_subscribe("logs", ..)` over a WebSocket.
//!
//! The first connect and subscribe happen inline so that a bad URL or a
//! rejected filter fails [`LogSubscriber::subscribe`] directly. After that a
//! background task owns the socket: it answers pings, skips reorged logs,
//! decodes everything else and, when the connection drops, reports the
//! drop on the error channel and reconnects with exponential backoff,
//! resubscribing with the same filter.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::abi::RawLog;
use crate::error::SubscriptionError;
use crate::subscription::{DecodedLog, LogFilter, LogSubscriber, LogSubscription};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SUBSCRIBE_ID: u64 = 1;

/// Channel sizing and reconnect backoff.
#[derive(Debug, Clone)]
pub struct WsSubscriberConfig {
    pub channel_capacity: usize,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl Default for WsSubscriberConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 512,
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

/// Log subscriber backed by a JSON-RPC WebSocket endpoint.
pub struct WsLogSubscriber {
    url: String,
    config: WsSubscriberConfig,
}

impl WsLogSubscriber {
    pub fn new(url: impl Into<String>, config: WsSubscriberConfig) -> Self {
        Self {
            url: url.into(),
            config,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LogSubscriber for WsLogSubscriber {
    async fn subscribe(&self, filter: &LogFilter) -> Result<LogSubscription, SubscriptionError> {
        let (ws, sub_id) = connect_and_subscribe(&self.url, filter).await?;
        info!(url = %self.url, subscription = %sub_id, event = filter.event.name(), "subscribed to logs");

        let capacity = self.config.channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(capacity);
        let stop = CancellationToken::new();

        let pump = Pump {
            url: self.url.clone(),
            filter: filter.clone(),
            config: self.config.clone(),
            events: event_tx,
            errors: error_tx,
            stop: stop.clone(),
        };
        tokio::spawn(pump.run(ws));

        Ok(LogSubscription::new(event_rx, error_rx, stop))
    }
}

/// Open the socket and wait for the `eth_subscribe` reply.
async fn connect_and_subscribe(
    url: &str,
    filter: &LogFilter,
) -> Result<(WsStream, String), SubscriptionError> {
    let (mut ws, _) = connect_async(url).await.map_err(|e| SubscriptionError::Connect {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let request = json!({
        "jsonrpc": "2.0",
        "id": SUBSCRIBE_ID,
        "method": "eth_subscribe",
        "params": ["logs", filter.to_params()],
    });
    ws.send(Message::Text(request.to_string()))
        .await
        .map_err(|e| SubscriptionError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    while let Some(msg) = ws.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Ping(payload)) => {
                let _ = ws.send(Message::Pong(payload)).await;
                continue;
            }
            Ok(Message::Close(_)) => return Err(SubscriptionError::Closed),
            Ok(_) => continue,
            Err(e) => {
                return Err(SubscriptionError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let reply: Value = serde_json::from_str(&text)
            .map_err(|e| SubscriptionError::Decode(format!("eth_subscribe reply: {e}")))?;
        if reply.get("id").and_then(Value::as_u64) != Some(SUBSCRIBE_ID) {
            continue;
        }
        if let Some(error) = reply.get("error") {
            return Err(SubscriptionError::Rpc(rpc_error_message(error)));
        }
        return match reply.get("result").and_then(Value::as_str) {
            Some(id) => Ok((ws, id.to_string())),
            None => Err(SubscriptionError::Rpc(format!(
                "eth_subscribe returned no subscription id: {reply}"
            ))),
        };
    }
    Err(SubscriptionError::Closed)
}

fn rpc_error_message(error: &Value) -> String {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    format!("{code}: {message}")
}

/// What one inbound text frame turned out to be.
#[derive(Debug)]
enum Inbound {
    Log(Result<Value, SubscriptionError>),
    Removed,
    RpcError(String),
    Other,
}

fn classify(text: &str, filter: &LogFilter) -> Inbound {
    let msg: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Inbound::Log(Err(SubscriptionError::Decode(e.to_string()))),
    };

    if let Some(error) = msg.get("error") {
        return Inbound::RpcError(rpc_error_message(error));
    }
    if msg.get("method").and_then(Value::as_str) != Some("eth_subscription") {
        return Inbound::Other;
    }
    let Some(result) = msg.get("params").and_then(|p| p.get("result")) else {
        return Inbound::Log(Err(SubscriptionError::Decode(
            "eth_subscription without params.result".into(),
        )));
    };
    let log: RawLog = match serde_json::from_value(result.clone()) {
        Ok(log) => log,
        Err(e) => return Inbound::Log(Err(SubscriptionError::Decode(e.to_string()))),
    };
    if log.removed {
        return Inbound::Removed;
    }
    Inbound::Log(filter.event.decode_log(&log))
}

/// Why the socket loop ended.
enum Disconnect {
    Stopped,
    Lost(String),
}

struct Pump {
    url: String,
    filter: LogFilter,
    config: WsSubscriberConfig,
    events: mpsc::Sender<DecodedLog>,
    errors: mpsc::Sender<SubscriptionError>,
    stop: CancellationToken,
}

impl Pump {
    async fn run(self, mut ws: WsStream) {
        loop {
            let reason = match self.drain(&mut ws).await {
                Disconnect::Stopped => {
                    let _ = ws.close(None).await;
                    debug!(url = %self.url, "log subscription stopped");
                    return;
                }
                Disconnect::Lost(reason) => reason,
            };
            warn!(url = %self.url, %reason, "log subscription connection lost");
            self.report(SubscriptionError::Connect {
                url: self.url.clone(),
                reason,
            });

            ws = match self.reconnect().await {
                Some(ws) => ws,
                None => return,
            };
        }
    }

    /// Forward frames until the connection drops or the consumer goes away.
    async fn drain(&self, ws: &mut WsStream) -> Disconnect {
        loop {
            let msg = tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Disconnect::Stopped,
                _ = self.events.closed() => return Disconnect::Stopped,
                msg = ws.next() => msg,
            };
            let received_at = Instant::now();

            let text = match msg {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{}: {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "closed by server".into());
                    return Disconnect::Lost(reason);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Disconnect::Lost(e.to_string()),
                None => return Disconnect::Lost("stream ended".into()),
            };

            match classify(&text, &self.filter) {
                Inbound::Log(Ok(payload)) => {
                    let log = DecodedLog {
                        payload,
                        received_at,
                    };
                    tokio::select! {
                        biased;
                        _ = self.stop.cancelled() => return Disconnect::Stopped,
                        sent = self.events.send(log) => {
                            if sent.is_err() {
                                return Disconnect::Stopped;
                            }
                        }
                    }
                }
                Inbound::Log(Err(e)) => self.report(e),
                Inbound::RpcError(message) => self.report(SubscriptionError::Rpc(message)),
                Inbound::Removed => debug!("skipping removed log"),
                Inbound::Other => {}
            }
        }
    }

    /// Reconnect with exponential backoff; `None` once stopped.
    async fn reconnect(&self) -> Option<WsStream> {
        let mut backoff = self.config.reconnect_initial;
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }

            let attempt = tokio::select! {
                biased;
                _ = self.stop.cancelled() => return None,
                attempt = connect_and_subscribe(&self.url, &self.filter) => attempt,
            };
            match attempt {
                Ok((ws, sub_id)) => {
                    info!(url = %self.url, subscription = %sub_id, "log subscription re-established");
                    return Some(ws);
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "resubscribe failed, retrying in {backoff:?}");
                    self.report(e);
                    backoff = (backoff * 2).min(self.config.reconnect_max);
                }
            }
        }
    }

    fn report(&self, error: SubscriptionError) {
        if let Err(e) = self.errors.try_send(error) {
            debug!(error = %e, "dropping subscription error, channel unavailable");
        }
    }
}
