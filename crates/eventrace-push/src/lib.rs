//! eventrace-push — watcher for the push-style streaming provider.
//!
//! # Features
//! - [`TransportSession`] / [`Connector`] abstraction over one duplex JSON channel
//! - WebSocket implementation that tells an abnormal closure apart from a
//!   graceful close, a decode failure and other transport errors
//! - Bespoke configure → ack → subscribe → ack → stream protocol
//! - Single-attempt reconnect after an abnormal closure, with a full
//!   re-configure and re-subscribe

pub mod config;
pub mod protocol;
pub mod session;
pub mod watcher;
pub mod ws;

pub use config::{NetworkId, PushConfig};
pub use protocol::{ClientMessage, PushNotification};
pub use session::{ApiKey, Connector, Endpoint, SessionError, SessionId, TransportSession};
pub use watcher::{PushState, PushWatcher};
pub use ws::{WsConnector, WsSession};
