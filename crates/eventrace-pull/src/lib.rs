//! eventrace-pull — watcher for the JSON-RPC log-subscription provider.
//!
//! # Features
//! - Event ABI handling: canonical signature, topic0, log decoding
//! - [`LogSubscriber`] capability yielding a decoded-event channel and a
//!   parallel error channel
//! - WebSocket `eth_subscribe("logs")` subscriber that reconnects and
//!   resubscribes on its own
//! - [`PullWatcher`] multiplexing events, errors and cancellation

pub mod abi;
pub mod config;
pub mod error;
pub mod infura;
pub mod subscription;
pub mod watcher;
pub mod ws_subscriber;

pub use abi::{EventAbi, RawLog};
pub use config::PullConfig;
pub use error::SubscriptionError;
pub use subscription::{DecodedLog, LogFilter, LogSubscriber, LogSubscription};
pub use watcher::PullWatcher;
pub use ws_subscriber::{WsLogSubscriber, WsSubscriberConfig};
