//! Push provider wire messages.
//!
//! The client sends exactly two control messages, each answered by one
//! acknowledgment the client consumes without validating:
//! 1. `configs/put` — network identity plus the event ABI fragments to watch
//! 2. `accountAddress/watch` — the contract address to follow
//!
//! Everything after that is server-to-client notifications.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use eventrace_core::SubscriptionFilter;

use crate::config::NetworkId;
use crate::session::ApiKey;

/// Protocol version string sent with every message.
pub const PROTOCOL_VERSION: &str = "1";

/// Fields common to every client message.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub time_stamp: String,
    pub dapp_id: String,
    pub version: String,
    pub blockchain: NetworkId,
    pub category_code: String,
    pub event_code: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScopeConfig {
    pub scope: String,
    pub abi: Vec<String>,
    pub watch_address: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Account {
    pub address: String,
}

/// A client-to-server control message.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ClientMessage {
    Configure {
        #[serde(flatten)]
        envelope: Envelope,
        config: ScopeConfig,
    },
    Subscribe {
        #[serde(flatten)]
        envelope: Envelope,
        account: Account,
    },
}

impl ClientMessage {
    /// The "set event filters" message.
    pub fn configure(api_key: &ApiKey, network: &NetworkId, filter: &SubscriptionFilter) -> Self {
        Self::Configure {
            envelope: envelope(api_key, network, "configs", "put"),
            config: ScopeConfig {
                scope: filter.address.clone(),
                abi: filter.abi.clone(),
                watch_address: true,
            },
        }
    }

    /// The "address subscribe" message.
    pub fn subscribe(api_key: &ApiKey, network: &NetworkId, filter: &SubscriptionFilter) -> Self {
        Self::Subscribe {
            envelope: envelope(api_key, network, "accountAddress", "watch"),
            account: Account {
                address: filter.address.clone(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configure { .. } => "configure",
            Self::Subscribe { .. } => "subscribe",
        }
    }
}

fn envelope(api_key: &ApiKey, network: &NetworkId, category: &str, event: &str) -> Envelope {
    Envelope {
        time_stamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        dapp_id: api_key.expose().to_string(),
        version: PROTOCOL_VERSION.into(),
        blockchain: network.clone(),
        category_code: category.into(),
        event_code: event.into(),
    }
}

/// A steady-state server notification.
///
/// Only `event` is required; a message without it (an error report, a
/// stray acknowledgment) fails to decode.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    #[serde(default)]
    pub time_stamp: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub event: Value,
}

impl PushNotification {
    /// Event payload handed to the sink.
    pub fn into_payload(self) -> Value {
        serde_json::json!({
            "timeStamp": self.time_stamp,
            "status": self.status,
            "event": self.event,
        })
    }
}
