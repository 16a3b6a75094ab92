//! Pull-provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use eventrace_core::WatchError;

use crate::infura;
use crate::ws_subscriber::WsSubscriberConfig;

fn default_network() -> String {
    "mainnet".into()
}

fn default_capacity() -> usize {
    512
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

/// Where and how the pull watcher subscribes.
///
/// `rpc_url`, when set, wins over the Infura URL derived from `api_key`
/// and `network`.
#[derive(Clone, Serialize, Deserialize)]
pub struct PullConfig {
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl std::fmt::Debug for PullConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullConfig")
            .field("rpc_url", &self.rpc_url.as_ref().map(|_| "***"))
            .field("api_key", &"***")
            .field("network", &self.network)
            .field("channel_capacity", &self.channel_capacity)
            .field("reconnect_initial_ms", &self.reconnect_initial_ms)
            .field("reconnect_max_ms", &self.reconnect_max_ms)
            .finish()
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            api_key: String::new(),
            network: default_network(),
            channel_capacity: default_capacity(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl PullConfig {
    pub fn infura(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// WebSocket endpoint to subscribe on.
    pub fn endpoint_url(&self) -> String {
        match &self.rpc_url {
            Some(url) => url.clone(),
            None => infura::ws_url(&self.api_key, &self.network),
        }
    }

    pub fn subscriber_config(&self) -> WsSubscriberConfig {
        WsSubscriberConfig {
            channel_capacity: self.channel_capacity,
            reconnect_initial: Duration::from_millis(self.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(self.reconnect_max_ms),
        }
    }

    pub fn validate(&self) -> Result<(), WatchError> {
        match &self.rpc_url {
            Some(url) if !(url.starts_with("ws://") || url.starts_with("wss://")) => {
                return Err(WatchError::Config(
                    "pull rpc_url must be a ws:// or wss:// URL".into(),
                ));
            }
            Some(_) => {}
            None if self.api_key.trim().is_empty() => {
                return Err(WatchError::Config(
                    "pull provider needs an api_key or an rpc_url".into(),
                ));
            }
            None => {}
        }
        if self.channel_capacity == 0 {
            return Err(WatchError::Config("channel_capacity must be at least 1".into()));
        }
        if self.reconnect_initial_ms > self.reconnect_max_ms {
            return Err(WatchError::Config(
                "reconnect_initial_ms exceeds reconnect_max_ms".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_infura_url() {
        let cfg: PullConfig = serde_json::from_str(r#"{"api_key":"abc"}"#).unwrap();
        assert_eq!(cfg.endpoint_url(), "wss://mainnet.infura.io/ws/v3/abc");
        assert_eq!(cfg.channel_capacity, 512);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rpc_url_overrides_infura() {
        let cfg = PullConfig {
            rpc_url: Some("ws://127.0.0.1:8546".into()),
            ..PullConfig::default()
        };
        assert_eq!(cfg.endpoint_url(), "ws://127.0.0.1:8546");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_credentials_rejected() {
        assert!(PullConfig::default().validate().is_err());

        let http = PullConfig {
            rpc_url: Some("https://rpc.example".into()),
            ..PullConfig::default()
        };
        assert!(http.validate().is_err());
    }

    #[test]
    fn debug_hides_key() {
        let cfg = PullConfig::infura("secret-key");
        assert!(!format!("{cfg:?}").contains("secret-key"));
    }
}
