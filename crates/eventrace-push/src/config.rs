//! Push watcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use eventrace_core::WatchError;

use crate::session::{ApiKey, Endpoint};

/// Network identity sent with every push-provider message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkId {
    #[serde(default = "default_system")]
    pub system: String,
    #[serde(default = "default_network")]
    pub network: String,
}

fn default_system() -> String { "ethereum".into() }
fn default_network() -> String { "main".into() }

impl Default for NetworkId {
    fn default() -> Self {
        Self {
            system: default_system(),
            network: default_network(),
        }
    }
}

/// Configuration for a [`PushWatcher`](crate::PushWatcher).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub endpoint: Endpoint,
    pub api_key: ApiKey,
    #[serde(default)]
    pub network: NetworkId,
    /// Delay before the single reconnect attempt (0 = reconnect immediately).
    #[serde(default)]
    pub reconnect_delay_ms: u64,
    /// Stop streaming after this many consecutive non-fatal receive errors
    /// (`None` = never).
    #[serde(default)]
    pub max_consecutive_errors: Option<u32>,
}

impl PushConfig {
    pub fn new(endpoint: Endpoint, api_key: ApiKey) -> Self {
        Self {
            endpoint,
            api_key,
            network: NetworkId::default(),
            reconnect_delay_ms: 0,
            max_consecutive_errors: None,
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn validate(&self) -> Result<(), WatchError> {
        if self.api_key.is_empty() {
            return Err(WatchError::Config("push provider API key is empty".into()));
        }
        self.endpoint
            .url()
            .map_err(|e| WatchError::Config(e.to_string()))?;
        Ok(())
    }
}
