//! The subscription filter applied to every source.

use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// ABI fragment of the `LOG_SWAP` event emitted by Balancer-style pools.
pub const LOG_SWAP_ABI: &str = r#"{"anonymous":false,"inputs":[{"indexed":true,"internalType":"address","name":"caller","type":"address"},{"indexed":true,"internalType":"address","name":"tokenIn","type":"address"},{"indexed":true,"internalType":"address","name":"tokenOut","type":"address"},{"indexed":false,"internalType":"uint256","name":"tokenAmountIn","type":"uint256"},{"indexed":false,"internalType":"uint256","name":"tokenAmountOut","type":"uint256"}],"name":"LOG_SWAP","type":"event"}"#;

/// Target contract plus the event ABI fragments to watch.
///
/// The same value is handed to every watcher so that both sources look
/// for the identical occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// Hex contract address, `0x`-prefixed.
    pub address: String,
    /// Raw event ABI fragments.
    pub abi: Vec<String>,
}

impl SubscriptionFilter {
    pub fn new(address: impl Into<String>, abi: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            address: address.into(),
            abi: abi.into_iter().map(Into::into).collect(),
        }
    }

    /// Reject filters no provider can act on.
    pub fn validate(&self) -> Result<(), WatchError> {
        let hex = self
            .address
            .strip_prefix("0x")
            .ok_or_else(|| WatchError::Config(format!("address {:?} is not 0x-prefixed", self.address)))?;
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WatchError::Config(format!(
                "address {:?} is not hex",
                self.address
            )));
        }
        if self.abi.iter().all(|f| f.trim().is_empty()) {
            return Err(WatchError::Config("no event ABI fragment configured".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_filter() {
        let f = SubscriptionFilter::new("0xABC", ["LOG_SWAP"]);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn rejects_unprefixed_address() {
        let f = SubscriptionFilter::new("abc", [LOG_SWAP_ABI]);
        assert!(matches!(f.validate(), Err(WatchError::Config(_))));
    }

    #[test]
    fn rejects_non_hex_address() {
        let f = SubscriptionFilter::new("0xZZ", [LOG_SWAP_ABI]);
        assert!(f.validate().is_err());
    }

    #[test]
    fn rejects_empty_abi() {
        let f = SubscriptionFilter::new("0xabc", Vec::<String>::new());
        assert!(f.validate().is_err());
    }

    #[test]
    fn log_swap_fragment_is_json() {
        let v: serde_json::Value = serde_json::from_str(LOG_SWAP_ABI).unwrap();
        assert_eq!(v["name"], "LOG_SWAP");
        assert_eq!(v["inputs"].as_array().unwrap().len(), 5);
    }
}
