//! Subscription error types.

use thiserror::Error;

use eventrace_core::WatchError;

/// Errors from the pull-side log subscription.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    /// Could not reach the RPC endpoint.
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// The node answered with a JSON-RPC error.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// A log or message could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The configured ABI cannot be used.
    #[error("ABI error: {0}")]
    Abi(String),

    /// The subscription stream ended.
    #[error("subscription closed")]
    Closed,
}

impl From<SubscriptionError> for WatchError {
    fn from(e: SubscriptionError) -> Self {
        match e {
            SubscriptionError::Connect { url, reason } => WatchError::Connect { endpoint: url, reason },
            SubscriptionError::Abi(reason) => WatchError::Config(reason),
            other => WatchError::Subscription(other.to_string()),
        }
    }
}
