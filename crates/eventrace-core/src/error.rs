//! Watcher-level error types.

use thiserror::Error;

/// Errors a watcher can end with.
///
/// Every error is handled at the watcher boundary: the orchestrator logs it
/// and keeps the other watchers running.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Initial transport setup failed.
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    /// The remote dropped the connection without a close handshake.
    #[error("connection closed abnormally: {0}")]
    AbnormalClosure(String),

    /// Unexpected or undecodable message from a provider.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The pull-side subscription failed.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// The watcher was configured with values it cannot use.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl WatchError {
    /// Returns `true` for the one condition a watcher may recover from.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AbnormalClosure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_abnormal_closure_is_recoverable() {
        assert!(WatchError::AbnormalClosure("reset".into()).is_recoverable());
        assert!(!WatchError::Protocol("bad ack".into()).is_recoverable());
        assert!(!WatchError::Connect {
            endpoint: "wss://test/v0".into(),
            reason: "refused".into(),
        }
        .is_recoverable());
    }

    #[test]
    fn connect_error_names_endpoint() {
        let err = WatchError::Connect {
            endpoint: "wss://api.blocknative.com/v0".into(),
            reason: "dns".into(),
        };
        assert_eq!(
            err.to_string(),
            "connect to wss://api.blocknative.com/v0 failed: dns"
        );
    }
}
