//! The log-subscription capability consumed by the pull watcher.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::abi::EventAbi;
use crate::error::SubscriptionError;

/// A decoded event, stamped when its notification arrived.
#[derive(Debug, Clone)]
pub struct DecodedLog {
    pub payload: Value,
    pub received_at: Instant,
}

/// Contract address plus the event to match.
#[derive(Debug, Clone)]
pub struct LogFilter {
    pub address: String,
    pub event: EventAbi,
}

impl LogFilter {
    pub fn new(address: impl Into<String>, event: EventAbi) -> Self {
        Self {
            address: address.into(),
            event,
        }
    }

    /// The filter object passed as the second `eth_subscribe("logs", ..)` param.
    pub fn to_params(&self) -> Value {
        let topics = if self.event.is_anonymous() {
            json!([])
        } else {
            json!([self.event.topic0()])
        };
        json!({ "address": self.address, "topics": topics })
    }
}

/// A live subscription: decoded events and errors arrive on separate
/// channels. Dropping it (or calling [`unsubscribe`](Self::unsubscribe))
/// stops the producer.
#[derive(Debug)]
pub struct LogSubscription {
    pub events: mpsc::Receiver<DecodedLog>,
    pub errors: mpsc::Receiver<SubscriptionError>,
    _guard: DropGuard,
}

impl LogSubscription {
    /// Ties the producer's lifetime to `stop`.
    pub fn new(
        events: mpsc::Receiver<DecodedLog>,
        errors: mpsc::Receiver<SubscriptionError>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            events,
            errors,
            _guard: stop.drop_guard(),
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

/// Something that can open a log subscription.
#[async_trait]
pub trait LogSubscriber: Send + Sync + 'static {
    async fn subscribe(&self, filter: &LogFilter) -> Result<LogSubscription, SubscriptionError>;
}
