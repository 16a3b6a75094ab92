//! Observed events and the sinks they are handed to.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The delivery channel an event was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Streaming subscription service with its own configure/subscribe protocol.
    Push,
    /// JSON-RPC `eth_subscribe("logs")` endpoint.
    Pull,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// One occurrence observed on one source.
///
/// Immutable once built. `observed_at` is the monotonic instant the
/// watcher's receive call returned; `observed_at_ms` is the matching wall
/// clock reading so logs from both sources can be lined up.
#[derive(Debug, Clone)]
pub struct Event {
    source: Source,
    payload: Value,
    observed_at: Instant,
    observed_at_ms: u64,
}

impl Event {
    /// Build an event observed at `observed_at`.
    pub fn new(source: Source, payload: Value, observed_at: Instant) -> Self {
        let wall = SystemTime::now()
            .checked_sub(observed_at.elapsed())
            .unwrap_or_else(SystemTime::now);
        let observed_at_ms = wall
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;
        Self {
            source,
            payload,
            observed_at,
            observed_at_ms,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn observed_at(&self) -> Instant {
        self.observed_at
    }

    /// Wall-clock observation time in unix milliseconds.
    pub fn observed_at_ms(&self) -> u64 {
        self.observed_at_ms
    }
}

/// Write-only destination for observed events.
///
/// Shared by every watcher, so implementations must tolerate concurrent calls.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Logs every event at INFO through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        tracing::info!(
            source = %event.source,
            observed_at_ms = event.observed_at_ms,
            payload = %event.payload,
            "event observed"
        );
    }
}

/// Keeps every emitted event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in emission order.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
