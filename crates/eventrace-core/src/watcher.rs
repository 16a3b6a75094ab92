//! The `Watcher` trait — one unit of execution per event source.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;
use crate::event::Source;

/// Continuously observes one event source until cancelled.
///
/// Implementations keep their protocol state machine private; the only
/// shared surface is [`Watcher::run`].
#[async_trait]
pub trait Watcher: Send + Sync + 'static {
    /// Name used for the watcher's log span.
    fn name(&self) -> &str;

    /// The source this watcher reports events as.
    fn source(&self) -> Source;

    /// Run until `cancel` fires (`Ok`) or an unrecoverable failure (`Err`).
    ///
    /// Every suspension point must observe `cancel`, so that a cancelled
    /// watcher returns promptly even when its remote is silent.
    async fn run(&self, cancel: CancellationToken) -> Result<(), WatchError>;
}

/// Drive `fut` unless `cancel` fires first.
///
/// Returns `None` when cancelled. Cancellation wins ties, so an
/// already-cancelled token never polls `fut`.
pub async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
