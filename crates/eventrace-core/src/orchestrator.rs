//! `Orchestrator` — runs every watcher under one cancellation token.
//!
//! # Lifecycle
//! 1. `start` spawns one Tokio task per watcher, each instrumented with a
//!    `watcher` span carrying the watcher's name.
//! 2. It then waits for the shutdown trigger (or for the shared token to be
//!    cancelled through [`Orchestrator::cancel_handle`]).
//! 3. The token is cancelled once and every task is joined before `start`
//!    returns.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::WatchError;
use crate::watcher::Watcher;

/// How a watcher task ended.
#[derive(Debug)]
pub enum ExitOutcome {
    /// `run` returned `Ok`.
    Completed,
    /// `run` returned an error.
    Failed(WatchError),
    /// The watcher task panicked.
    Panicked(String),
}

/// One watcher's exit record.
#[derive(Debug)]
pub struct WatcherExit {
    pub name: String,
    pub outcome: ExitOutcome,
}

impl WatcherExit {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, ExitOutcome::Completed)
    }
}

/// Owns the watchers and the shared cancellation token.
#[derive(Default)]
pub struct Orchestrator {
    watchers: Vec<Arc<dyn Watcher>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watcher (builder form).
    pub fn with_watcher(mut self, watcher: Arc<dyn Watcher>) -> Self {
        self.watchers.push(watcher);
        self
    }

    /// Register a watcher.
    pub fn add_watcher(&mut self, watcher: Arc<dyn Watcher>) {
        self.watchers.push(watcher);
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// A clone of the shared token. Cancelling it has the same effect as the
    /// shutdown trigger firing.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run all watchers until `shutdown` completes, then cancel and join them.
    ///
    /// Never returns before every watcher task has exited.
    pub async fn start<F>(self, shutdown: F) -> Vec<WatcherExit>
    where
        F: Future<Output = ()> + Send,
    {
        info!(watchers = self.watchers.len(), "starting watchers");

        let mut tasks = JoinSet::new();
        for watcher in &self.watchers {
            let watcher = Arc::clone(watcher);
            let token = self.cancel.clone();
            let name = watcher.name().to_string();
            let span = info_span!("watcher", name = %name, source = %watcher.source());

            tasks.spawn(
                async move {
                    info!("starting event watcher");
                    let result = AssertUnwindSafe(watcher.run(token)).catch_unwind().await;
                    let outcome = match result {
                        Ok(Ok(())) => ExitOutcome::Completed,
                        Ok(Err(e)) => ExitOutcome::Failed(e),
                        Err(panic) => ExitOutcome::Panicked(panic_message(panic)),
                    };
                    WatcherExit { name, outcome }
                }
                .instrument(span),
            );
        }

        let mut exits = Vec::with_capacity(self.watchers.len());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
                _ = self.cancel.cancelled() => {
                    info!("cancellation requested");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    let exit = record(joined);
                    warn!(name = %exit.name, "watcher exited before shutdown");
                    exits.push(exit);
                }
            }
        }

        self.cancel.cancel();

        while let Some(joined) = tasks.join_next().await {
            exits.push(record(joined));
        }

        info!(watchers = exits.len(), "all watchers stopped");
        exits
    }
}

fn record(joined: Result<WatcherExit, tokio::task::JoinError>) -> WatcherExit {
    let exit = joined.unwrap_or_else(|e| WatcherExit {
        name: "<unknown>".into(),
        outcome: ExitOutcome::Panicked(e.to_string()),
    });
    match &exit.outcome {
        ExitOutcome::Completed => info!(name = %exit.name, "watcher finished"),
        ExitOutcome::Failed(e) => error!(name = %exit.name, error = %e, "watcher failed"),
        ExitOutcome::Panicked(msg) => error!(name = %exit.name, panic = %msg, "watcher panicked"),
    }
    exit
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
