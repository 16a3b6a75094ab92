//! `PullWatcher` — multiplexes the subscription's event and error channels
//! with cancellation.
//!
//! The subscription heals itself; this watcher only consumes it. Errors
//! on the error channel are logged and the loop continues.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use eventrace_core::{until_cancelled, Event, EventSink, Source, SubscriptionFilter, WatchError, Watcher};

use crate::abi::EventAbi;
use crate::error::SubscriptionError;
use crate::subscription::{LogFilter, LogSubscriber, LogSubscription};

/// Watches the pull provider through a [`LogSubscriber`].
pub struct PullWatcher<S: LogSubscriber> {
    name: String,
    subscriber: S,
    filter: SubscriptionFilter,
    sink: Arc<dyn EventSink>,
}

impl<S: LogSubscriber> PullWatcher<S> {
    pub fn new(
        name: impl Into<String>,
        subscriber: S,
        filter: SubscriptionFilter,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name: name.into(),
            subscriber,
            filter,
            sink,
        }
    }

    fn log_filter(&self) -> Result<LogFilter, SubscriptionError> {
        let event = EventAbi::first_of(self.filter.abi.iter().map(String::as_str))?;
        Ok(LogFilter::new(self.filter.address.clone(), event))
    }

    async fn consume(&self, sub: &mut LogSubscription, cancel: &CancellationToken) -> Result<(), WatchError> {
        let mut errors_open = true;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                received = sub.events.recv() => {
                    let Some(log) = received else {
                        return Err(SubscriptionError::Closed.into());
                    };
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    self.sink.emit(Event::new(Source::Pull, log.payload, log.received_at));
                }
                failure = sub.errors.recv(), if errors_open => match failure {
                    Some(e) => warn!(error = %e, "subscription error, continuing"),
                    None => errors_open = false,
                },
            }
        }
    }
}

#[async_trait]
impl<S: LogSubscriber> Watcher for PullWatcher<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Source {
        Source::Pull
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), WatchError> {
        info!(address = %self.filter.address, "starting pull event watcher");

        let filter = self.log_filter().map_err(|e| {
            error!(error = %e, "no usable event ABI");
            WatchError::from(e)
        })?;

        let mut sub = match until_cancelled(&cancel, self.subscriber.subscribe(&filter)).await {
            None => {
                info!("exiting, goodbye...");
                return Ok(());
            }
            Some(Ok(sub)) => sub,
            Some(Err(e)) => {
                error!(error = %e, "failed to subscribe");
                return Err(e.into());
            }
        };
        info!(event = filter.event.signature(), topic0 = filter.event.topic0(), "watching logs");

        let result = self.consume(&mut sub, &cancel).await;
        sub.unsubscribe();
        match &result {
            Ok(()) => info!("exiting, goodbye..."),
            Err(e) => error!(error = %e, "pull watcher terminated"),
        }
        result
    }
}
