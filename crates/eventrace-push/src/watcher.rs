//! `PushWatcher` — protocol driver and reconnect state machine.
//!
//! # States
//! ```text
//! Disconnected → Connecting → Configuring → Subscribing → Streaming
//!                    ▲                                        │ abnormal closure
//!                    └────────────── Reconnecting ◄───────────┘
//! ```
//! Any failure while connecting, configuring or subscribing ends in
//! `Terminated`, including during a reconnect, so each abnormal closure
//! buys exactly one reconnect attempt. During streaming only an abnormal
//! closure triggers a reconnect; decode and transport hiccups are logged
//! and the loop continues.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use eventrace_core::{until_cancelled, Event, EventSink, Source, SubscriptionFilter, WatchError, Watcher};

use crate::config::PushConfig;
use crate::protocol::{ClientMessage, PushNotification};
use crate::session::{Connector, SessionError, TransportSession};

/// Lifecycle state of a [`PushWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Disconnected,
    Connecting,
    Configuring,
    Subscribing,
    Streaming,
    Reconnecting,
    Terminated,
}

impl std::fmt::Display for PushState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Configuring => "configuring",
            Self::Subscribing => "subscribing",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Why the streaming loop stopped.
enum StreamExit {
    Cancelled,
    Abnormal(SessionError),
    Failed(WatchError),
}

/// Watches the push provider over sessions opened by `C`.
pub struct PushWatcher<C: Connector> {
    name: String,
    connector: C,
    config: PushConfig,
    filter: SubscriptionFilter,
    sink: Arc<dyn EventSink>,
    state: watch::Sender<PushState>,
}

impl<C: Connector> PushWatcher<C> {
    pub fn new(
        name: impl Into<String>,
        connector: C,
        config: PushConfig,
        filter: SubscriptionFilter,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (state, _) = watch::channel(PushState::Disconnected);
        Self {
            name: name.into(),
            connector,
            config,
            filter,
            sink,
            state,
        }
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<PushState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> PushState {
        *self.state.borrow()
    }

    fn set_state(&self, next: PushState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "push state change");
        }
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<(), WatchError> {
        let Some(mut session) = self.establish(cancel).await? else {
            return Ok(());
        };

        loop {
            match self.stream(&mut session, cancel).await {
                StreamExit::Cancelled => {
                    session.close().await;
                    return Ok(());
                }
                StreamExit::Failed(e) => {
                    session.close().await;
                    return Err(e);
                }
                StreamExit::Abnormal(e) => {
                    self.set_state(PushState::Reconnecting);
                    warn!(session = %session.id(), error = %e, "abnormal closure, reconnecting");
                    session.close().await;
                    drop(session);

                    let delay = self.config.reconnect_delay();
                    if !delay.is_zero() && until_cancelled(cancel, tokio::time::sleep(delay)).await.is_none() {
                        return Ok(());
                    }

                    session = match self.establish(cancel).await? {
                        Some(s) => s,
                        None => return Ok(()),
                    };
                }
            }
        }
    }

    /// Open a session and run the configure/subscribe handshake on it.
    ///
    /// `Ok(None)` means cancellation arrived first; nothing is left open.
    async fn establish(&self, cancel: &CancellationToken) -> Result<Option<C::Session>, WatchError> {
        self.set_state(PushState::Connecting);
        let opened = until_cancelled(cancel, self.connector.open(&self.config.endpoint, &self.config.api_key)).await;
        let mut session = match opened {
            None => return Ok(None),
            Some(Ok(s)) => s,
            Some(Err(e)) => {
                error!(endpoint = %self.config.endpoint, error = %e, "failed to connect");
                return Err(e.into());
            }
        };
        info!(session = %session.id(), endpoint = %self.config.endpoint, "session opened");

        match self.handshake(&mut session, cancel).await {
            Ok(true) => Ok(Some(session)),
            Ok(false) => {
                session.close().await;
                Ok(None)
            }
            Err(e) => {
                error!(session = %session.id(), error = %e, "session setup failed");
                session.close().await;
                Err(e.into())
            }
        }
    }

    async fn handshake(&self, session: &mut C::Session, cancel: &CancellationToken) -> Result<bool, SessionError> {
        let key = &self.config.api_key;
        let network = &self.config.network;

        self.set_state(PushState::Configuring);
        let configure = ClientMessage::configure(key, network, &self.filter);
        if !exchange(session, &configure, cancel).await? {
            return Ok(false);
        }

        self.set_state(PushState::Subscribing);
        let subscribe = ClientMessage::subscribe(key, network, &self.filter);
        exchange(session, &subscribe, cancel).await
    }

    async fn stream(&self, session: &mut C::Session, cancel: &CancellationToken) -> StreamExit {
        self.set_state(PushState::Streaming);
        info!(session = %session.id(), address = %self.filter.address, "streaming events");

        let mut consecutive_errors = 0u32;
        loop {
            if cancel.is_cancelled() {
                return StreamExit::Cancelled;
            }
            let Some(received) = until_cancelled(cancel, session.receive_as::<PushNotification>()).await else {
                return StreamExit::Cancelled;
            };
            let observed_at = Instant::now();

            match received {
                Ok(notification) => {
                    consecutive_errors = 0;
                    self.sink
                        .emit(Event::new(Source::Push, notification.into_payload(), observed_at));
                }
                Err(e) if e.is_abnormal_closure() => return StreamExit::Abnormal(e),
                Err(e) if e.is_terminal() => {
                    warn!(session = %session.id(), error = %e, "session ended");
                    return StreamExit::Failed(e.into());
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(session = %session.id(), error = %e, consecutive_errors, "receive error, continuing");
                    if let Some(limit) = self.config.max_consecutive_errors {
                        if consecutive_errors >= limit {
                            return StreamExit::Failed(WatchError::Protocol(format!(
                                "{consecutive_errors} consecutive receive errors, last: {e}"
                            )));
                        }
                    }
                }
            }
        }
    }
}

/// Send one control message, then consume the single acknowledgment that
/// answers it. The acknowledgment is not inspected.
///
/// Returns `Ok(false)` if cancelled part-way.
async fn exchange<S, M>(session: &mut S, message: &M, cancel: &CancellationToken) -> Result<bool, SessionError>
where
    S: TransportSession,
    M: Serialize + Sync,
{
    match until_cancelled(cancel, session.send(message)).await {
        None => return Ok(false),
        Some(sent) => sent?,
    }
    match until_cancelled(cancel, session.receive_ignore()).await {
        None => Ok(false),
        Some(acked) => acked.map(|()| true),
    }
}

#[async_trait]
impl<C: Connector> Watcher for PushWatcher<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> Source {
        Source::Push
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), WatchError> {
        info!(endpoint = %self.config.endpoint, "starting push event watcher");
        let result = self.drive(&cancel).await;
        self.set_state(PushState::Terminated);
        match &result {
            Ok(()) => info!("exiting, goodbye..."),
            Err(e) => error!(error = %e, "push watcher terminated"),
        }
        result
    }
}
