//! Push watcher lifecycle against a scripted transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{eventually, FakeConnector, Reply};
use eventrace_core::{MemorySink, Orchestrator, Source, SubscriptionFilter, WatchError, Watcher};
use eventrace_push::{ApiKey, Endpoint, PushConfig, PushState, PushWatcher};

fn config() -> PushConfig {
    PushConfig::new(Endpoint::new("wss", "test", "/v0"), ApiKey::new("test-key"))
}

fn filter() -> SubscriptionFilter {
    SubscriptionFilter::new("0xABC", ["LOG_SWAP"])
}

fn watcher(connector: FakeConnector, sink: &Arc<MemorySink>) -> Arc<PushWatcher<FakeConnector>> {
    Arc::new(PushWatcher::new("blocknative", connector, config(), filter(), sink.clone()))
}

fn spawn_run(
    watcher: &Arc<PushWatcher<FakeConnector>>,
    token: &CancellationToken,
) -> tokio::task::JoinHandle<Result<(), WatchError>> {
    let watcher = Arc::clone(watcher);
    let token = token.clone();
    tokio::spawn(async move { watcher.run(token).await })
}

async fn join(handle: tokio::task::JoinHandle<Result<(), WatchError>>) -> Result<(), WatchError> {
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("run must return promptly")
        .expect("watcher task panicked")
}

#[tokio::test]
async fn abnormal_closure_reconnects_once_and_resumes() {
    let fake = FakeConnector::new(vec![
        vec![
            Reply::Ack,
            Reply::Ack,
            Reply::Event(json!({"n": 1})),
            Reply::Event(json!({"n": 2})),
            Reply::Abnormal,
        ],
        vec![Reply::Ack, Reply::Ack],
    ]);
    let sink = Arc::new(MemorySink::new());
    let push = watcher(fake.clone(), &sink);
    let token = CancellationToken::new();
    let handle = spawn_run(&push, &token);

    // Streaming again on the second session, blocked on a silent remote.
    eventually(|| fake.opens() == 2 && fake.shape().last().map(String::as_str) == Some("receive(pending)")).await;
    assert_eq!(push.current_state(), PushState::Streaming);

    token.cancel();
    assert!(join(handle).await.is_ok());

    assert_eq!(
        fake.shape(),
        vec![
            "open",
            "send(config)",
            "receive(ack)",
            "send(subscribe)",
            "receive(ack)",
            "receive(event)",
            "receive(event)",
            "receive(abnormal)",
            "close",
            "open",
            "send(config)",
            "receive(ack)",
            "send(subscribe)",
            "receive(ack)",
            "receive(pending)",
            "close",
        ]
    );

    let ids = fake.session_ids();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1], "reconnect must use a fresh session");

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.source() == Source::Push));
    assert_eq!(events[1].payload()["event"]["n"], 2);
    assert_eq!(push.current_state(), PushState::Terminated);
}

#[tokio::test]
async fn second_abnormal_closure_during_resubscribe_terminates() {
    let fake = FakeConnector::new(vec![
        vec![Reply::Ack, Reply::Ack, Reply::Abnormal],
        vec![Reply::Ack, Reply::Abnormal],
    ]);
    let sink = Arc::new(MemorySink::new());
    let push = watcher(fake.clone(), &sink);

    let result = tokio::time::timeout(Duration::from_secs(2), push.run(CancellationToken::new()))
        .await
        .expect("watcher must not loop forever");

    assert!(matches!(result, Err(WatchError::AbnormalClosure(_))));
    assert_eq!(fake.opens(), 2, "exactly one reconnect attempt");
    assert_eq!(fake.closes(), 2);
    assert_eq!(push.current_state(), PushState::Terminated);
}

#[tokio::test]
async fn non_abnormal_errors_keep_streaming() {
    let fake = FakeConnector::new(vec![vec![
        Reply::Ack,
        Reply::Ack,
        Reply::Garbage,
        Reply::Hiccup,
        Reply::Event(json!({"n": 1})),
        Reply::Garbage,
    ]]);
    let sink = Arc::new(MemorySink::new());
    let push = watcher(fake.clone(), &sink);
    let mut states = push.state();
    let token = CancellationToken::new();
    let handle = spawn_run(&push, &token);

    eventually(|| fake.shape().last().map(String::as_str) == Some("receive(pending)")).await;

    assert_eq!(*states.borrow_and_update(), PushState::Streaming);
    assert!(!handle.is_finished());
    assert_eq!(fake.opens(), 1);
    assert_eq!(sink.len(), 1);

    token.cancel();
    assert!(join(handle).await.is_ok());
    assert_eq!(fake.closes(), 1);
}

#[tokio::test]
async fn initial_connect_failure_is_not_retried() {
    let fake = FakeConnector::new(vec![]).fail_open(0);
    let sink = Arc::new(MemorySink::new());
    let push = watcher(fake.clone(), &sink);

    let result = push.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(WatchError::Connect { .. })));
    assert_eq!(fake.shape(), vec!["open-failed"]);
    assert_eq!(push.current_state(), PushState::Terminated);
}

#[tokio::test]
async fn failed_reconnect_open_terminates() {
    let fake = FakeConnector::new(vec![vec![Reply::Ack, Reply::Ack, Reply::Abnormal]]).fail_open(1);
    let sink = Arc::new(MemorySink::new());
    let push = watcher(fake.clone(), &sink);

    let result = push.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(WatchError::Connect { .. })));
    assert_eq!(fake.opens(), 1);
    assert_eq!(fake.closes(), 1);
}

#[tokio::test]
async fn cancel_while_waiting_for_ack() {
    // No scripted replies: the configure acknowledgment never arrives.
    let fake = FakeConnector::new(vec![vec![]]);
    let sink = Arc::new(MemorySink::new());
    let push = watcher(fake.clone(), &sink);
    let token = CancellationToken::new();
    let handle = spawn_run(&push, &token);

    eventually(|| fake.shape().last().map(String::as_str) == Some("receive(pending)")).await;
    assert_eq!(push.current_state(), PushState::Configuring);

    token.cancel();
    assert!(join(handle).await.is_ok());
    assert_eq!(fake.opens(), fake.closes());
}

#[tokio::test]
async fn graceful_close_ends_the_watcher() {
    let fake = FakeConnector::new(vec![vec![Reply::Ack, Reply::Ack, Reply::Graceful]]);
    let sink = Arc::new(MemorySink::new());
    let push = watcher(fake.clone(), &sink);

    let result = push.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(WatchError::Protocol(_))));
    assert_eq!(fake.opens(), 1, "graceful close is not an abnormal closure");
    assert_eq!(fake.closes(), 1);
}

#[tokio::test]
async fn error_budget_stops_a_poisoned_stream() {
    let fake = FakeConnector::new(vec![vec![
        Reply::Ack,
        Reply::Ack,
        Reply::Garbage,
        Reply::Event(json!({})),
        Reply::Garbage,
        Reply::Garbage,
        Reply::Garbage,
    ]]);
    let sink = Arc::new(MemorySink::new());
    let mut cfg = config();
    cfg.max_consecutive_errors = Some(3);
    let push = PushWatcher::new("blocknative", fake.clone(), cfg, filter(), sink.clone());

    let result = tokio::time::timeout(Duration::from_secs(2), push.run(CancellationToken::new()))
        .await
        .unwrap();

    assert!(matches!(result, Err(WatchError::Protocol(_))));
    assert_eq!(sink.len(), 1);
    assert_eq!(fake.closes(), 1);
}

#[tokio::test]
async fn reconnect_delay_is_cancellable() {
    let fake = FakeConnector::new(vec![vec![Reply::Ack, Reply::Ack, Reply::Abnormal]]);
    let sink = Arc::new(MemorySink::new());
    let mut cfg = config();
    cfg.reconnect_delay_ms = 60_000;
    let push = Arc::new(PushWatcher::new("blocknative", fake.clone(), cfg, filter(), sink.clone()));
    let token = CancellationToken::new();
    let handle = spawn_run(&push, &token);

    eventually(|| fake.closes() == 1).await;
    assert_eq!(push.current_state(), PushState::Reconnecting);

    token.cancel();
    assert!(join(handle).await.is_ok());
    assert_eq!(fake.opens(), 1);
}

#[tokio::test]
async fn orchestrator_shutdown_leaves_no_open_session() {
    let fake = FakeConnector::new(vec![
        vec![Reply::Ack, Reply::Ack, Reply::Event(json!({"n": 1}))],
        vec![Reply::Ack, Reply::Ack],
    ]);
    let sink = Arc::new(MemorySink::new());
    let first = watcher(fake.clone(), &sink);
    let second = watcher(fake.clone(), &sink);

    let exits = tokio::time::timeout(
        Duration::from_secs(2),
        Orchestrator::new()
            .with_watcher(first)
            .with_watcher(second)
            .start(async {}),
    )
    .await
    .expect("orchestrator must join promptly");

    assert_eq!(exits.len(), 2);
    assert!(exits.iter().all(|e| e.is_completed()));
    assert_eq!(fake.opens(), fake.closes());
}

#[tokio::test]
async fn orchestrator_shutdown_after_streaming() {
    let fake = FakeConnector::new(vec![
        vec![Reply::Ack, Reply::Ack, Reply::Event(json!({"n": 1}))],
        vec![Reply::Ack, Reply::Ack],
    ]);
    let sink = Arc::new(MemorySink::new());
    let first = watcher(fake.clone(), &sink);
    let second = watcher(fake.clone(), &sink);

    let probe = fake.clone();
    let trigger = async move {
        eventually(|| {
            probe.opens() == 2
                && probe
                    .shape()
                    .iter()
                    .filter(|c| c.as_str() == "receive(pending)")
                    .count()
                    == 2
        })
        .await;
    };

    let exits = tokio::time::timeout(
        Duration::from_secs(5),
        Orchestrator::new()
            .with_watcher(first)
            .with_watcher(second)
            .start(trigger),
    )
    .await
    .expect("orchestrator must join promptly");

    assert_eq!(exits.len(), 2);
    assert_eq!(fake.opens(), 2);
    assert_eq!(fake.closes(), 2);
    assert_eq!(sink.len(), 1);
}
