//! Scripted in-memory connector shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use eventrace_push::{ApiKey, Connector, Endpoint, SessionError, SessionId, TransportSession};

/// What the fake session answers to the next `receive`.
#[derive(Debug, Clone)]
pub enum Reply {
    Ack,
    Event(Value),
    /// Valid text that is not a notification.
    Garbage,
    Hiccup,
    Abnormal,
    Graceful,
}

/// One observed call on the fake transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(SessionId),
    OpenFailed,
    Send(SessionId, String),
    Receive(SessionId, &'static str),
    Close(SessionId),
}

#[derive(Default)]
struct Shared {
    calls: Vec<Call>,
    /// One script per session, consumed in open order.
    scripts: VecDeque<VecDeque<Reply>>,
    /// Open attempts that fail, by attempt index.
    failing_opens: Vec<usize>,
    open_attempts: usize,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    shared: Arc<Mutex<Shared>>,
}

impl FakeConnector {
    pub fn new(scripts: Vec<Vec<Reply>>) -> Self {
        let fake = Self::default();
        fake.shared.lock().unwrap().scripts = scripts.into_iter().map(VecDeque::from).collect();
        fake
    }

    pub fn fail_open(self, attempt: usize) -> Self {
        self.shared.lock().unwrap().failing_opens.push(attempt);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.lock().unwrap().calls.clone()
    }

    pub fn opens(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Open(_))).count()
    }

    pub fn closes(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Close(_))).count()
    }

    /// Calls with session ids and send payloads stripped, for sequence checks.
    pub fn shape(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| match c {
                Call::Open(_) => "open".to_string(),
                Call::OpenFailed => "open-failed".to_string(),
                Call::Send(_, kind) => format!("send({kind})"),
                Call::Receive(_, what) => format!("receive({what})"),
                Call::Close(_) => "close".to_string(),
            })
            .collect()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::Open(id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn open(&self, endpoint: &Endpoint, _api_key: &ApiKey) -> Result<FakeSession, SessionError> {
        let mut shared = self.shared.lock().unwrap();
        let attempt = shared.open_attempts;
        shared.open_attempts += 1;
        if shared.failing_opens.contains(&attempt) {
            shared.calls.push(Call::OpenFailed);
            return Err(SessionError::Connect {
                url: endpoint.to_string(),
                reason: "refused".into(),
            });
        }
        shared.next_id += 1;
        let id = SessionId(shared.next_id);
        let script = shared.scripts.pop_front().unwrap_or_default();
        shared.calls.push(Call::Open(id));
        Ok(FakeSession {
            id,
            script,
            open: true,
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct FakeSession {
    id: SessionId,
    script: VecDeque<Reply>,
    open: bool,
    shared: Arc<Mutex<Shared>>,
}

impl FakeSession {
    fn record(&self, call: Call) {
        self.shared.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl TransportSession for FakeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        if !self.open {
            return Err(SessionError::NotOpen);
        }
        let v: Value = serde_json::from_str(&text)?;
        let kind = if v.get("config").is_some() { "config" } else { "subscribe" };
        self.record(Call::Send(self.id, kind.to_string()));
        Ok(())
    }

    async fn receive_text(&mut self) -> Result<String, SessionError> {
        if !self.open {
            return Err(SessionError::NotOpen);
        }
        let Some(reply) = self.script.pop_front() else {
            // Script exhausted: behave like a silent remote.
            self.record(Call::Receive(self.id, "pending"));
            futures::future::pending::<()>().await;
            unreachable!();
        };
        match reply {
            Reply::Ack => {
                self.record(Call::Receive(self.id, "ack"));
                Ok(r#"{"status":"ok"}"#.to_string())
            }
            Reply::Event(v) => {
                self.record(Call::Receive(self.id, "event"));
                Ok(serde_json::json!({ "status": "ok", "event": v }).to_string())
            }
            Reply::Garbage => {
                self.record(Call::Receive(self.id, "garbage"));
                Ok("not json".to_string())
            }
            Reply::Hiccup => {
                self.record(Call::Receive(self.id, "hiccup"));
                Err(SessionError::Transport("hiccup".into()))
            }
            Reply::Abnormal => {
                self.record(Call::Receive(self.id, "abnormal"));
                Err(SessionError::AbnormalClosure("reset".into()))
            }
            Reply::Graceful => {
                self.record(Call::Receive(self.id, "graceful"));
                Err(SessionError::Closed("1000: bye".into()))
            }
        }
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.record(Call::Close(self.id));
        }
    }
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
