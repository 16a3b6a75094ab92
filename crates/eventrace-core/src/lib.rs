//! eventrace-core — shared types for the event race.
//!
//! # Overview
//!
//! eventrace watches the same contract event through two independent
//! providers and logs which one surfaces each occurrence first. The core
//! crate defines:
//!
//! - [`Event`] / [`Source`] — one observed occurrence and where it came from
//! - [`EventSink`] — where observed events are handed off
//! - [`SubscriptionFilter`] — the contract address + ABI watched on every source
//! - [`Watcher`] — the async trait every source implements
//! - [`Orchestrator`] — runs N watchers under one cancellation token
//! - [`WatchError`] — structured error type

pub mod error;
pub mod event;
pub mod filter;
pub mod orchestrator;
pub mod watcher;

pub use error::WatchError;
pub use event::{Event, EventSink, MemorySink, Source, TracingSink};
pub use filter::{SubscriptionFilter, LOG_SWAP_ABI};
pub use orchestrator::{ExitOutcome, Orchestrator, WatcherExit};
pub use watcher::{until_cancelled, Watcher};

pub use tokio_util::sync::CancellationToken;
