//! Rolling popularity rankings for stages and actors.
//!
//! Activity events flow from producers through an unbounded channel into a
//! single aggregator task. That task owns every window and name map, so none
//! of them need locking. Once per tick it ranks both windows and hands the
//! serialized snapshot to a [`Dispatcher`] for fan-out.

pub mod aggregator;
pub mod ranking;
pub mod window;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::token::{NameToken, Token};

pub use aggregator::{spawn_aggregator, Aggregator};
pub use ranking::top_n;
pub use window::{SlidingWindowStore, TokenStat};

/// One actor publishing content on one stage.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub actor: Token,
    pub actor_name: String,
    pub stage: Token,
    pub stage_name: String,
    /// Wall-clock publish time, as stamped by the producer.
    pub timestamp: DateTime<Utc>,
}

/// Producer half of the activity channel. Clone freely.
pub type EventSender = mpsc::UnboundedSender<ActivityEvent>;

/// Consumer half of the activity channel, owned by the aggregator.
pub type EventReceiver = mpsc::UnboundedReceiver<ActivityEvent>;

/// Create the channel linking producers to the aggregator.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Ranking snapshot pushed to every client once per tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(rename = "Stages")]
    pub stages: Vec<NameToken>,
    #[serde(rename = "People")]
    pub people: Vec<NameToken>,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that accepted the payload into their outbox.
    pub delivered: usize,
    /// Connections skipped because their outbox was full or already closed.
    pub dropped: usize,
}

/// Sink for serialized ranking snapshots.
///
/// Implementations must deliver to each recipient independently and never
/// block the caller on a slow recipient.
pub trait Dispatcher: Send + Sync {
    fn broadcast(&self, payload: String) -> BroadcastReport;
}

impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    fn broadcast(&self, payload: String) -> BroadcastReport {
        (**self).broadcast(payload)
    }
}
