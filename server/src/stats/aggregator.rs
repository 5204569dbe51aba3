use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use super::ranking::top_n;
use super::window::SlidingWindowStore;
use super::{ActivityEvent, Dispatcher, EventReceiver, Stats};
use crate::token::{NameToken, Token};

/// Single-owner aggregation state: windows for stages and actors plus the
/// names they were first seen under.
///
/// Only the task running [`Aggregator::run`] touches this; everything else
/// talks to it through the activity channel.
#[derive(Debug)]
pub struct Aggregator {
    stage_hits: SlidingWindowStore,
    actor_hits: SlidingWindowStore,
    stages: HashMap<Token, String>,
    cast: HashMap<Token, String>,
    top_n: usize,
    window: Duration,
}

impl Aggregator {
    pub fn new(top_n: usize, window: Duration) -> Self {
        Self {
            stage_hits: SlidingWindowStore::new(),
            actor_hits: SlidingWindowStore::new(),
            stages: HashMap::new(),
            cast: HashMap::new(),
            top_n,
            window,
        }
    }

    /// Count one event at `now`. The first name seen for an entity sticks.
    pub fn record(&mut self, event: ActivityEvent, now: Instant) {
        tracing::trace!(
            actor = %event.actor,
            stage = %event.stage,
            published_at = %event.timestamp,
            "Activity received"
        );

        self.stage_hits.record_hit(event.stage, now);
        self.actor_hits.record_hit(event.actor, now);

        self.cast.entry(event.actor).or_insert(event.actor_name);
        self.stages.entry(event.stage).or_insert(event.stage_name);
    }

    /// Evict expired hits and rank what survives.
    ///
    /// Entities with no recorded name are left out of the snapshot.
    pub fn snapshot(&mut self, now: Instant) -> Stats {
        let stage_stats = top_n(self.stage_hits.refresh(now, self.window), self.top_n);
        let actor_stats = top_n(self.actor_hits.refresh(now, self.window), self.top_n);

        Stats {
            stages: resolve_names(&self.stages, stage_stats.iter().map(|s| s.token)),
            people: resolve_names(&self.cast, actor_stats.iter().map(|s| s.token)),
        }
    }

    /// Name recorded for an actor, if any.
    #[cfg(test)]
    pub fn actor_name(&self, token: &Token) -> Option<&str> {
        self.cast.get(token).map(String::as_str)
    }

    /// Name recorded for a stage, if any.
    #[cfg(test)]
    pub fn stage_name(&self, token: &Token) -> Option<&str> {
        self.stages.get(token).map(String::as_str)
    }

    /// Compute and broadcast one snapshot. A snapshot that fails to
    /// serialize is dropped; the next tick supersedes it.
    fn tick<D: Dispatcher>(&mut self, dispatcher: &D) {
        let stats = self.snapshot(Instant::now());
        match serde_json::to_string(&stats) {
            Ok(payload) => {
                let report = dispatcher.broadcast(payload);
                tracing::debug!(
                    stages = stats.stages.len(),
                    people = stats.people.len(),
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "Ranking snapshot broadcast"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize ranking snapshot, skipping tick");
            }
        }
    }

    /// Merge activity events and the refresh tick until the process exits.
    ///
    /// Neither branch has priority. After each tick the timer is re-armed for
    /// exactly one further period. If every producer goes away the loop keeps
    /// ticking so rankings drain to empty.
    pub async fn run<D: Dispatcher>(mut self, mut events: EventReceiver, dispatcher: D, tick: Duration) {
        let refresh = sleep(tick);
        tokio::pin!(refresh);
        let mut events_open = true;

        loop {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => self.record(event, Instant::now()),
                    None => {
                        tracing::info!("Activity channel closed, rankings will drain");
                        events_open = false;
                    }
                },
                () = &mut refresh => {
                    self.tick(&dispatcher);
                    refresh.as_mut().reset(Instant::now() + tick);
                }
            }
        }
    }
}

fn resolve_names(names: &HashMap<Token, String>, ranked: impl Iterator<Item = Token>) -> Vec<NameToken> {
    ranked
        .filter_map(|token| names.get(&token).map(|name| NameToken::new(name.as_str(), &token)))
        .collect()
}

/// Spawn the aggregation task.
pub fn spawn_aggregator<D>(
    aggregator: Aggregator,
    events: EventReceiver,
    dispatcher: D,
    tick: Duration,
) -> JoinHandle<()>
where
    D: Dispatcher + 'static,
{
    tracing::info!(
        top_n = aggregator.top_n,
        window_secs = aggregator.window.as_secs(),
        tick_ms = tick.as_millis() as u64,
        "Starting ranking aggregator"
    );
    tokio::spawn(aggregator.run(events, dispatcher, tick))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{event_channel, BroadcastReport};
    use std::sync::{Arc, Mutex};

    const WINDOW: Duration = Duration::from_secs(60);
    const TICK: Duration = Duration::from_secs(1);

    fn token(b: u8) -> Token {
        Token::from_bytes([b; 32])
    }

    fn event(actor: u8, actor_name: &str, stage: u8, stage_name: &str) -> ActivityEvent {
        ActivityEvent {
            actor: token(actor),
            actor_name: actor_name.to_string(),
            stage: token(stage),
            stage_name: stage_name.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Records every payload it is asked to broadcast.
    #[derive(Default)]
    struct RecordingDispatcher {
        payloads: Mutex<Vec<String>>,
    }

    impl RecordingDispatcher {
        fn snapshots(&self) -> Vec<Stats> {
            self.payloads
                .lock()
                .unwrap()
                .iter()
                .map(|p| serde_json::from_str(p).unwrap())
                .collect()
        }
    }

    impl Dispatcher for RecordingDispatcher {
        fn broadcast(&self, payload: String) -> BroadcastReport {
            self.payloads.lock().unwrap().push(payload);
            BroadcastReport {
                delivered: 1,
                dropped: 0,
            }
        }
    }

    #[test]
    fn test_first_name_wins() {
        let mut agg = Aggregator::new(5, WINDOW);
        let now = Instant::now();
        agg.record(event(1, "Hamlet", 9, "Play: Hamlet"), now);
        agg.record(event(1, "Prince", 9, "Play: Renamed"), now);

        assert_eq!(agg.actor_name(&token(1)), Some("Hamlet"));
        assert_eq!(agg.stage_name(&token(9)), Some("Play: Hamlet"));

        let stats = agg.snapshot(now);
        assert_eq!(stats.people, vec![NameToken::new("Hamlet", &token(1))]);
        assert_eq!(stats.stages, vec![NameToken::new("Play: Hamlet", &token(9))]);
    }

    #[test]
    fn test_snapshot_ranks_by_activity() {
        let mut agg = Aggregator::new(2, WINDOW);
        let now = Instant::now();
        for _ in 0..3 {
            agg.record(event(1, "Lear", 10, "Play: Lear"), now);
        }
        agg.record(event(2, "Fool", 10, "Play: Lear"), now);
        for _ in 0..2 {
            agg.record(event(3, "Edgar", 11, "Play: Other"), now);
        }

        let stats = agg.snapshot(now);
        let people: Vec<&str> = stats.people.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(people, vec!["Lear", "Edgar"]);
        let stages: Vec<&str> = stats.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(stages, vec!["Play: Lear", "Play: Other"]);
    }

    #[test]
    fn test_snapshot_drains_after_window() {
        let mut agg = Aggregator::new(5, WINDOW);
        let start = Instant::now();
        agg.record(event(1, "Puck", 2, "Play: Dream"), start);

        assert_eq!(agg.snapshot(start + Duration::from_secs(59)).people.len(), 1);
        assert_eq!(agg.snapshot(start + WINDOW), Stats::default());
    }

    #[test]
    fn test_unnamed_entities_are_omitted() {
        let names = HashMap::from([(token(1), "Known".to_string())]);
        let resolved = resolve_names(&names, [token(1), token(2)].into_iter());
        assert_eq!(resolved, vec![NameToken::new("Known", &token(1))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_broadcasts_ranked_snapshot() {
        let (tx, rx) = event_channel();
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let handle = spawn_aggregator(Aggregator::new(5, WINDOW), rx, dispatcher.clone(), TICK);

        // A@0s on S, A@0.5s on S, B@0.8s on S; first tick fires at 1s.
        tx.send(event(1, "A", 7, "S")).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(event(1, "A", 7, "S")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(event(2, "B", 7, "S")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let snapshots = dispatcher.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].stages, vec![NameToken::new("S", &token(7))]);
        assert_eq!(
            snapshots[0].people,
            vec![NameToken::new("A", &token(1)), NameToken::new("B", &token(2))]
        );

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_ticking_after_producers_leave() {
        let (tx, rx) = event_channel();
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let handle = spawn_aggregator(Aggregator::new(5, WINDOW), rx, dispatcher.clone(), TICK);

        tx.send(event(1, "Ariel", 3, "Play: Tempest")).unwrap();
        drop(tx);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let snapshots = dispatcher.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].people.len(), 1);

        // Window expires; later ticks carry empty rankings.
        tokio::time::sleep(WINDOW).await;
        let snapshots = dispatcher.snapshots();
        assert!(snapshots.len() > 50);
        assert_eq!(snapshots.last(), Some(&Stats::default()));

        handle.abort();
    }
}
