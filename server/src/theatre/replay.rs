//! Background producer replaying the loaded plays as live activity.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::plays::Play;
use super::{OpenContent, Theatre};

/// Spawn a task that cycles through `plays` forever, publishing the next line
/// of each play in turn and pausing `line_interval` after every publish.
/// Each play wraps to its first line once exhausted.
pub fn spawn_replay(theatre: Arc<Theatre>, plays: Vec<Play>, line_interval: Duration) -> JoinHandle<()> {
    tracing::info!(
        plays = plays.len(),
        interval_ms = line_interval.as_millis() as u64,
        "Starting play replay"
    );
    tokio::spawn(run_replay(theatre, plays, line_interval))
}

async fn run_replay(theatre: Arc<Theatre>, plays: Vec<Play>, line_interval: Duration) {
    let plays: Vec<Play> = plays.into_iter().filter(|p| !p.lines.is_empty()).collect();
    if plays.is_empty() {
        tracing::warn!("No play has any lines, replay stopped");
        return;
    }

    let mut cursors = vec![0usize; plays.len()];
    loop {
        for (play, cursor) in plays.iter().zip(cursors.iter_mut()) {
            let speech = &play.lines[*cursor];
            *cursor = (*cursor + 1) % play.lines.len();

            let content = OpenContent::text(speech.character, speech.text.as_str());
            if !theatre.publish(content, play.stage) {
                tracing::warn!(play = %play.title, "Replay line rejected by theatre");
            }
            tokio::time::sleep(line_interval).await;
        }
    }
}
