use axum::extract::ws::Message;
use tokio::sync::mpsc::error::TrySendError;

use super::ConnectionRegistry;
use crate::stats::{BroadcastReport, Dispatcher};

impl ConnectionRegistry {
    /// Queue a message on every registered connection without waiting.
    ///
    /// Each connection is attempted independently. A full or closed outbox
    /// only skips that connection; it stays registered until its own actor
    /// removes it.
    pub fn broadcast_message(&self, msg: Message) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for entry in self.connections.iter() {
            match entry.value().try_send(msg.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(connection_id = %entry.key(), "Outbox full, message dropped");
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                }
            }
        }
        report
    }
}

impl Dispatcher for ConnectionRegistry {
    fn broadcast(&self, payload: String) -> BroadcastReport {
        self.broadcast_message(Message::Text(payload.into()))
    }
}
