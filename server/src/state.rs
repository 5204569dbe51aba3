use std::sync::Arc;
use std::time::Duration;

use crate::theatre::Theatre;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
///
/// Ranking windows are not here; they belong to the aggregator task and are
/// reachable only through the activity channel.
#[derive(Clone)]
pub struct AppState {
    /// Members, stages and content, read by point queries
    pub theatre: Arc<Theatre>,
    /// Active WebSocket connections
    pub connections: Arc<ConnectionRegistry>,
    /// Bounded outbox size per connection
    pub outbox_capacity: usize,
    /// Upper bound on a single socket write
    pub write_timeout: Duration,
}
