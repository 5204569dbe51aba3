//! Per-entity sliding windows of hit timestamps.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use crate::token::Token;

/// Surviving hit count for one entity after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenStat {
    pub token: Token,
    pub count: usize,
}

/// Hit timestamps keyed by entity, in recording order.
///
/// Invariant after `refresh(now, window)`: every retained timestamp `t`
/// satisfies `now - t < window`, and no entity maps to an empty sequence.
#[derive(Debug, Default)]
pub struct SlidingWindowStore {
    hits: HashMap<Token, VecDeque<Instant>>,
}

impl SlidingWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one hit for `token` at `at`.
    pub fn record_hit(&mut self, token: Token, at: Instant) {
        self.hits.entry(token).or_default().push_back(at);
    }

    /// Evict hits that fell out of the window and report survivors.
    ///
    /// Entities left with no hits are dropped from the store entirely.
    /// Output order is unspecified.
    pub fn refresh(&mut self, now: Instant, window: Duration) -> Vec<TokenStat> {
        let mut stats = Vec::with_capacity(self.hits.len());
        self.hits.retain(|token, hits| {
            // Stamps may be recorded out of order, so every hit is checked.
            // `saturating_duration_since` treats future stamps as age zero.
            hits.retain(|at| now.saturating_duration_since(*at) < window);
            if hits.is_empty() {
                return false;
            }
            stats.push(TokenStat {
                token: *token,
                count: hits.len(),
            });
            true
        });
        stats
    }

    /// Number of entities currently tracked.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Hits currently retained for `token` (0 if untracked).
    #[cfg(test)]
    pub fn hits_for(&self, token: &Token) -> usize {
        self.hits.get(token).map(VecDeque::len).unwrap_or(0)
    }
}
