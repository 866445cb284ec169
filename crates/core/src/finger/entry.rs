use serde::Deserialize;
use serde::Serialize;

use crate::ring::Link;

/// One routing slot: a primary destination plus fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FTEntry {
    pub primary: Link,
    /// Tried in order when the primary does not answer.
    pub backups: Vec<Link>,
    /// Scheduler time of the last install or refresh, in ms.
    pub refreshed_at: u64,
}

impl FTEntry {
    pub fn new(primary: Link, refreshed_at: u64) -> Self {
        Self {
            primary,
            backups: vec![],
            refreshed_at,
        }
    }

    pub fn with_backups(mut self, backups: Vec<Link>) -> Self {
        self.backups = backups;
        self.backups.retain(|b| *b != self.primary);
        self
    }

    /// Primary first, then the backups.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        std::iter::once(&self.primary).chain(self.backups.iter())
    }

    /// Whether the entry is older than `threshold_ms` at `now`.
    pub fn is_stale(&self, now: u64, threshold_ms: u64) -> bool {
        now.saturating_sub(self.refreshed_at) > threshold_ms
    }
}
