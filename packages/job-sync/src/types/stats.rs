//! Derived queue counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached counts of the two job queues.
///
/// Never authoritative: always recomputable from the queue lengths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_tracked: usize,
    pub pending_sync: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Stats {
    pub fn compute(pending: usize, tracked: usize) -> Self {
        Self {
            total_tracked: tracked,
            pending_sync: pending,
            last_updated: Some(Utc::now()),
        }
    }

    /// Whether the cached counts agree with the live queue lengths.
    pub fn matches(&self, pending: usize, tracked: usize) -> bool {
        self.pending_sync == pending && self.total_tracked == tracked
    }
}
