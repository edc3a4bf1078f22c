//! Status and report types for progress synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::event::{ProgressEventKind, SyncState};

/// Sync state of one queued event, for pending/failed indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSyncStatus {
    pub event_id: String,
    pub kind: ProgressEventKind,
    pub state: SyncState,
    pub attempts: u32,
    /// Last failure message, kept while the event is failed.
    pub last_error: Option<String>,
    /// Whether a manual retry may succeed. Only meaningful for failed events.
    pub retryable: bool,
    pub batch_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Queue summary for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Last time an event was acknowledged.
    pub last_sync_at: Option<DateTime<Utc>>,
    pub pending_count: usize,
    pub in_flight_count: usize,
    pub failed_count: usize,
    pub acknowledged_count: usize,
    /// Whether a drain is currently running.
    pub in_progress: bool,
}

/// Result of draining one user's queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Events acknowledged during this drain, in delivery order.
    pub acknowledged: Vec<String>,
    pub failed: Vec<SyncError>,
    /// Oldest unacknowledged event still blocking the queue, if any.
    pub blocked_by: Option<String>,
    pub cancelled: bool,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.blocked_by.is_none() && !self.cancelled
    }
}

/// Final state of one batch member.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItemOutcome {
    Acknowledged,
    Failed(SyncError),
    /// Not delivered: blocked by an earlier event or interrupted by cancellation.
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemResult {
    pub event_id: String,
    pub outcome: BatchItemOutcome,
}

/// Per-item report of a batch submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub batch_id: String,
    pub items: Vec<BatchItemResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.outcome == BatchItemOutcome::Acknowledged)
            .count()
    }

    pub fn failures(&self) -> Vec<&BatchItemResult> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, BatchItemOutcome::Failed(_)))
            .collect()
    }

    pub fn all_acknowledged(&self) -> bool {
        self.succeeded() == self.items.len()
    }
}
