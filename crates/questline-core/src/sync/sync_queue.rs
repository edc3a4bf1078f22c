//! Per-user FIFO queue of events awaiting remote acknowledgment.
//!
//! Entries keep insertion order, which is the order the events were applied
//! locally. An entry may go in flight only when every earlier entry is
//! acknowledged, except that members of the same batch never block each
//! other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::event::{ProgressEvent, SyncState};
use crate::sync::types::{EventSyncStatus, SyncStatus};

/// A queued event with its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub event: ProgressEvent,
    /// Submissions made so far, across drains and restarts.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub retryable: bool,
    pub batch_id: Option<String>,
}

impl QueueEntry {
    pub fn new(mut event: ProgressEvent, batch_id: Option<String>) -> Self {
        event.sync_state = SyncState::Pending;
        Self {
            event,
            attempts: 0,
            last_error: None,
            retryable: false,
            batch_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.event.id
    }

    pub fn state(&self) -> SyncState {
        self.event.sync_state
    }

    fn status(&self) -> EventSyncStatus {
        EventSyncStatus {
            event_id: self.event.id.clone(),
            kind: self.event.kind(),
            state: self.event.sync_state,
            attempts: self.attempts,
            last_error: self.last_error.clone(),
            retryable: self.retryable,
            batch_id: self.batch_id.clone(),
            occurred_at: self.event.occurred_at,
        }
    }
}

/// Sync queue for one user.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    user_id: String,
    entries: Vec<QueueEntry>,
    last_sync_at: Option<DateTime<Utc>>,
}

impl SyncQueue {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            entries: Vec::new(),
            last_sync_at: None,
        }
    }

    /// Append an entry. Returns `false` if the event id is already queued.
    pub fn push(&mut self, entry: QueueEntry) -> bool {
        if self.contains(entry.id()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.entries.iter().any(|e| e.id() == event_id)
    }

    pub fn get(&self, event_id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id() == event_id)
    }

    /// First pending entry allowed to go in flight.
    pub fn next_eligible(&self) -> Option<&QueueEntry> {
        self.entries
            .iter()
            .enumerate()
            .find(|(i, entry)| entry.state() == SyncState::Pending && self.unblocked(*i))
            .map(|(_, entry)| entry)
    }

    /// Whether no earlier entry holds back the entry at `index`.
    fn unblocked(&self, index: usize) -> bool {
        let batch = self.entries[index].batch_id.as_deref();
        self.entries[..index].iter().all(|earlier| {
            earlier.state() == SyncState::Acknowledged
                || (batch.is_some() && earlier.batch_id.as_deref() == batch)
        })
    }

    /// Oldest entry that is not acknowledged.
    pub fn head(&self) -> Option<&QueueEntry> {
        self.entries
            .iter()
            .find(|e| e.state() != SyncState::Acknowledged)
    }

    /// `pending -> in_flight`. Returns the event to deliver.
    pub fn begin(&mut self, event_id: &str) -> Result<ProgressEvent, SyncError> {
        let index = self.index_of(event_id)?;
        let entry = &self.entries[index];
        if entry.state() != SyncState::Pending {
            return Err(self.invalid(index, "sent"));
        }
        if !self.unblocked(index) {
            return Err(self.invalid(index, "sent ahead of earlier events"));
        }
        let entry = &mut self.entries[index];
        entry.event.sync_state = SyncState::InFlight;
        Ok(entry.event.clone())
    }

    pub fn record_attempt(&mut self, event_id: &str) -> Result<u32, SyncError> {
        let entry = self.entry_mut(event_id)?;
        entry.attempts += 1;
        Ok(entry.attempts)
    }

    /// `in_flight -> acknowledged`.
    pub fn acknowledge(&mut self, event_id: &str, at: DateTime<Utc>) -> Result<(), SyncError> {
        let index = self.index_of(event_id)?;
        if self.entries[index].state() != SyncState::InFlight {
            return Err(self.invalid(index, "acknowledged"));
        }
        let entry = &mut self.entries[index];
        entry.event.sync_state = SyncState::Acknowledged;
        entry.last_error = None;
        entry.retryable = false;
        self.last_sync_at = Some(at);
        Ok(())
    }

    /// `in_flight -> failed`.
    pub fn fail(&mut self, event_id: &str, error: &SyncError) -> Result<(), SyncError> {
        let index = self.index_of(event_id)?;
        if self.entries[index].state() != SyncState::InFlight {
            return Err(self.invalid(index, "failed"));
        }
        let entry = &mut self.entries[index];
        entry.event.sync_state = SyncState::Failed;
        entry.last_error = Some(error.to_string());
        entry.retryable = error.is_retryable();
        Ok(())
    }

    /// `in_flight -> pending`, used when a delivery is cancelled.
    pub fn reset_to_pending(&mut self, event_id: &str) -> Result<(), SyncError> {
        let index = self.index_of(event_id)?;
        if self.entries[index].state() != SyncState::InFlight {
            return Err(self.invalid(index, "reset"));
        }
        self.entries[index].event.sync_state = SyncState::Pending;
        Ok(())
    }

    /// Re-arm a retryable failure: `failed -> pending`, clearing the attempt count.
    pub fn retry(&mut self, event_id: &str) -> Result<(), SyncError> {
        let index = self.index_of(event_id)?;
        let entry = &self.entries[index];
        if entry.state() != SyncState::Failed || !entry.retryable {
            return Err(self.invalid(index, "retried"));
        }
        let entry = &mut self.entries[index];
        entry.event.sync_state = SyncState::Pending;
        entry.attempts = 0;
        Ok(())
    }

    /// Drop a failed event for good. Its local effects stay applied.
    pub fn discard(&mut self, event_id: &str) -> Result<ProgressEvent, SyncError> {
        let index = self.index_of(event_id)?;
        if self.entries[index].state() != SyncState::Failed {
            return Err(self.invalid(index, "discarded"));
        }
        Ok(self.entries.remove(index).event)
    }

    /// Remove acknowledged entries; returns how many were removed.
    pub fn prune_acknowledged(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| e.state() != SyncState::Acknowledged);
        before - self.entries.len()
    }

    pub fn statuses(&self) -> Vec<EventSyncStatus> {
        self.entries.iter().map(QueueEntry::status).collect()
    }

    pub fn summary(&self, in_progress: bool) -> SyncStatus {
        let count = |state: SyncState| self.entries.iter().filter(|e| e.state() == state).count();
        SyncStatus {
            last_sync_at: self.last_sync_at,
            pending_count: count(SyncState::Pending),
            in_flight_count: count(SyncState::InFlight),
            failed_count: count(SyncState::Failed),
            acknowledged_count: count(SyncState::Acknowledged),
            in_progress,
        }
    }

    /// Entries belonging to `batch_id`, in queue order.
    pub fn batch_members(&self, batch_id: &str) -> Vec<&QueueEntry> {
        self.entries
            .iter()
            .filter(|e| e.batch_id.as_deref() == Some(batch_id))
            .collect()
    }

    fn index_of(&self, event_id: &str) -> Result<usize, SyncError> {
        self.entries
            .iter()
            .position(|e| e.id() == event_id)
            .ok_or_else(|| SyncError::UnknownEvent {
                user_id: self.user_id.clone(),
                event_id: event_id.to_string(),
            })
    }

    fn entry_mut(&mut self, event_id: &str) -> Result<&mut QueueEntry, SyncError> {
        let index = self.index_of(event_id)?;
        Ok(&mut self.entries[index])
    }

    fn invalid(&self, index: usize, action: &'static str) -> SyncError {
        let entry = &self.entries[index];
        SyncError::InvalidState {
            event_id: entry.event.id.clone(),
            action,
            state: entry.state().to_string(),
        }
    }
}
