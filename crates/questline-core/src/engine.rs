//! Upward boundary of the library.
//!
//! [`ProgressEngine`] ties validation, the progress store and the sync
//! coordinator together. Every accepted action is applied to the user's
//! snapshot and enqueued for delivery under the same ledger lock.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result, SyncError};
use crate::event::{EventValidator, ProgressEvent, RawAction};
use crate::progress::{ApplyOutcome, ProgressSnapshot, ProgressStore};
use crate::storage::JournalRow;
use crate::sync::{
    BatchReport, DrainReport, EventSyncStatus, RemoteProgressApi, SyncCoordinator, SyncStatus,
};

/// An accepted action and what applying it did.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub event: ProgressEvent,
    pub outcome: ApplyOutcome,
}

/// Result of recording several actions as one batch.
#[derive(Debug)]
pub struct BatchRecord {
    pub batch_id: String,
    /// One entry per input action, in input order.
    pub results: Vec<Result<Recorded>>,
}

impl BatchRecord {
    pub fn recorded(&self) -> impl Iterator<Item = &Recorded> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }
}

/// Counts from rebuilding state out of the journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub applied: usize,
    pub requeued: usize,
}

pub struct ProgressEngine<R> {
    validator: EventValidator,
    store: ProgressStore,
    coordinator: SyncCoordinator<R>,
}

impl<R: RemoteProgressApi> ProgressEngine<R> {
    pub fn new(validator: EventValidator, store: ProgressStore, coordinator: SyncCoordinator<R>) -> Self {
        Self {
            validator,
            store,
            coordinator,
        }
    }

    pub fn validator(&self) -> &EventValidator {
        &self.validator
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn coordinator(&self) -> &SyncCoordinator<R> {
        &self.coordinator
    }

    pub fn remote(&self) -> &Arc<R> {
        self.coordinator.remote()
    }

    /// Validate, apply and enqueue one local action.
    ///
    /// Duplicates return the unchanged snapshot and are not enqueued again.
    ///
    /// # Errors
    /// Returns [`CoreError::Validation`] or [`CoreError::OutOfOrder`]; in
    /// both cases nothing was applied or enqueued.
    pub fn apply_local_action(&self, raw: RawAction) -> Result<ApplyOutcome> {
        self.record(raw).map(|recorded| recorded.outcome)
    }

    /// Like [`apply_local_action`](Self::apply_local_action), also returning
    /// the validated event so callers can journal it.
    pub fn record(&self, raw: RawAction) -> Result<Recorded> {
        let event = self.validator.validate(raw)?;
        self.apply_validated(event, None)
    }

    /// Record several actions for one user as a batch.
    ///
    /// Actions are validated and applied independently: a rejected action
    /// does not undo the others. Accepted events share a fresh batch id so
    /// their delivery outcomes are reported per item.
    pub fn record_batch(&self, raws: Vec<RawAction>) -> BatchRecord {
        let batch_id = Uuid::new_v4().to_string();
        let results = raws
            .into_iter()
            .map(|raw| {
                let event = self.validator.validate(raw)?;
                self.apply_validated(event, Some(&batch_id))
            })
            .collect();
        BatchRecord { batch_id, results }
    }

    fn apply_validated(&self, event: ProgressEvent, batch_id: Option<&str>) -> Result<Recorded> {
        let outcome = self.store.apply_event_with(&event, |applied, _| {
            let queued = match batch_id {
                Some(batch_id) => self.coordinator.enqueue_in_batch(applied.clone(), batch_id),
                None => self.coordinator.enqueue(applied.clone()),
            };
            if !queued {
                debug!(event_id = %applied.id, "event already queued");
            }
        });
        match outcome {
            Ok(outcome) => Ok(Recorded { event, outcome }),
            Err(e) => {
                warn!(user_id = %event.user_id, event_id = %event.id, error = %e, "action rejected");
                Err(e)
            }
        }
    }

    /// Rebuild snapshots and sync queues from journaled rows.
    ///
    /// Rows must be in application order. Already applied ids are skipped.
    /// Rows still owed to the remote store are queued with their recorded
    /// attempts and errors.
    pub fn restore(&self, rows: Vec<JournalRow>) -> Result<RestoreSummary> {
        let mut summary = RestoreSummary::default();
        for row in rows {
            let outcome = self.store.apply_event(&row.event)?;
            if outcome.applied {
                summary.applied += 1;
            }
            if row.needs_sync() && self.coordinator.enqueue_entry(row.into_queue_entry()) {
                summary.requeued += 1;
            }
        }
        debug!(applied = summary.applied, requeued = summary.requeued, "journal restored");
        Ok(summary)
    }

    pub fn get_or_create(&self, user_id: &str, domain: Option<&str>) -> ProgressSnapshot {
        self.store.get_or_create(user_id, domain)
    }

    pub fn snapshot(&self, user_id: &str) -> Option<ProgressSnapshot> {
        self.store.snapshot(user_id)
    }

    /// Per-event delivery state for `user_id`, in queue order.
    pub fn sync_status(&self, user_id: &str) -> Vec<EventSyncStatus> {
        self.coordinator.status(user_id)
    }

    pub fn sync_summary(&self, user_id: &str) -> SyncStatus {
        self.coordinator.summary(user_id)
    }

    pub async fn sync_user(&self, user_id: &str) -> DrainReport {
        self.coordinator.sync_user(user_id).await
    }

    pub async fn sync_batch(&self, user_id: &str, batch_id: &str) -> BatchReport {
        self.coordinator.sync_batch(user_id, batch_id).await
    }

    /// Drain every known user one after another.
    pub async fn sync_all(&self) -> Vec<(String, DrainReport)> {
        let mut reports = Vec::new();
        for user_id in self.coordinator.users() {
            let report = self.coordinator.sync_user(&user_id).await;
            reports.push((user_id, report));
        }
        reports
    }

    /// Re-arm a failed event and drain the user's queue again.
    pub async fn retry(&self, user_id: &str, event_id: &str) -> Result<DrainReport, SyncError> {
        self.coordinator.retry(user_id, event_id)?;
        Ok(self.coordinator.sync_user(user_id).await)
    }

    /// Stop delivering a failed event. The snapshot keeps its effects.
    pub fn discard(&self, user_id: &str, event_id: &str) -> Result<ProgressEvent> {
        self.coordinator
            .discard(user_id, event_id)
            .map_err(CoreError::from)
    }

    pub fn prune_acknowledged(&self, user_id: &str) -> usize {
        self.coordinator.prune_acknowledged(user_id)
    }

    pub fn cancel(&self, user_id: &str) {
        self.coordinator.cancel(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::error::ValidationError;
    use crate::event::{ProgressPayload, SyncState};
    use crate::sync::{BackoffPolicy, BatchItemOutcome, ProgressRequest, RemoteAck, RemoteFailure};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RejectingRemote {
        reject: Mutex<HashSet<String>>,
        seen: Mutex<Vec<String>>,
    }

    impl RemoteProgressApi for RejectingRemote {
        async fn submit(&self, request: &ProgressRequest) -> std::result::Result<RemoteAck, RemoteFailure> {
            self.seen.lock().unwrap().push(request.event_id.clone());
            if self.reject.lock().unwrap().contains(&request.event_id) {
                return Err(RemoteFailure::Permanent {
                    status: Some(400),
                    message: "rejected".into(),
                });
            }
            Ok(RemoteAck {
                event_id: request.event_id.clone(),
                ..Default::default()
            })
        }
    }

    fn new_engine() -> (Arc<RejectingRemote>, Arc<ManualClock>, ProgressEngine<RejectingRemote>) {
        let remote = Arc::new(RejectingRemote::default());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 12, 18, 0, 0).unwrap()));
        let validator = EventValidator::with_clock(clock.clone(), Duration::seconds(300));
        let coordinator = SyncCoordinator::new(remote.clone(), BackoffPolicy::immediate(2)).with_seed(1);
        let engine = ProgressEngine::new(validator, ProgressStore::default(), coordinator);
        (remote, clock, engine)
    }

    fn stage(user: &str, stage_id: &str) -> RawAction {
        RawAction::typed(
            user,
            ProgressPayload::StageCompleted {
                stage_id: stage_id.into(),
                skills: vec!["python".into()],
                difficulty: None,
            },
        )
    }

    #[tokio::test]
    async fn test_applied_action_is_queued_and_synced() {
        let (remote, _clock, engine) = new_engine();
        let outcome = engine.apply_local_action(stage("u", "s1").with_event_id("e1")).unwrap();
        assert_eq!(outcome.snapshot.total_points, 100);

        let status = engine.sync_status("u");
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].state, SyncState::Pending);

        let report = engine.sync_user("u").await;
        assert_eq!(report.acknowledged, vec!["e1"]);
        assert_eq!(engine.sync_status("u")[0].state, SyncState::Acknowledged);
        assert_eq!(remote.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_action_not_requeued() {
        let (_remote, _clock, engine) = new_engine();
        engine.apply_local_action(stage("u", "s1").with_event_id("e1")).unwrap();
        let again = engine.apply_local_action(stage("u", "s1").with_event_id("e1")).unwrap();
        assert!(!again.applied);
        assert_eq!(engine.sync_status("u").len(), 1);
    }

    #[test]
    fn test_rejected_action_never_queued() {
        let (_remote, clock, engine) = new_engine();
        let future = clock.now() + Duration::hours(1);
        let err = engine
            .apply_local_action(stage("u", "s1").at(future))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::FutureTimestamp { .. })
        ));

        let now = clock.now();
        engine.apply_local_action(stage("u", "s1").at(now)).unwrap();
        let err = engine
            .apply_local_action(stage("u", "s2").at(now - Duration::days(2)))
            .unwrap_err();
        assert!(matches!(err, CoreError::OutOfOrder(_)));
        assert_eq!(engine.sync_status("u").len(), 1);
    }

    #[tokio::test]
    async fn test_batch_reports_each_item() {
        let (remote, _clock, engine) = new_engine();
        let bad = RawAction {
            user_id: "u".into(),
            kind: "teleported".into(),
            ..Default::default()
        };
        let batch = engine.record_batch(vec![
            stage("u", "s1").with_event_id("b1"),
            bad,
            stage("u", "s2").with_event_id("b2"),
        ]);
        assert_eq!(batch.recorded().count(), 2);
        assert!(batch.results[1].is_err());

        remote.reject.lock().unwrap().insert("b1".into());
        let report = engine.sync_batch("u", &batch.batch_id).await;
        assert_eq!(report.items.len(), 2);
        assert!(matches!(report.items[0].outcome, BatchItemOutcome::Failed(_)));
        assert_eq!(report.items[1].outcome, BatchItemOutcome::Acknowledged);

        // The snapshot keeps both stages regardless of delivery.
        assert_eq!(engine.snapshot("u").unwrap().completed_stage_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_discard_after_permanent_failure() {
        let (remote, _clock, engine) = new_engine();
        remote.reject.lock().unwrap().insert("e1".into());
        engine.apply_local_action(stage("u", "s1").with_event_id("e1")).unwrap();
        engine.apply_local_action(stage("u", "s2").with_event_id("e2")).unwrap();

        let report = engine.sync_user("u").await;
        assert_eq!(report.blocked_by.as_deref(), Some("e1"));
        assert!(engine.retry("u", "e1").await.is_err());

        engine.discard("u", "e1").unwrap();
        let report = engine.sync_user("u").await;
        assert_eq!(report.acknowledged, vec!["e2"]);
        assert_eq!(engine.snapshot("u").unwrap().total_points, 200);
    }

    #[test]
    fn test_restore_rebuilds_snapshot_and_queue() {
        let (_remote, _clock, engine) = new_engine();
        let first = engine.record(stage("u", "s1").with_event_id("e1")).unwrap();
        let second = engine.record(stage("u", "s2").with_event_id("e2")).unwrap();

        let mut acked = first.event.clone();
        acked.sync_state = SyncState::Acknowledged;
        let rows = vec![
            JournalRow {
                event: acked,
                attempts: 1,
                last_error: None,
                retryable: false,
                batch_id: None,
                discarded: false,
            },
            JournalRow {
                event: second.event.clone(),
                attempts: 2,
                last_error: Some("HTTP 503".into()),
                retryable: true,
                batch_id: None,
                discarded: false,
            },
        ];

        let (_remote, _clock, fresh) = new_engine();
        let summary = fresh.restore(rows).unwrap();
        assert_eq!(summary, RestoreSummary { applied: 2, requeued: 1 });
        assert_eq!(fresh.snapshot("u").unwrap(), engine.snapshot("u").unwrap());

        let status = fresh.sync_status("u");
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].event_id, "e2");
        assert_eq!(status[0].attempts, 2);
    }
}
