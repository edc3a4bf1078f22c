//! Tests for the sync coordinator, driven by a scripted remote and paused time.

#[cfg(test)]
mod tests {
    use super::super::coordinator::*;
    use crate::error::SyncError;
    use crate::event::{ProgressEvent, ProgressPayload, SyncState};
    use crate::sync::backoff::BackoffPolicy;
    use crate::sync::remote_client::{ProgressRequest, RemoteAck, RemoteFailure, RemoteProgressApi};
    use crate::sync::sync_queue::QueueEntry;
    use crate::sync::types::BatchItemOutcome;
    use chrono::Utc;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Ack,
        Transient,
        Permanent(u16),
        Hang,
    }

    #[derive(Default)]
    struct ScriptedRemote {
        script: Mutex<HashMap<String, VecDeque<Step>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRemote {
        fn script(&self, event_id: &str, steps: &[Step]) {
            self.script
                .lock()
                .unwrap()
                .insert(event_id.to_string(), steps.iter().copied().collect());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn next_step(&self, event_id: &str) -> Step {
            self.calls.lock().unwrap().push(event_id.to_string());
            self.script
                .lock()
                .unwrap()
                .get_mut(event_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Step::Ack)
        }
    }

    impl RemoteProgressApi for ScriptedRemote {
        async fn submit(&self, request: &ProgressRequest) -> Result<RemoteAck, RemoteFailure> {
            let step = self.next_step(&request.event_id);
            match step {
                Step::Ack => Ok(RemoteAck {
                    event_id: request.event_id.clone(),
                    ..Default::default()
                }),
                Step::Transient => Err(RemoteFailure::Transient {
                    message: "HTTP 503".into(),
                }),
                Step::Permanent(status) => Err(RemoteFailure::Permanent {
                    status: Some(status),
                    message: format!("HTTP {status}"),
                }),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Ok(RemoteAck::default())
                }
            }
        }
    }

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
            max_attempts: 3,
            jitter_ratio: 0.1,
        }
    }

    fn coordinator() -> (Arc<ScriptedRemote>, SyncCoordinator<ScriptedRemote>) {
        let remote = Arc::new(ScriptedRemote::default());
        let coordinator = SyncCoordinator::new(remote.clone(), policy())
            .with_attempt_timeout(Duration::from_secs(2))
            .with_seed(7);
        (remote, coordinator)
    }

    fn event(user: &str, id: &str) -> ProgressEvent {
        ProgressEvent {
            id: id.to_string(),
            user_id: user.to_string(),
            payload: ProgressPayload::DailyActivity,
            points: 10,
            occurred_at: Utc::now(),
            sync_state: SyncState::Pending,
        }
    }

    fn state_of(c: &SyncCoordinator<ScriptedRemote>, user: &str, id: &str) -> SyncState {
        c.status(user)
            .into_iter()
            .find(|s| s.event_id == id)
            .map(|s| s.state)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_fifo_order() {
        let (remote, c) = coordinator();
        for id in ["e1", "e2", "e3"] {
            assert!(c.enqueue(event("u", id)));
        }

        let report = c.sync_user("u").await;
        assert!(report.is_clean());
        assert_eq!(report.acknowledged, vec!["e1", "e2", "e3"]);
        assert_eq!(remote.calls(), vec!["e1", "e2", "e3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_lists_only_this_drains_acks() {
        let (_remote, c) = coordinator();
        c.enqueue(event("u", "e1"));
        assert_eq!(c.sync_user("u").await.acknowledged, vec!["e1"]);

        c.enqueue(event("u", "e2"));
        let report = c.sync_user("u").await;
        assert_eq!(report.acknowledged, vec!["e2"]);
        assert_eq!(c.summary("u").acknowledged_count, 2);

        assert!(c.sync_user("u").await.acknowledged.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_enqueue_ignored() {
        let (remote, c) = coordinator();
        assert!(c.enqueue(event("u", "e1")));
        assert!(!c.enqueue(event("u", "e1")));
        c.sync_user("u").await;
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retry_with_backoff() {
        let (remote, c) = coordinator();
        remote.script("e1", &[Step::Transient, Step::Transient, Step::Ack]);
        c.enqueue(event("u", "e1"));

        let started = tokio::time::Instant::now();
        let report = c.sync_user("u").await;
        assert!(report.is_clean());
        assert_eq!(remote.calls().len(), 3);
        assert_eq!(c.status("u")[0].attempts, 3);
        // 100ms then 200ms, each with at most 10% jitter.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300));
        assert!(waited <= Duration::from_millis(330));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_transient_failure_blocks_followers() {
        let (remote, c) = coordinator();
        remote.script("e1", &[Step::Transient; 3]);
        c.enqueue(event("u", "e1"));
        c.enqueue(event("u", "e2"));

        let report = c.sync_user("u").await;
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            &report.failed[0],
            SyncError::Transient { attempts: 3, .. }
        ));
        assert_eq!(report.blocked_by.as_deref(), Some("e1"));
        assert_eq!(state_of(&c, "u", "e1"), SyncState::Failed);
        assert_eq!(state_of(&c, "u", "e2"), SyncState::Pending);
        assert_eq!(remote.calls(), vec!["e1", "e1", "e1"]);

        // A second drain does not skip past the failed head.
        c.sync_user("u").await;
        assert_eq!(state_of(&c, "u", "e2"), SyncState::Pending);

        c.retry("u", "e1").unwrap();
        let report = c.sync_user("u").await;
        assert!(report.is_clean());
        assert_eq!(state_of(&c, "u", "e2"), SyncState::Acknowledged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let (remote, c) = coordinator();
        remote.script("e1", &[Step::Permanent(422)]);
        c.enqueue(event("u", "e1"));
        c.enqueue(event("u", "e2"));

        let report = c.sync_user("u").await;
        assert!(matches!(
            &report.failed[0],
            SyncError::Permanent { status: Some(422), .. }
        ));
        assert_eq!(remote.calls(), vec!["e1"]);
        assert!(!c.status("u")[0].retryable);
        assert!(matches!(
            c.retry("u", "e1"),
            Err(SyncError::InvalidState { .. })
        ));

        let discarded = c.discard("u", "e1").unwrap();
        assert_eq!(discarded.id, "e1");
        let report = c.sync_user("u").await;
        assert_eq!(report.acknowledged, vec!["e2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_members_are_isolated() {
        let (remote, c) = coordinator();
        remote.script("b-2", &[Step::Permanent(400)]);
        for id in ["b-1", "b-2", "b-3"] {
            c.enqueue_in_batch(event("u", id), "session-1");
        }

        let report = c.sync_batch("u", "session-1").await;
        assert_eq!(report.items.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.items[0].outcome, BatchItemOutcome::Acknowledged);
        assert!(matches!(
            report.items[1].outcome,
            BatchItemOutcome::Failed(SyncError::Permanent { .. })
        ));
        assert_eq!(report.items[2].outcome, BatchItemOutcome::Acknowledged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_blocked_by_earlier_failure() {
        let (remote, c) = coordinator();
        remote.script("before", &[Step::Permanent(400)]);
        c.enqueue(event("u", "before"));
        c.enqueue_in_batch(event("u", "b-1"), "session-1");

        let report = c.sync_batch("u", "session-1").await;
        assert_eq!(report.items[0].outcome, BatchItemOutcome::Pending);
        assert_eq!(remote.calls(), vec!["before"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_transient() {
        let (remote, c) = coordinator();
        remote.script("e1", &[Step::Hang, Step::Ack]);
        c.enqueue(event("u", "e1"));

        let report = c.sync_user("u").await;
        assert!(report.is_clean());
        assert_eq!(c.status("u")[0].attempts, 2);
        assert_eq!(remote.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_event_to_pending() {
        let (remote, c) = coordinator();
        remote.script("e1", &[Step::Hang]);
        c.enqueue(event("u", "e1"));

        let (report, _) = tokio::join!(c.sync_user("u"), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            c.cancel("u");
        });

        assert!(report.cancelled);
        assert_eq!(state_of(&c, "u", "e1"), SyncState::Pending);

        // The next drain resumes normally.
        let report = c.sync_user("u").await;
        assert!(report.is_clean());
        assert_eq!(state_of(&c, "u", "e1"), SyncState::Acknowledged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_keeps_full_retry_budget() {
        let (remote, c) = coordinator();
        remote.script(
            "e1",
            &[Step::Transient, Step::Transient, Step::Transient, Step::Transient, Step::Ack],
        );
        c.enqueue(event("u", "e1"));

        // Two attempts fail, then the drain is cancelled while backing off.
        let (report, _) = tokio::join!(c.sync_user("u"), async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            c.cancel("u");
        });
        assert!(report.cancelled);
        assert_eq!(remote.calls().len(), 2);
        assert_eq!(state_of(&c, "u", "e1"), SyncState::Pending);

        // The resumed drain gets three fresh tries and reaches the ack.
        let report = c.sync_user("u").await;
        assert!(report.is_clean());
        assert_eq!(report.acknowledged, vec!["e1"]);
        assert_eq!(remote.calls().len(), 5);
        assert_eq!(c.status("u")[0].attempts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restored_attempts_do_not_shrink_retry_budget() {
        let (remote, c) = coordinator();
        remote.script("e1", &[Step::Transient, Step::Transient, Step::Ack]);
        let mut entry = QueueEntry::new(event("u", "e1"), None);
        entry.attempts = 2;
        assert!(c.enqueue_entry(entry));

        let report = c.sync_user("u").await;
        assert_eq!(report.acknowledged, vec!["e1"]);
        assert_eq!(remote.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_drain_leaves_event_pending() {
        let (remote, c) = coordinator();
        remote.script("e1", &[Step::Hang]);
        c.enqueue(event("u", "e1"));

        let aborted = tokio::time::timeout(Duration::from_millis(100), c.sync_user("u")).await;
        assert!(aborted.is_err());
        assert_eq!(state_of(&c, "u", "e1"), SyncState::Pending);
        assert!(!c.summary("u").in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_do_not_block_each_other() {
        let (remote, c) = coordinator();
        remote.script("a1", &[Step::Permanent(400)]);
        c.enqueue(event("alice", "a1"));
        c.enqueue(event("alice", "a2"));
        c.enqueue(event("bob", "b1"));

        let (alice, bob) = tokio::join!(c.sync_user("alice"), c.sync_user("bob"));
        assert_eq!(alice.blocked_by.as_deref(), Some("a1"));
        assert_eq!(bob.acknowledged, vec!["b1"]);
        assert_eq!(c.users(), vec!["alice", "bob"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_acknowledged() {
        let (_remote, c) = coordinator();
        c.enqueue(event("u", "e1"));
        c.sync_user("u").await;
        assert_eq!(c.summary("u").acknowledged_count, 1);
        assert_eq!(c.prune_acknowledged("u"), 1);
        assert!(c.status("u").is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (_remote, c) = coordinator();
        assert!(c.sync_user("nobody").await.is_clean());
        assert!(matches!(
            c.retry("nobody", "e1"),
            Err(SyncError::UnknownEvent { .. })
        ));
    }
}
