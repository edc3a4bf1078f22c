//! Sync coordinator: drains per-user queues against the remote store.
//!
//! Each user has a lane holding the queue, a drain gate and a cancel token.
//! Lanes are independent, so a stalled user never delays another. Only the
//! remote call and the backoff sleep suspend; queue mutations are short and
//! synchronous.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::Utc;
use rand::SeedableRng;
use rand_pcg::Mcg128Xsl64;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::event::{ProgressEvent, SyncState};
use crate::sync::backoff::BackoffPolicy;
use crate::sync::remote_client::{ProgressRequest, RemoteFailure, RemoteProgressApi};
use crate::sync::sync_queue::{QueueEntry, SyncQueue};
use crate::sync::types::{
    BatchItemOutcome, BatchItemResult, BatchReport, DrainReport, EventSyncStatus, SyncStatus,
};

/// Default bound for a single remote attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cooperative cancellation flag for a running drain.
#[derive(Debug, Default)]
struct CancelToken {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
struct Lane {
    queue: Mutex<SyncQueue>,
    drain_gate: tokio::sync::Mutex<()>,
    cancel: CancelToken,
    draining: AtomicBool,
}

impl Lane {
    fn new(user_id: &str) -> Self {
        Self {
            queue: Mutex::new(SyncQueue::new(user_id)),
            drain_gate: tokio::sync::Mutex::new(()),
            cancel: CancelToken::default(),
            draining: AtomicBool::new(false),
        }
    }

    fn queue(&self) -> MutexGuard<'_, SyncQueue> {
        // Queue transitions are single assignments; a poisoned guard is still consistent.
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Returns an in-flight event to `pending` unless disarmed, so a dropped or
/// cancelled delivery never leaves it half-sent.
struct InFlightGuard<'a> {
    lane: &'a Lane,
    event_id: String,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    fn new(lane: &'a Lane, event_id: &str) -> Self {
        Self {
            lane,
            event_id: event_id.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.lane.queue().reset_to_pending(&self.event_id);
        }
    }
}

struct DrainingFlag<'a>(&'a AtomicBool);

impl Drop for DrainingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Delivery {
    Acknowledged,
    Failed(SyncError),
    Cancelled,
}

/// Delivers queued progress events with retries, per-user FIFO order and
/// per-attempt timeouts.
pub struct SyncCoordinator<R> {
    remote: Arc<R>,
    policy: BackoffPolicy,
    attempt_timeout: Duration,
    lanes: RwLock<HashMap<String, Arc<Lane>>>,
    rng: Mutex<Mcg128Xsl64>,
}

impl<R: RemoteProgressApi> SyncCoordinator<R> {
    pub fn new(remote: Arc<R>, policy: BackoffPolicy) -> Self {
        Self {
            remote,
            policy,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            lanes: RwLock::new(HashMap::new()),
            rng: Mutex::new(Mcg128Xsl64::from_entropy()),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Seed the jitter generator for reproducible delays.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock().unwrap_or_else(|e| e.into_inner()) = Mcg128Xsl64::seed_from_u64(seed);
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Queue an applied event for delivery. Returns `false` for an id already queued.
    pub fn enqueue(&self, event: ProgressEvent) -> bool {
        self.enqueue_entry(QueueEntry::new(event, None))
    }

    /// Queue an event as a member of `batch_id`.
    pub fn enqueue_in_batch(&self, event: ProgressEvent, batch_id: &str) -> bool {
        self.enqueue_entry(QueueEntry::new(event, Some(batch_id.to_string())))
    }

    /// Queue a prepared entry, e.g. one restored from the journal.
    pub fn enqueue_entry(&self, mut entry: QueueEntry) -> bool {
        // An entry restored mid-flight was never acknowledged; send it again.
        if entry.event.sync_state == SyncState::InFlight {
            entry.event.sync_state = SyncState::Pending;
        }
        let user_id = entry.event.user_id.clone();
        let event_id = entry.event.id.clone();
        let added = self.lane(&user_id).queue().push(entry);
        if added {
            debug!(%user_id, %event_id, "event queued for sync");
        }
        added
    }

    pub fn status(&self, user_id: &str) -> Vec<EventSyncStatus> {
        self.existing(user_id)
            .map(|lane| lane.queue().statuses())
            .unwrap_or_default()
    }

    pub fn summary(&self, user_id: &str) -> SyncStatus {
        self.existing(user_id)
            .map(|lane| {
                let in_progress = lane.draining.load(Ordering::SeqCst);
                lane.queue().summary(in_progress)
            })
            .unwrap_or_default()
    }

    /// Users with a queue, sorted.
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .lanes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        users.sort();
        users
    }

    /// Re-arm a retryable failure so the next drain delivers it again.
    ///
    /// # Errors
    /// [`SyncError::InvalidState`] unless the event failed transiently.
    pub fn retry(&self, user_id: &str, event_id: &str) -> Result<(), SyncError> {
        self.lane_or_unknown(user_id, event_id)?
            .queue()
            .retry(event_id)?;
        info!(user_id, event_id, "failed event re-armed for sync");
        Ok(())
    }

    /// Give up on a failed event. Local effects of the event are kept.
    pub fn discard(&self, user_id: &str, event_id: &str) -> Result<ProgressEvent, SyncError> {
        let event = self
            .lane_or_unknown(user_id, event_id)?
            .queue()
            .discard(event_id)?;
        warn!(user_id, event_id, "failed event discarded without remote delivery");
        Ok(event)
    }

    pub fn prune_acknowledged(&self, user_id: &str) -> usize {
        self.existing(user_id)
            .map(|lane| lane.queue().prune_acknowledged())
            .unwrap_or(0)
    }

    /// Stop a running drain for `user_id`. The event being delivered returns
    /// to `pending`.
    pub fn cancel(&self, user_id: &str) {
        if let Some(lane) = self.existing(user_id) {
            lane.cancel.cancel();
            debug!(user_id, "sync cancellation requested");
        }
    }

    /// Deliver every eligible event for `user_id`, oldest first.
    ///
    /// Stops at the first event that cannot be delivered; later events stay
    /// queued behind it. Members of one batch are attempted independently.
    pub async fn sync_user(&self, user_id: &str) -> DrainReport {
        let Some(lane) = self.existing(user_id) else {
            return DrainReport::default();
        };

        let _gate = lane.drain_gate.lock().await;
        lane.cancel.reset();
        lane.draining.store(true, Ordering::SeqCst);
        let _draining = DrainingFlag(&lane.draining);

        let mut report = DrainReport::default();
        loop {
            if lane.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let next = {
                let mut queue = lane.queue();
                match queue.next_eligible().map(|e| e.id().to_string()) {
                    Some(id) => queue.begin(&id).ok(),
                    None => None,
                }
            };
            let Some(event) = next else { break };
            let event_id = event.id.clone();

            match self.deliver(&lane, event).await {
                Delivery::Acknowledged => report.acknowledged.push(event_id),
                Delivery::Failed(err) => report.failed.push(err),
                Delivery::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }
        }

        report.blocked_by = lane.queue().head().map(|e| e.id().to_string());
        report
    }

    /// Drain `user_id` and report the outcome of each member of `batch_id`.
    pub async fn sync_batch(&self, user_id: &str, batch_id: &str) -> BatchReport {
        let drain = self.sync_user(user_id).await;
        let items = self
            .existing(user_id)
            .map(|lane| {
                lane.queue()
                    .batch_members(batch_id)
                    .into_iter()
                    .map(|entry| BatchItemResult {
                        event_id: entry.id().to_string(),
                        outcome: match entry.state() {
                            SyncState::Acknowledged => BatchItemOutcome::Acknowledged,
                            SyncState::Failed => BatchItemOutcome::Failed(
                                drain
                                    .failed
                                    .iter()
                                    .find(|e| error_event_id(e) == Some(entry.id()))
                                    .cloned()
                                    .unwrap_or_else(|| stored_failure(entry)),
                            ),
                            SyncState::Pending | SyncState::InFlight => BatchItemOutcome::Pending,
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        BatchReport {
            batch_id: batch_id.to_string(),
            items,
        }
    }

    async fn deliver(&self, lane: &Lane, event: ProgressEvent) -> Delivery {
        let mut guard = InFlightGuard::new(lane, &event.id);
        let request = ProgressRequest::from_event(&event);

        // The retry budget is per delivery; the stored count spans drains.
        let mut attempt = 0;
        loop {
            if let Err(err) = lane.queue().record_attempt(&event.id) {
                guard.disarm();
                return Delivery::Failed(err);
            }
            attempt += 1;
            debug!(user_id = %event.user_id, event_id = %event.id, attempt, "submitting progress event");

            let result = tokio::select! {
                _ = lane.cancel.cancelled() => return Delivery::Cancelled,
                r = tokio::time::timeout(self.attempt_timeout, self.remote.submit(&request)) => r,
            };

            let failure = match result {
                Ok(Ok(ack)) => {
                    guard.disarm();
                    let _ = lane.queue().acknowledge(&event.id, Utc::now());
                    info!(
                        user_id = %event.user_id,
                        event_id = %event.id,
                        attempt,
                        duplicate = ack.duplicate,
                        "progress event acknowledged"
                    );
                    return Delivery::Acknowledged;
                }
                Ok(Err(failure)) => failure,
                Err(_elapsed) => RemoteFailure::Transient {
                    message: format!("attempt timed out after {:?}", self.attempt_timeout),
                },
            };

            let error = match failure {
                RemoteFailure::Permanent { status, message } => SyncError::Permanent {
                    event_id: event.id.clone(),
                    status,
                    message,
                },
                RemoteFailure::Transient { message } if self.policy.allows_retry(attempt) => {
                    let delay = {
                        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                        self.policy.delay_for(attempt - 1, &mut *rng)
                    };
                    warn!(
                        user_id = %event.user_id,
                        event_id = %event.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "transient sync failure, retrying"
                    );
                    tokio::select! {
                        _ = lane.cancel.cancelled() => return Delivery::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
                RemoteFailure::Transient { message } => SyncError::Transient {
                    event_id: event.id.clone(),
                    attempts: attempt,
                    message,
                },
            };

            guard.disarm();
            let _ = lane.queue().fail(&event.id, &error);
            warn!(user_id = %event.user_id, event_id = %event.id, error = %error, "progress event failed to sync");
            return Delivery::Failed(error);
        }
    }

    fn lane(&self, user_id: &str) -> Arc<Lane> {
        if let Some(lane) = self.existing(user_id) {
            return lane;
        }
        self.lanes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Lane::new(user_id)))
            .clone()
    }

    fn existing(&self, user_id: &str) -> Option<Arc<Lane>> {
        self.lanes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned()
    }

    fn lane_or_unknown(&self, user_id: &str, event_id: &str) -> Result<Arc<Lane>, SyncError> {
        self.existing(user_id).ok_or_else(|| SyncError::UnknownEvent {
            user_id: user_id.to_string(),
            event_id: event_id.to_string(),
        })
    }
}

fn error_event_id(error: &SyncError) -> Option<&str> {
    match error {
        SyncError::Transient { event_id, .. }
        | SyncError::Permanent { event_id, .. }
        | SyncError::InvalidState { event_id, .. }
        | SyncError::UnknownEvent { event_id, .. } => Some(event_id),
        SyncError::Endpoint(_) => None,
    }
}

/// Rebuild the error of a failure recorded before this drain.
fn stored_failure(entry: &QueueEntry) -> SyncError {
    let message = entry.last_error.clone().unwrap_or_default();
    if entry.retryable {
        SyncError::Transient {
            event_id: entry.id().to_string(),
            attempts: entry.attempts,
            message,
        }
    } else {
        SyncError::Permanent {
            event_id: entry.id().to_string(),
            status: None,
            message,
        }
    }
}
