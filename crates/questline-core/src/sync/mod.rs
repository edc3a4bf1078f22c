//! Progress synchronization with the remote store.
//!
//! Applied events are queued per user and delivered in application order.
//! Transient failures are retried with backoff; permanent rejections stop at
//! `failed` until the caller discards them.

pub mod backoff;
pub mod coordinator;
pub mod remote_client;
pub mod sync_queue;
pub mod types;

#[cfg(test)]
mod coordinator_tests;

pub use backoff::BackoffPolicy;
pub use coordinator::{SyncCoordinator, DEFAULT_ATTEMPT_TIMEOUT};
pub use remote_client::{
    HttpRemoteClient, ProfileOutcome, ProgressRequest, RemoteAck, RemoteFailure,
    RemoteProfile, RemoteProgressApi,
};
pub use sync_queue::{QueueEntry, SyncQueue};
pub use types::{
    BatchItemOutcome, BatchItemResult, BatchReport, DrainReport, EventSyncStatus, SyncStatus,
};
