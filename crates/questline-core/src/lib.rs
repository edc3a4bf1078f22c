//! # Questline Core Library
//!
//! Progress tracking and reward engine for learning roadmaps. Learner actions
//! become validated [`ProgressEvent`]s, are applied to a per-user
//! [`ProgressSnapshot`] (points, level, streak, badges, achievements) and are
//! delivered to a remote store in application order.
//!
//! ## Architecture
//!
//! - **Events**: validation of raw actions into typed events
//! - **Progress**: the authoritative per-user snapshot and its apply path
//! - **Rewards**: level table, badge and achievement catalog, unlock rules
//! - **Sync**: per-user FIFO delivery with backoff, cancellation and batches
//! - **Storage**: SQLite event journal and TOML configuration
//!
//! ## Key Components
//!
//! - [`ProgressEngine`]: entry point combining validation, state and sync
//! - [`ProgressStore`]: per-user snapshots, one lock per user
//! - [`SyncCoordinator`]: remote delivery queues
//! - [`ProgressDb`]: event journal used to rebuild state on startup
//! - [`Config`]: application configuration management

pub mod clock;
pub mod engagement;
pub mod engine;
pub mod error;
pub mod event;
pub mod goals;
pub mod progress;
pub mod rewards;
pub mod storage;
pub mod streak;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engagement::{ContentGenerator, ContentSource, Engagement, EngagementService, NoGenerator};
pub use engine::{BatchRecord, ProgressEngine, Recorded, RestoreSummary};
pub use error::{
    ConfigError, ContentError, CoreError, DatabaseError, OutOfOrderEventError, SyncError,
    ValidationError,
};
pub use event::{EventValidator, ProgressEvent, ProgressEventKind, ProgressPayload, RawAction, SyncState};
pub use goals::{daily_challenges, motivational_message, weekly_quest, DailyChallenge, WeeklyQuest};
pub use progress::{ApplyOutcome, ProgressSnapshot, ProgressStore};
pub use rewards::{Level, RewardCatalog, RewardEngine, RewardId};
pub use storage::{Config, ProgressDb};
pub use streak::StreakTracker;
pub use sync::{
    BackoffPolicy, DrainReport, EventSyncStatus, HttpRemoteClient, RemoteProgressApi,
    SyncCoordinator, SyncStatus,
};
