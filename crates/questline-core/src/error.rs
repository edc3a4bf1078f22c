//! Core error types for questline-core.
//!
//! Local errors (validation, ordering) are returned synchronously and never
//! reach the sync coordinator. Sync errors are recorded per event and surfaced
//! through status queries.

use std::path::PathBuf;
use thiserror::Error;

use chrono::{DateTime, NaiveDate, Utc};

/// Core error type for questline-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed event, rejected before any state mutation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Chronologically inconsistent event
    #[error(transparent)]
    OutOfOrder(#[from] OutOfOrderEventError),

    /// Remote synchronization failure
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Validation errors for incoming progress actions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Unrecognized event kind
    #[error("Unknown progress event kind: {0}")]
    UnknownKind(String),

    /// Negative point value
    #[error("Points must be non-negative, got {0}")]
    NegativePoints(i64),

    /// Timestamp too far in the future
    #[error("Event timestamp {occurred_at} is ahead of now ({now}) beyond the allowed clock skew")]
    FutureTimestamp {
        occurred_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Payload does not match the event kind
    #[error("Payload for '{kind}' is invalid: {message}")]
    InvalidPayload { kind: String, message: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// An event was applied out of chronological order for its user.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Out-of-order event for user '{user_id}': {occurred} precedes last applied activity {last}")]
pub struct OutOfOrderEventError {
    pub user_id: String,
    pub occurred: String,
    pub last: String,
}

impl OutOfOrderEventError {
    pub(crate) fn for_dates(user_id: &str, occurred: NaiveDate, last: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            occurred: occurred.to_string(),
            last: last.to_string(),
        }
    }

    pub(crate) fn for_timestamps(
        user_id: &str,
        occurred: DateTime<Utc>,
        last: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            occurred: occurred.to_rfc3339(),
            last: last.to_rfc3339(),
        }
    }
}

/// Errors surfaced by the sync coordinator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Network or server-side failure; retries were exhausted or interrupted
    #[error("Transient sync failure for event {event_id} after {attempts} attempt(s): {message}")]
    Transient {
        event_id: String,
        attempts: u32,
        message: String,
    },

    /// The remote store rejected the event
    #[error("Remote rejected event {event_id} (status {status:?}): {message}")]
    Permanent {
        event_id: String,
        status: Option<u16>,
        message: String,
    },

    /// Operation is not allowed in the event's current sync state
    #[error("Event {event_id} cannot be {action} while {state}")]
    InvalidState {
        event_id: String,
        action: &'static str,
        state: String,
    },

    /// The event is not queued for this user
    #[error("Event {event_id} is not queued for user '{user_id}'")]
    UnknownEvent { user_id: String, event_id: String },

    /// Remote API misconfiguration
    #[error("Invalid remote endpoint: {0}")]
    Endpoint(String),
}

impl SyncError {
    /// Whether a manual resync may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient { .. })
    }
}

/// Failures of the content generation service. Always recovered by fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContentError {
    #[error("Content service unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed generated content: {0}")]
    Malformed(String),

    #[error("Content generation timed out")]
    TimedOut,
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Stored row could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Could not determine the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
