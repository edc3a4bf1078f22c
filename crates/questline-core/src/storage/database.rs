//! SQLite event journal.
//!
//! Provides persistent storage for:
//! - Every applied progress event, in application order, with its sync bookkeeping
//! - Local learner profiles
//!
//! Snapshots are never stored. They are rebuilt by replaying the journal.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{DatabaseError, Result};
use crate::event::{ProgressEvent, ProgressPayload, SyncState};
use crate::sync::{EventSyncStatus, QueueEntry};

/// A journaled event with its sync bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalRow {
    pub event: ProgressEvent,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub retryable: bool,
    pub batch_id: Option<String>,
    pub discarded: bool,
}

impl JournalRow {
    /// Whether the event still needs remote delivery.
    pub fn needs_sync(&self) -> bool {
        !self.discarded && self.event.sync_state != SyncState::Acknowledged
    }

    pub fn into_queue_entry(self) -> QueueEntry {
        let mut entry = QueueEntry::new(self.event.clone(), self.batch_id);
        entry.event.sync_state = self.event.sync_state;
        entry.attempts = self.attempts;
        entry.last_error = self.last_error;
        entry.retryable = self.retryable;
        entry
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub user_id: String,
    pub domain: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// SQLite journal at `<data dir>/questline.db`.
pub struct ProgressDb {
    conn: Connection,
}

impl ProgressDb {
    /// Open the journal in the data directory, creating it if needed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("questline.db");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory journal.
    pub fn open_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        super::migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Append an event. Returns `false` if the id is already journaled.
    pub fn insert_event(&self, event: &ProgressEvent, batch_id: Option<&str>) -> Result<bool> {
        let payload = serde_json::to_string(&event.payload)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO progress_events
                (id, user_id, kind, payload, points, occurred_at, sync_state, batch_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id,
                event.user_id,
                event.kind().as_str(),
                payload,
                event.points,
                event.occurred_at.to_rfc3339(),
                event.sync_state.as_str(),
                batch_id,
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Store the latest sync bookkeeping for an event.
    pub fn record_sync_status(&self, status: &EventSyncStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE progress_events
             SET sync_state = ?2, attempts = ?3, last_error = ?4, retryable = ?5
             WHERE id = ?1",
            params![
                status.event_id,
                status.state.as_str(),
                status.attempts,
                status.last_error,
                status.retryable,
            ],
        )?;
        Ok(())
    }

    /// Mark an event as given up on. It stays in the journal for replay.
    pub fn mark_discarded(&self, event_id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE progress_events SET discarded = 1 WHERE id = ?1",
            params![event_id],
        )?;
        Ok(changed == 1)
    }

    /// Events in application order, optionally for one user.
    pub fn load_events(&self, user_id: Option<&str>) -> Result<Vec<JournalRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, payload, points, occurred_at, sync_state,
                    attempts, last_error, retryable, batch_id, discarded
             FROM progress_events
             WHERE ?1 IS NULL OR user_id = ?1
             ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![user_id], raw_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(decode_row(row?)?);
        }
        Ok(out)
    }

    /// Insert a profile unless it exists. Returns `true` when created.
    pub fn create_profile(&self, user_id: &str, domain: Option<&str>) -> Result<bool> {
        let created = self.conn.execute(
            "INSERT OR IGNORE INTO profiles (user_id, domain, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, domain, Utc::now().to_rfc3339()],
        )?;
        Ok(created == 1)
    }

    pub fn profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, domain, created_at FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(user_id, domain, created_at)| -> Result<ProfileRow> {
            Ok(ProfileRow {
                user_id,
                domain,
                created_at: parse_time("profiles", &created_at)?,
            })
        })
        .transpose()
    }

    pub fn profiles(&self) -> Result<Vec<ProfileRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM profiles ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(profile) = self.profile(&id)? {
                out.push(profile);
            }
        }
        Ok(out)
    }
}

struct RawRow {
    id: String,
    user_id: String,
    payload: String,
    points: u32,
    occurred_at: String,
    sync_state: String,
    attempts: u32,
    last_error: Option<String>,
    retryable: bool,
    batch_id: Option<String>,
    discarded: bool,
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        payload: row.get(2)?,
        points: row.get(3)?,
        occurred_at: row.get(4)?,
        sync_state: row.get(5)?,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        retryable: row.get(8)?,
        batch_id: row.get(9)?,
        discarded: row.get(10)?,
    })
}

fn decode_row(raw: RawRow) -> Result<JournalRow> {
    let corrupt = |message: String| DatabaseError::CorruptRow {
        table: "progress_events",
        message: format!("{}: {message}", raw.id),
    };
    let payload: ProgressPayload =
        serde_json::from_str(&raw.payload).map_err(|e| corrupt(e.to_string()))?;
    let sync_state: SyncState = raw.sync_state.parse().map_err(corrupt)?;
    let occurred_at = parse_time("progress_events", &raw.occurred_at)?;

    Ok(JournalRow {
        event: ProgressEvent {
            id: raw.id,
            user_id: raw.user_id,
            payload,
            points: raw.points,
            occurred_at,
            sync_state,
        },
        attempts: raw.attempts,
        last_error: raw.last_error,
        retryable: raw.retryable,
        batch_id: raw.batch_id,
        discarded: raw.discarded,
    })
}

fn parse_time(table: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            DatabaseError::CorruptRow {
                table,
                message: format!("bad timestamp '{value}': {e}"),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(id: &str, user: &str, minute: u32) -> ProgressEvent {
        ProgressEvent {
            id: id.into(),
            user_id: user.into(),
            payload: ProgressPayload::SkillPracticed {
                skill: "sql".into(),
                assessment_score: Some(90),
            },
            points: 25,
            occurred_at: Utc.with_ymd_and_hms(2025, 3, 10, 9, minute, 0).unwrap(),
            sync_state: SyncState::Pending,
        }
    }

    #[test]
    fn insert_and_load_in_order() {
        let db = ProgressDb::open_memory().unwrap();
        assert!(db.insert_event(&event("e2", "u", 1), None).unwrap());
        assert!(db.insert_event(&event("e1", "u", 2), Some("b1")).unwrap());
        assert!(db.insert_event(&event("x", "other", 3), None).unwrap());
        assert!(!db.insert_event(&event("e2", "u", 1), None).unwrap());

        let rows = db.load_events(Some("u")).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.event.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
        assert_eq!(rows[0].event, event("e2", "u", 1));
        assert_eq!(rows[1].batch_id.as_deref(), Some("b1"));
        assert_eq!(db.load_events(None).unwrap().len(), 3);
    }

    #[test]
    fn sync_status_and_discard_persist() {
        let db = ProgressDb::open_memory().unwrap();
        db.insert_event(&event("e1", "u", 0), None).unwrap();
        db.record_sync_status(&EventSyncStatus {
            event_id: "e1".into(),
            kind: crate::event::ProgressEventKind::SkillPracticed,
            state: SyncState::Failed,
            attempts: 5,
            last_error: Some("HTTP 503".into()),
            retryable: true,
            batch_id: None,
            occurred_at: Utc::now(),
        })
        .unwrap();

        let row = &db.load_events(Some("u")).unwrap()[0];
        assert_eq!(row.event.sync_state, SyncState::Failed);
        assert_eq!(row.attempts, 5);
        assert!(row.retryable);
        assert!(row.needs_sync());

        let entry = row.clone().into_queue_entry();
        assert_eq!(entry.state(), SyncState::Failed);
        assert_eq!(entry.attempts, 5);

        assert!(db.mark_discarded("e1").unwrap());
        assert!(!db.load_events(Some("u")).unwrap()[0].needs_sync());
    }

    #[test]
    fn profiles_are_created_once() {
        let db = ProgressDb::open_memory().unwrap();
        assert!(db.create_profile("u", Some("data-science")).unwrap());
        assert!(!db.create_profile("u", Some("web")).unwrap());
        let profile = db.profile("u").unwrap().unwrap();
        assert_eq!(profile.domain.as_deref(), Some("data-science"));
        assert!(db.profile("missing").unwrap().is_none());
        assert_eq!(db.profiles().unwrap().len(), 1);
    }

    #[test]
    fn open_at_file_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("questline.db");
        {
            let db = ProgressDb::open_at(&path).unwrap();
            db.insert_event(&event("e1", "u", 0), None).unwrap();
        }
        let db = ProgressDb::open_at(&path).unwrap();
        assert_eq!(db.load_events(None).unwrap().len(), 1);
    }
}
