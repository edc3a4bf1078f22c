//! Progress event model.
//!
//! Every qualifying learner action becomes a [`ProgressEvent`]. Events are
//! immutable once validated except for their [`SyncState`], and carry a
//! globally unique id so that every downstream step can treat retransmission
//! as a no-op.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::ValidationError;

/// Default tolerance for timestamps slightly ahead of the local clock.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 300;

/// Kind of learning action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    StageCompleted,
    SkillPracticed,
    ResourceCompleted,
    DailyActivity,
    ChallengeCompleted,
}

impl ProgressEventKind {
    pub const ALL: [ProgressEventKind; 5] = [
        ProgressEventKind::StageCompleted,
        ProgressEventKind::SkillPracticed,
        ProgressEventKind::ResourceCompleted,
        ProgressEventKind::DailyActivity,
        ProgressEventKind::ChallengeCompleted,
    ];

    /// Wire name used by the remote API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressEventKind::StageCompleted => "stage_completed",
            ProgressEventKind::SkillPracticed => "skill_practiced",
            ProgressEventKind::ResourceCompleted => "resource_completed",
            ProgressEventKind::DailyActivity => "daily_activity",
            ProgressEventKind::ChallengeCompleted => "challenge_completed",
        }
    }

    /// Whether this kind counts as a day of learning activity for streaks.
    ///
    /// Completing a daily challenge only awards points.
    pub fn implies_activity(&self) -> bool {
        !matches!(self, ProgressEventKind::ChallengeCompleted)
    }
}

impl fmt::Display for ProgressEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressEventKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProgressEventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
    }
}

/// Roadmap stage difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// Point multiplier in percent.
    pub fn multiplier_percent(&self) -> u32 {
        match self {
            Difficulty::Beginner => 100,
            Difficulty::Intermediate => 150,
            Difficulty::Advanced => 200,
        }
    }
}

/// Kind-specific event fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressPayload {
    StageCompleted {
        stage_id: String,
        #[serde(default)]
        skills: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<Difficulty>,
    },
    SkillPracticed {
        skill: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assessment_score: Option<u8>,
    },
    ResourceCompleted {
        resource_id: String,
    },
    DailyActivity,
    ChallengeCompleted {
        challenge_id: String,
    },
}

impl ProgressPayload {
    pub fn kind(&self) -> ProgressEventKind {
        match self {
            ProgressPayload::StageCompleted { .. } => ProgressEventKind::StageCompleted,
            ProgressPayload::SkillPracticed { .. } => ProgressEventKind::SkillPracticed,
            ProgressPayload::ResourceCompleted { .. } => ProgressEventKind::ResourceCompleted,
            ProgressPayload::DailyActivity => ProgressEventKind::DailyActivity,
            ProgressPayload::ChallengeCompleted { .. } => ProgressEventKind::ChallengeCompleted,
        }
    }

    /// Points awarded when the action does not specify any.
    pub fn default_points(&self) -> u32 {
        match self {
            ProgressPayload::StageCompleted { difficulty, .. } => {
                let percent = difficulty.map_or(100, |d| d.multiplier_percent());
                // Rounded half-up, matching the stage point table.
                (100 * percent + 50) / 100
            }
            ProgressPayload::SkillPracticed { .. } => 25,
            ProgressPayload::ResourceCompleted { .. } => 50,
            ProgressPayload::DailyActivity => 10,
            ProgressPayload::ChallengeCompleted { .. } => 25,
        }
    }

    fn check(&self) -> Result<(), ValidationError> {
        let kind = self.kind();
        let require = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(ValidationError::InvalidPayload {
                    kind: kind.to_string(),
                    message: format!("'{field}' must not be empty"),
                })
            } else {
                Ok(())
            }
        };

        match self {
            ProgressPayload::StageCompleted { stage_id, skills, .. } => {
                require("stage_id", stage_id.as_str())?;
                skills.iter().try_for_each(|s| require("skills", s.as_str()))
            }
            ProgressPayload::SkillPracticed {
                skill,
                assessment_score,
            } => {
                require("skill", skill.as_str())?;
                match assessment_score {
                    Some(score) if *score > 100 => Err(ValidationError::InvalidPayload {
                        kind: kind.to_string(),
                        message: format!("assessment_score {score} exceeds 100"),
                    }),
                    _ => Ok(()),
                }
            }
            ProgressPayload::ResourceCompleted { resource_id } => require("resource_id", resource_id.as_str()),
            ProgressPayload::DailyActivity => Ok(()),
            ProgressPayload::ChallengeCompleted { challenge_id } => {
                require("challenge_id", challenge_id.as_str())
            }
        }
    }
}

/// Delivery state of an event against the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    InFlight,
    Acknowledged,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::InFlight => "in_flight",
            SyncState::Acknowledged => "acknowledged",
            SyncState::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "in_flight" => Ok(SyncState::InFlight),
            "acknowledged" => Ok(SyncState::Acknowledged),
            "failed" => Ok(SyncState::Failed),
            other => Err(format!("unknown sync state: {other}")),
        }
    }
}

/// A validated learning action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub payload: ProgressPayload,
    pub points: u32,
    pub occurred_at: DateTime<Utc>,
    pub sync_state: SyncState,
}

impl ProgressEvent {
    pub fn kind(&self) -> ProgressEventKind {
        self.payload.kind()
    }

    /// Logical calendar day of the action (UTC).
    pub fn activity_date(&self) -> NaiveDate {
        self.occurred_at.date_naive()
    }
}

/// An unvalidated action as reported by the presentation layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAction {
    /// Caller-supplied id for retransmissions of the same action.
    #[serde(default)]
    pub event_id: Option<String>,
    pub user_id: String,
    pub kind: String,
    /// Kind-specific fields as a JSON object.
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl RawAction {
    /// Build a raw action from an already-typed payload.
    pub fn typed(user_id: impl Into<String>, payload: ProgressPayload) -> Self {
        let kind = payload.kind().as_str().to_string();
        let mut value = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("type");
        }
        Self {
            event_id: None,
            user_id: user_id.into(),
            kind,
            payload: value,
            points: None,
            occurred_at: None,
        }
    }

    pub fn with_points(mut self, points: i64) -> Self {
        self.points = Some(points);
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub fn with_event_id(mut self, id: impl Into<String>) -> Self {
        self.event_id = Some(id.into());
        self
    }
}

/// Turns raw actions into [`ProgressEvent`]s.
#[derive(Clone)]
pub struct EventValidator {
    clock: Arc<dyn Clock>,
    clock_skew: Duration,
}

impl EventValidator {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), Duration::seconds(DEFAULT_CLOCK_SKEW_SECS))
    }

    pub fn with_clock(clock: Arc<dyn Clock>, clock_skew: Duration) -> Self {
        Self { clock, clock_skew }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Validate a raw action.
    ///
    /// # Errors
    /// Returns [`ValidationError`] for unknown kinds, negative points,
    /// timestamps beyond the clock-skew tolerance, or malformed payloads.
    pub fn validate(&self, raw: RawAction) -> Result<ProgressEvent, ValidationError> {
        if raw.user_id.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "user_id".into(),
                message: "must not be empty".into(),
            });
        }
        if matches!(raw.user_id.as_str(), "." | "..") {
            return Err(ValidationError::InvalidValue {
                field: "user_id".into(),
                message: "must not be a dot segment".into(),
            });
        }

        let kind: ProgressEventKind = raw.kind.parse()?;

        if let Some(points) = raw.points {
            if points < 0 {
                return Err(ValidationError::NegativePoints(points));
            }
        }

        let now = self.clock.now();
        let occurred_at = raw.occurred_at.unwrap_or(now);
        if occurred_at > now + self.clock_skew {
            return Err(ValidationError::FutureTimestamp { occurred_at, now });
        }

        let payload = parse_payload(kind, raw.payload)?;
        payload.check()?;

        let points = match raw.points {
            Some(points) => u32::try_from(points).map_err(|_| ValidationError::InvalidValue {
                field: "points".into(),
                message: format!("{points} is out of range"),
            })?,
            None => payload.default_points(),
        };

        let id = match raw.event_id {
            Some(id) if id.trim().is_empty() => {
                return Err(ValidationError::InvalidValue {
                    field: "event_id".into(),
                    message: "must not be empty".into(),
                })
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        Ok(ProgressEvent {
            id,
            user_id: raw.user_id,
            payload,
            points,
            occurred_at,
            sync_state: SyncState::Pending,
        })
    }
}

impl Default for EventValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_payload(
    kind: ProgressEventKind,
    payload: serde_json::Value,
) -> Result<ProgressPayload, ValidationError> {
    let mut fields = match payload {
        serde_json::Value::Null => serde_json::Map::new(),
        serde_json::Value::Object(map) => map,
        other => {
            return Err(ValidationError::InvalidPayload {
                kind: kind.to_string(),
                message: format!("expected an object, got {other}"),
            })
        }
    };
    fields.insert("type".into(), serde_json::Value::String(kind.as_str().into()));

    serde_json::from_value(serde_json::Value::Object(fields)).map_err(|e| {
        ValidationError::InvalidPayload {
            kind: kind.to_string(),
            message: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use serde_json::json;

    fn validator_at(now: DateTime<Utc>) -> EventValidator {
        EventValidator::with_clock(
            Arc::new(ManualClock::new(now)),
            Duration::seconds(DEFAULT_CLOCK_SKEW_SECS),
        )
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn raw(kind: &str, payload: serde_json::Value) -> RawAction {
        RawAction {
            user_id: "learner-1".into(),
            kind: kind.into(),
            payload,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_stage_completed() {
        let v = validator_at(noon());
        let event = v
            .validate(
                raw(
                    "stage_completed",
                    json!({"stage_id": "fundamentals", "skills": ["rust"]}),
                )
                .with_points(50),
            )
            .unwrap();

        assert_eq!(event.kind(), ProgressEventKind::StageCompleted);
        assert_eq!(event.points, 50);
        assert_eq!(event.occurred_at, noon());
        assert_eq!(event.sync_state, SyncState::Pending);
        assert_eq!(event.id.len(), 36);
    }

    #[test]
    fn test_dot_segment_user_id_rejected() {
        let v = validator_at(noon());
        let mut action = raw("daily_activity", json!({}));
        action.user_id = "..".into();
        let err = v.validate(action).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "user_id"));

        let mut action = raw("daily_activity", json!({}));
        action.user_id = "alice/../x".into();
        assert_eq!(v.validate(action).unwrap().user_id, "alice/../x");
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let v = validator_at(noon());
        let err = v.validate(raw("stage_progress", json!({}))).unwrap_err();
        assert_eq!(err, ValidationError::UnknownKind("stage_progress".into()));
    }

    #[test]
    fn test_negative_points_rejected() {
        let v = validator_at(noon());
        let err = v
            .validate(raw("daily_activity", json!({})).with_points(-1))
            .unwrap_err();
        assert_eq!(err, ValidationError::NegativePoints(-1));
    }

    #[test]
    fn test_future_timestamp_beyond_skew_rejected() {
        let v = validator_at(noon());
        let within = noon() + Duration::seconds(DEFAULT_CLOCK_SKEW_SECS);
        assert!(v.validate(raw("daily_activity", json!({})).at(within)).is_ok());

        let beyond = within + Duration::seconds(1);
        let err = v
            .validate(raw("daily_activity", json!({})).at(beyond))
            .unwrap_err();
        assert!(matches!(err, ValidationError::FutureTimestamp { .. }));
    }

    #[test]
    fn test_payload_mismatch_rejected() {
        let v = validator_at(noon());
        let err = v
            .validate(raw("skill_practiced", json!({"stage_id": "x"})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPayload { .. }));

        let err = v
            .validate(raw("resource_completed", json!({"resource_id": "  "})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPayload { .. }));
    }

    #[test]
    fn test_assessment_score_bounds() {
        let v = validator_at(noon());
        let err = v
            .validate(raw(
                "skill_practiced",
                json!({"skill": "sql", "assessment_score": 101}),
            ))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPayload { .. }));
    }

    #[test]
    fn test_default_points_per_kind() {
        let v = validator_at(noon());
        let practiced = v
            .validate(raw("skill_practiced", json!({"skill": "sql"})))
            .unwrap();
        assert_eq!(practiced.points, 25);

        let advanced = v
            .validate(raw(
                "stage_completed",
                json!({"stage_id": "s1", "difficulty": "advanced"}),
            ))
            .unwrap();
        assert_eq!(advanced.points, 200);

        let intermediate = v
            .validate(raw(
                "stage_completed",
                json!({"stage_id": "s2", "difficulty": "intermediate"}),
            ))
            .unwrap();
        assert_eq!(intermediate.points, 150);

        let daily = v.validate(raw("daily_activity", json!(null))).unwrap();
        assert_eq!(daily.points, 10);
    }

    #[test]
    fn test_caller_supplied_id_is_kept() {
        let v = validator_at(noon());
        let event = v
            .validate(raw("daily_activity", json!({})).with_event_id("retransmit-1"))
            .unwrap();
        assert_eq!(event.id, "retransmit-1");
    }

    #[test]
    fn test_typed_raw_action_round_trips_through_validation() {
        let v = validator_at(noon());
        let action = RawAction::typed(
            "learner-1",
            ProgressPayload::ChallengeCompleted {
                challenge_id: "daily_easy_2025-03-10".into(),
            },
        );
        let event = v.validate(action).unwrap();
        assert_eq!(
            event.payload,
            ProgressPayload::ChallengeCompleted {
                challenge_id: "daily_easy_2025-03-10".into()
            }
        );
        assert!(!event.kind().implies_activity());
    }

    #[test]
    fn test_event_serializes_flat_with_type_tag() {
        let v = validator_at(noon());
        let event = v
            .validate(raw("resource_completed", json!({"resource_id": "r1"})))
            .unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "resource_completed");
        assert_eq!(value["resource_id"], "r1");
        assert_eq!(value["sync_state"], "pending");
    }
}
