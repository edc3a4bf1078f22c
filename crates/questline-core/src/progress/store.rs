//! Authoritative in-memory progress state.
//!
//! Each user owns one ledger behind its own mutex. `apply_event` is the only
//! way to change a snapshot, so concurrent actions for one user serialize
//! while different users never contend beyond the map lookup.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde::Serialize;
use tracing::{debug, info};

use super::snapshot::{ProgressSnapshot, PRACTICE_SKILL_GAIN, STAGE_SKILL_GAIN};
use crate::error::{OutOfOrderEventError, Result};
use crate::event::{ProgressEvent, ProgressPayload};
use crate::rewards::{self, Level, RewardCatalog, RewardId};
use crate::streak::compute_streak;

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyOutcome {
    pub snapshot: ProgressSnapshot,
    /// Rewards unlocked by this event only. Empty for duplicates.
    pub newly_unlocked: BTreeSet<RewardId>,
    /// Points actually credited. Repeated stage or challenge completions credit 0.
    pub points_awarded: u32,
    /// The new level when this event crossed a level threshold.
    pub level_up: Option<Level>,
    /// `false` when the event id was already applied.
    pub applied: bool,
}

#[derive(Debug)]
struct UserLedger {
    snapshot: ProgressSnapshot,
    applied_ids: HashSet<String>,
}

impl UserLedger {
    fn new(user_id: &str) -> Self {
        Self {
            snapshot: ProgressSnapshot::new(user_id),
            applied_ids: HashSet::new(),
        }
    }
}

/// Holds one [`ProgressSnapshot`] per user.
pub struct ProgressStore {
    catalog: Arc<RewardCatalog>,
    ledgers: RwLock<HashMap<String, Arc<Mutex<UserLedger>>>>,
}

impl ProgressStore {
    pub fn new(catalog: RewardCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            ledgers: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &RewardCatalog {
        &self.catalog
    }

    /// Return the user's snapshot, creating an empty profile if none exists.
    ///
    /// A domain given for an existing profile without one is recorded; an
    /// existing domain is never overwritten.
    pub fn get_or_create(&self, user_id: &str, domain: Option<&str>) -> ProgressSnapshot {
        let ledger = self.ledger(user_id);
        let mut ledger = lock(&ledger);
        if ledger.snapshot.domain.is_none() {
            ledger.snapshot.domain = domain.map(str::to_string);
        }
        ledger.snapshot.clone()
    }

    /// Read-only copy of a user's snapshot.
    pub fn snapshot(&self, user_id: &str) -> Option<ProgressSnapshot> {
        let ledger = self.existing(user_id)?;
        let snapshot = lock(&ledger).snapshot.clone();
        Some(snapshot)
    }

    /// Known user ids, sorted.
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .ledgers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        users.sort();
        users
    }

    pub fn has_applied(&self, user_id: &str, event_id: &str) -> bool {
        self.existing(user_id)
            .map(|ledger| lock(&ledger).applied_ids.contains(event_id))
            .unwrap_or(false)
    }

    pub fn apply_event(&self, event: &ProgressEvent) -> Result<ApplyOutcome> {
        self.apply_event_with(event, |_, _| {})
    }

    /// Apply `event` and run `on_applied` while the user's ledger is still locked.
    ///
    /// `on_applied` runs only for events that changed state, never for
    /// duplicates or rejected events. Enqueueing for sync from this hook keeps
    /// queue order identical to application order.
    ///
    /// # Errors
    /// Returns [`crate::CoreError::OutOfOrder`] when `event` is older than the
    /// user's last applied event. The snapshot is left untouched.
    pub fn apply_event_with<F>(&self, event: &ProgressEvent, on_applied: F) -> Result<ApplyOutcome>
    where
        F: FnOnce(&ProgressEvent, &ApplyOutcome),
    {
        let ledger = self.ledger(&event.user_id);
        let mut ledger = lock(&ledger);

        if ledger.applied_ids.contains(&event.id) {
            debug!(user_id = %event.user_id, event_id = %event.id, "duplicate event ignored");
            return Ok(ApplyOutcome {
                snapshot: ledger.snapshot.clone(),
                newly_unlocked: BTreeSet::new(),
                points_awarded: 0,
                level_up: None,
                applied: false,
            });
        }

        if let Some(last) = ledger.snapshot.last_event_at {
            if event.occurred_at < last {
                return Err(
                    OutOfOrderEventError::for_timestamps(&event.user_id, event.occurred_at, last)
                        .into(),
                );
            }
        }

        let mut next = ledger.snapshot.clone();
        let level_before = next.current_level();
        let points_awarded = apply_aggregate(&mut next, event);

        if event.kind().implies_activity() {
            let date = event.activity_date();
            next.streak = compute_streak(&event.user_id, &next.streak, date)?;
            next.week.roll_to(date);
            next.week.active_days.insert(date);
        }

        let newly_unlocked = rewards::evaluate(&next, &self.catalog);
        for reward in &newly_unlocked {
            next.record_unlock(reward.clone(), event.occurred_at, &event.id);
        }

        next.events_applied += 1;
        next.last_event_at = Some(event.occurred_at);

        let level_after = next.current_level();
        let level_up = (level_after.level > level_before.level).then_some(level_after);

        ledger.snapshot = next;
        ledger.applied_ids.insert(event.id.clone());

        info!(
            user_id = %event.user_id,
            event_id = %event.id,
            kind = %event.kind(),
            points = points_awarded,
            total = ledger.snapshot.total_points,
            unlocked = newly_unlocked.len(),
            "progress event applied"
        );

        let outcome = ApplyOutcome {
            snapshot: ledger.snapshot.clone(),
            newly_unlocked,
            points_awarded,
            level_up,
            applied: true,
        };
        on_applied(event, &outcome);
        Ok(outcome)
    }

    fn ledger(&self, user_id: &str) -> Arc<Mutex<UserLedger>> {
        if let Some(ledger) = self.existing(user_id) {
            return ledger;
        }
        let mut ledgers = self.ledgers.write().unwrap_or_else(|e| e.into_inner());
        ledgers
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserLedger::new(user_id))))
            .clone()
    }

    fn existing(&self, user_id: &str) -> Option<Arc<Mutex<UserLedger>>> {
        self.ledgers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned()
    }
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new(RewardCatalog::default())
    }
}

fn lock(ledger: &Mutex<UserLedger>) -> MutexGuard<'_, UserLedger> {
    // Ledger updates are committed with a single assignment, so a poisoned
    // lock still guards a consistent snapshot.
    ledger.lock().unwrap_or_else(|e| e.into_inner())
}

/// Update the kind-specific aggregates and return the points credited.
fn apply_aggregate(snapshot: &mut ProgressSnapshot, event: &ProgressEvent) -> u32 {
    let points = match &event.payload {
        ProgressPayload::StageCompleted { stage_id, skills, .. } => {
            if !snapshot.completed_stage_ids.insert(stage_id.clone()) {
                return 0;
            }
            for skill in skills {
                snapshot
                    .skill_masteries
                    .entry(skill.clone())
                    .or_default()
                    .gain(STAGE_SKILL_GAIN);
            }
            snapshot.week.roll_to(event.activity_date());
            snapshot.week.stages_completed += 1;
            event.points
        }
        ProgressPayload::SkillPracticed {
            skill,
            assessment_score,
        } => {
            snapshot
                .skill_masteries
                .entry(skill.clone())
                .or_default()
                .gain(PRACTICE_SKILL_GAIN);
            if let Some(score) = assessment_score {
                snapshot.best_assessment_score =
                    Some(snapshot.best_assessment_score.map_or(*score, |b| b.max(*score)));
            }
            snapshot.week.roll_to(event.activity_date());
            snapshot.week.skills_practiced.insert(skill.clone());
            event.points
        }
        ProgressPayload::ResourceCompleted { .. } => {
            snapshot.resources_completed += 1;
            event.points
        }
        ProgressPayload::DailyActivity => event.points,
        ProgressPayload::ChallengeCompleted { challenge_id } => {
            if !snapshot.completed_challenge_ids.insert(challenge_id.clone()) {
                return 0;
            }
            event.points
        }
    };
    snapshot.total_points += u64::from(points);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SyncState;
    use crate::rewards::{Badge, BadgeCategory, Rarity, Requirement};
    use crate::CoreError;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap() + Duration::days(n)
    }

    fn event(id: &str, payload: ProgressPayload, points: u32, at: DateTime<Utc>) -> ProgressEvent {
        ProgressEvent {
            id: id.into(),
            user_id: "learner".into(),
            payload,
            points,
            occurred_at: at,
            sync_state: SyncState::Pending,
        }
    }

    fn stage(id: &str, stage_id: &str, points: u32, at: DateTime<Utc>) -> ProgressEvent {
        event(
            id,
            ProgressPayload::StageCompleted {
                stage_id: stage_id.into(),
                skills: vec!["rust".into()],
                difficulty: None,
            },
            points,
            at,
        )
    }

    fn resource(id: &str, points: u32, at: DateTime<Utc>) -> ProgressEvent {
        event(
            id,
            ProgressPayload::ResourceCompleted {
                resource_id: format!("r-{id}"),
            },
            points,
            at,
        )
    }

    fn century_store() -> ProgressStore {
        let badge = Badge {
            id: "century".into(),
            name: "Century".into(),
            description: "Earn 100 points".into(),
            icon: "💯".into(),
            category: BadgeCategory::Milestone,
            rarity: Rarity::Common,
            points: 0,
            requirement: Requirement::TotalPoints { value: 100 },
        };
        ProgressStore::new(RewardCatalog::new(vec![badge], vec![]).unwrap())
    }

    #[test]
    fn test_points_and_streak_scenario() {
        let store = century_store();
        store.apply_event(&stage("e1", "s1", 50, day(0))).unwrap();
        store.apply_event(&resource("e2", 25, day(1))).unwrap();
        let outcome = store
            .apply_event(&resource("e3", 25, day(1) + Duration::hours(2)))
            .unwrap();

        let snapshot = outcome.snapshot;
        assert_eq!(snapshot.total_points, 100);
        assert_eq!(snapshot.streak.current_streak, 2);
        assert_eq!(snapshot.streak.longest_streak, 2);
    }

    #[test]
    fn test_badge_unlocks_exactly_once() {
        let store = century_store();
        let first = store.apply_event(&stage("e1", "s1", 60, day(0))).unwrap();
        assert!(first.newly_unlocked.is_empty());

        let crossing = store.apply_event(&resource("e2", 40, day(1))).unwrap();
        assert_eq!(
            crossing.newly_unlocked,
            BTreeSet::from([RewardId::Badge("century".into())])
        );
        assert_eq!(crossing.snapshot.unlocks[0].unlocked_at, day(1));
        assert_eq!(crossing.snapshot.unlocks[0].event_id, "e2");

        for (i, n) in (2..5).enumerate() {
            let later = store
                .apply_event(&resource(&format!("later-{i}"), 30, day(n)))
                .unwrap();
            assert!(later.newly_unlocked.is_empty());
        }
        let snapshot = store.snapshot("learner").unwrap();
        assert_eq!(snapshot.unlocks.len(), 1);
    }

    #[test]
    fn test_duplicate_event_is_a_no_op() {
        let store = ProgressStore::default();
        let e = stage("e1", "s1", 100, day(0));
        let first = store.apply_event(&e).unwrap();
        assert!(first.applied);
        assert!(!first.newly_unlocked.is_empty());

        let second = store.apply_event(&e).unwrap();
        assert!(!second.applied);
        assert!(second.newly_unlocked.is_empty());
        assert_eq!(second.snapshot, first.snapshot);
    }

    #[test]
    fn test_out_of_order_rejected_without_mutation() {
        let store = ProgressStore::default();
        store.apply_event(&resource("e1", 50, day(3))).unwrap();
        let before = store.snapshot("learner").unwrap();

        let err = store.apply_event(&resource("e0", 50, day(1))).unwrap_err();
        assert!(matches!(err, CoreError::OutOfOrder(_)));
        assert_eq!(store.snapshot("learner").unwrap(), before);
        assert!(!store.has_applied("learner", "e0"));
    }

    #[test]
    fn test_repeated_stage_awards_no_points() {
        let store = ProgressStore::default();
        store.apply_event(&stage("e1", "s1", 100, day(0))).unwrap();
        let repeat = store.apply_event(&stage("e2", "s1", 100, day(0))).unwrap();
        assert!(repeat.applied);
        assert_eq!(repeat.points_awarded, 0);
        assert_eq!(repeat.snapshot.total_points, 100);
        assert_eq!(repeat.snapshot.completed_stage_ids.len(), 1);
        assert_eq!(repeat.snapshot.skill_masteries["rust"].progress, 20);
    }

    #[test]
    fn test_challenge_completion_does_not_touch_streak() {
        let store = ProgressStore::default();
        let challenge = event(
            "c1",
            ProgressPayload::ChallengeCompleted {
                challenge_id: "daily_easy_2025-03-10".into(),
            },
            25,
            day(0),
        );
        let outcome = store.apply_event(&challenge).unwrap();
        assert_eq!(outcome.snapshot.total_points, 25);
        assert_eq!(outcome.snapshot.streak.current_streak, 0);

        let again = store
            .apply_event(&event("c2", challenge.payload.clone(), 25, day(0)))
            .unwrap();
        assert_eq!(again.points_awarded, 0);
    }

    #[test]
    fn test_level_up_reported() {
        let store = ProgressStore::default();
        let outcome = store.apply_event(&resource("e1", 500, day(0))).unwrap();
        assert_eq!(outcome.level_up.map(|l| l.level), Some(2));
        let outcome = store.apply_event(&resource("e2", 10, day(0))).unwrap();
        assert!(outcome.level_up.is_none());
    }

    #[test]
    fn test_on_applied_hook_skips_duplicates() {
        let store = ProgressStore::default();
        let e = resource("e1", 50, day(0));
        let mut calls = 0;
        store.apply_event_with(&e, |_, _| calls += 1).unwrap();
        store.apply_event_with(&e, |_, _| calls += 1).unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_get_or_create_keeps_existing_domain() {
        let store = ProgressStore::default();
        let created = store.get_or_create("learner", Some("data-science"));
        assert_eq!(created.domain.as_deref(), Some("data-science"));
        let again = store.get_or_create("learner", Some("web"));
        assert_eq!(again.domain.as_deref(), Some("data-science"));
        assert_eq!(store.users(), vec!["learner".to_string()]);
    }

    #[test]
    fn test_users_are_independent() {
        let store = ProgressStore::default();
        store.apply_event(&resource("e1", 50, day(5))).unwrap();
        let mut other = resource("e2", 50, day(1));
        other.user_id = "someone-else".into();
        assert!(store.apply_event(&other).is_ok());
        assert_eq!(store.snapshot("someone-else").unwrap().total_points, 50);
    }
}
