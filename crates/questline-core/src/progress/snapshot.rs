//! Per-user aggregate progress.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::rewards::{self, Level, RewardId};
use crate::streak::StreakTracker;

/// Skill mastery tiers, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl MasteryLevel {
    pub fn from_progress(progress: u8) -> Self {
        match progress {
            80..=u8::MAX => MasteryLevel::Expert,
            60..=79 => MasteryLevel::Advanced,
            40..=59 => MasteryLevel::Intermediate,
            _ => MasteryLevel::Beginner,
        }
    }
}

/// Mastery gained per skill listed on a completed stage.
pub const STAGE_SKILL_GAIN: u8 = 20;
/// Mastery gained per practice session.
pub const PRACTICE_SKILL_GAIN: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMastery {
    /// 0-100
    pub progress: u8,
    pub level: MasteryLevel,
}

impl SkillMastery {
    pub fn with_progress(progress: u8) -> Self {
        let progress = progress.min(100);
        Self {
            progress,
            level: MasteryLevel::from_progress(progress),
        }
    }

    pub fn gain(&mut self, amount: u8) {
        *self = Self::with_progress(self.progress.saturating_add(amount));
    }
}

impl Default for SkillMastery {
    fn default() -> Self {
        Self::with_progress(0)
    }
}

/// Activity counted towards the current ISO week's quest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTally {
    /// Monday of the tallied week
    pub week_start: Option<NaiveDate>,
    pub stages_completed: u32,
    pub skills_practiced: BTreeSet<String>,
    pub active_days: BTreeSet<NaiveDate>,
}

impl WeeklyTally {
    /// Monday of the ISO week containing `date`.
    pub fn week_start_of(date: NaiveDate) -> NaiveDate {
        date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
    }

    /// Start a fresh tally if `date` falls in a later week.
    pub(crate) fn roll_to(&mut self, date: NaiveDate) {
        let week = Self::week_start_of(date);
        if self.week_start != Some(week) {
            *self = WeeklyTally {
                week_start: Some(week),
                ..Default::default()
            };
        }
    }

    /// This tally viewed from `week_start`; empty when it belongs to another week.
    pub fn for_week(&self, week_start: NaiveDate) -> WeeklyTally {
        if self.week_start == Some(week_start) {
            self.clone()
        } else {
            WeeklyTally {
                week_start: Some(week_start),
                ..Default::default()
            }
        }
    }
}

/// When and by which event a reward unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRecord {
    pub reward: RewardId,
    pub unlocked_at: DateTime<Utc>,
    pub event_id: String,
}

/// Current aggregate state of one learner.
///
/// Only [`super::ProgressStore`] mutates snapshots handed out to callers; the
/// public fields are a read-only view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub user_id: String,
    #[serde(default)]
    pub domain: Option<String>,
    pub total_points: u64,
    pub completed_stage_ids: BTreeSet<String>,
    pub skill_masteries: BTreeMap<String, SkillMastery>,
    pub streak: StreakTracker,
    pub unlocked_badge_ids: BTreeSet<String>,
    pub unlocked_achievement_ids: BTreeSet<String>,
    pub unlocks: Vec<UnlockRecord>,
    pub best_assessment_score: Option<u8>,
    pub completed_challenge_ids: BTreeSet<String>,
    pub resources_completed: u32,
    pub week: WeeklyTally,
    pub events_applied: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl ProgressSnapshot {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            domain: None,
            total_points: 0,
            completed_stage_ids: BTreeSet::new(),
            skill_masteries: BTreeMap::new(),
            streak: StreakTracker::default(),
            unlocked_badge_ids: BTreeSet::new(),
            unlocked_achievement_ids: BTreeSet::new(),
            unlocks: Vec::new(),
            best_assessment_score: None,
            completed_challenge_ids: BTreeSet::new(),
            resources_completed: 0,
            week: WeeklyTally::default(),
            events_applied: 0,
            last_event_at: None,
        }
    }

    /// Derived from `total_points`; never stored.
    pub fn current_level(&self) -> Level {
        rewards::level_for(self.total_points)
    }

    pub fn points_to_next_level(&self) -> u64 {
        rewards::points_to_next_level(self.total_points)
    }

    pub fn is_unlocked(&self, reward: &RewardId) -> bool {
        match reward {
            RewardId::Badge(id) => self.unlocked_badge_ids.contains(id),
            RewardId::Achievement(id) => self.unlocked_achievement_ids.contains(id),
        }
    }

    /// Number of skills at or above `level`.
    pub fn skills_at_least(&self, level: MasteryLevel) -> usize {
        self.skill_masteries
            .values()
            .filter(|m| m.level >= level)
            .count()
    }

    /// Record an unlock. Already unlocked rewards are left untouched.
    pub(crate) fn record_unlock(
        &mut self,
        reward: RewardId,
        unlocked_at: DateTime<Utc>,
        event_id: &str,
    ) -> bool {
        let inserted = match &reward {
            RewardId::Badge(id) => self.unlocked_badge_ids.insert(id.clone()),
            RewardId::Achievement(id) => self.unlocked_achievement_ids.insert(id.clone()),
        };
        if inserted {
            self.unlocks.push(UnlockRecord {
                reward,
                unlocked_at,
                event_id: event_id.to_string(),
            });
        }
        inserted
    }
}
