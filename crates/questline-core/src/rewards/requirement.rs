//! Requirement predicates for badges and achievements.
//!
//! Each variant reads exactly one aggregate of a [`ProgressSnapshot`] and
//! compares it against its threshold with `>=`.

use serde::{Deserialize, Serialize};

use crate::progress::{MasteryLevel, ProgressSnapshot};

/// What a catalog entry needs before it unlocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// Number of distinct completed roadmap stages
    CompleteStages { value: u32 },
    /// Current consecutive-day streak
    StreakDays { value: u32 },
    /// Lifetime points
    TotalPoints { value: u64 },
    /// Number of skills at or above `min_level` (any tracked skill when unset)
    SkillMastery {
        value: u32,
        #[serde(default, alias = "details", skip_serializing_if = "Option::is_none")]
        min_level: Option<MasteryLevel>,
    },
    /// Best assessment score (0-100)
    AssessmentScore { value: u32 },
}

impl Requirement {
    /// Current measured value for this requirement.
    pub fn current(&self, snapshot: &ProgressSnapshot) -> u64 {
        match self {
            Requirement::CompleteStages { .. } => snapshot.completed_stage_ids.len() as u64,
            Requirement::StreakDays { .. } => u64::from(snapshot.streak.current_streak),
            Requirement::TotalPoints { .. } => snapshot.total_points,
            Requirement::SkillMastery { min_level, .. } => match min_level {
                Some(level) => snapshot.skills_at_least(*level) as u64,
                None => snapshot.skill_masteries.len() as u64,
            },
            Requirement::AssessmentScore { .. } => {
                snapshot.best_assessment_score.map_or(0, u64::from)
            }
        }
    }

    /// Threshold the measured value must reach.
    pub fn target(&self) -> u64 {
        match self {
            Requirement::CompleteStages { value }
            | Requirement::StreakDays { value }
            | Requirement::SkillMastery { value, .. }
            | Requirement::AssessmentScore { value } => u64::from(*value),
            Requirement::TotalPoints { value } => *value,
        }
    }

    pub fn is_met(&self, snapshot: &ProgressSnapshot) -> bool {
        self.current(snapshot) >= self.target()
    }

    /// `(current, target)` with `current` capped at `target`.
    pub fn progress(&self, snapshot: &ProgressSnapshot) -> (u64, u64) {
        let target = self.target();
        (self.current(snapshot).min(target), target)
    }
}
