//! Badge and achievement catalog.
//!
//! Catalog entries are immutable. A custom catalog can be loaded from
//! `catalog.toml` in the data directory; otherwise [`RewardCatalog::default`]
//! provides the built-in set.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Requirement;
use crate::error::ConfigError;

/// Identifies an unlockable reward.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RewardId {
    Badge(String),
    Achievement(String),
}

impl RewardId {
    pub fn id(&self) -> &str {
        match self {
            RewardId::Badge(id) | RewardId::Achievement(id) => id,
        }
    }
}

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardId::Badge(id) => write!(f, "badge:{id}"),
            RewardId::Achievement(id) => write!(f, "achievement:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    Skill,
    Progress,
    Streak,
    Achievement,
    Milestone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub category: BadgeCategory,
    pub rarity: Rarity,
    /// Display value of the badge. Not added to the learner's total.
    pub points: u32,
    pub requirement: Requirement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    Milestone,
    Challenge,
    Skill,
    Consistency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub kind: AchievementKind,
    pub points: u32,
    pub requirement: Requirement,
}

/// The full set of unlockable rewards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCatalog {
    #[serde(default)]
    badges: Vec<Badge>,
    #[serde(default)]
    achievements: Vec<Achievement>,
}

impl RewardCatalog {
    /// Build a catalog, rejecting duplicate ids.
    pub fn new(badges: Vec<Badge>, achievements: Vec<Achievement>) -> Result<Self, ConfigError> {
        let catalog = Self {
            badges,
            achievements,
        };
        catalog.check_unique()?;
        Ok(catalog)
    }

    pub fn empty() -> Self {
        Self {
            badges: Vec::new(),
            achievements: Vec::new(),
        }
    }

    pub fn badges(&self) -> &[Badge] {
        &self.badges
    }

    pub fn achievements(&self) -> &[Achievement] {
        &self.achievements
    }

    pub fn badge(&self, id: &str) -> Option<&Badge> {
        self.badges.iter().find(|b| b.id == id)
    }

    pub fn achievement(&self, id: &str) -> Option<&Achievement> {
        self.achievements.iter().find(|a| a.id == id)
    }

    /// Every entry with its requirement.
    pub fn entries(&self) -> impl Iterator<Item = (RewardId, &Requirement)> + '_ {
        let badges = self
            .badges
            .iter()
            .map(|b| (RewardId::Badge(b.id.clone()), &b.requirement));
        let achievements = self
            .achievements
            .iter()
            .map(|a| (RewardId::Achievement(a.id.clone()), &a.requirement));
        badges.chain(achievements)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let catalog: RewardCatalog =
            toml::from_str(content).map_err(|e| ConfigError::InvalidValue {
                key: "catalog".into(),
                message: e.to_string(),
            })?;
        catalog.check_unique()?;
        Ok(catalog)
    }

    /// Load a catalog file, falling back to the built-in catalog when absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    fn check_unique(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for (id, _) in self.entries() {
            if !seen.insert(id.clone()) {
                return Err(ConfigError::InvalidValue {
                    key: "catalog".into(),
                    message: format!("duplicate reward id {id}"),
                });
            }
        }
        Ok(())
    }
}

impl Default for RewardCatalog {
    fn default() -> Self {
        Self {
            badges: default_badges(),
            achievements: default_achievements(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn badge(
    id: &str,
    name: &str,
    description: &str,
    icon: &str,
    category: BadgeCategory,
    rarity: Rarity,
    points: u32,
    requirement: Requirement,
) -> Badge {
    Badge {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        icon: icon.into(),
        category,
        rarity,
        points,
        requirement,
    }
}

fn default_badges() -> Vec<Badge> {
    use crate::progress::MasteryLevel;
    use BadgeCategory as C;
    use Rarity as R;
    use Requirement as Q;

    vec![
        badge("first_steps", "First Steps", "Complete your first roadmap stage", "🚀", C::Progress, R::Common, 50, Q::CompleteStages { value: 1 }),
        badge("momentum_builder", "Momentum Builder", "Complete 5 roadmap stages", "⚡", C::Progress, R::Common, 200, Q::CompleteStages { value: 5 }),
        badge("progress_pioneer", "Progress Pioneer", "Complete 10 roadmap stages", "🎯", C::Progress, R::Rare, 500, Q::CompleteStages { value: 10 }),
        badge("stage_master", "Stage Master", "Complete 25 roadmap stages", "👑", C::Progress, R::Epic, 1000, Q::CompleteStages { value: 25 }),
        badge("completion_legend", "Completion Legend", "Complete 50 roadmap stages", "🏆", C::Progress, R::Legendary, 2500, Q::CompleteStages { value: 50 }),
        badge("consistent_learner", "Consistent Learner", "Maintain a 7-day learning streak", "🔥", C::Streak, R::Common, 100, Q::StreakDays { value: 7 }),
        badge("dedication_medal", "Dedication Medal", "Maintain a 30-day learning streak", "🎖️", C::Streak, R::Rare, 500, Q::StreakDays { value: 30 }),
        badge("unstoppable_force", "Unstoppable Force", "Maintain a 100-day learning streak", "💎", C::Streak, R::Epic, 1500, Q::StreakDays { value: 100 }),
        badge("eternal_flame", "Eternal Flame", "Maintain a 365-day learning streak", "🔥💎", C::Streak, R::Legendary, 5000, Q::StreakDays { value: 365 }),
        badge("skill_sampler", "Skill Sampler", "Practice 5 different skills", "🎨", C::Skill, R::Common, 150, Q::SkillMastery { value: 5, min_level: None }),
        badge("versatile_learner", "Versatile Learner", "Achieve intermediate level in 3 skills", "🌟", C::Skill, R::Rare, 750, Q::SkillMastery { value: 3, min_level: Some(MasteryLevel::Intermediate) }),
        badge("expert_builder", "Expert Builder", "Master an advanced skill", "🛠️", C::Skill, R::Epic, 1250, Q::SkillMastery { value: 1, min_level: Some(MasteryLevel::Advanced) }),
        badge("domain_expert", "Domain Expert", "Become expert in 2 skills", "🧠", C::Skill, R::Legendary, 3000, Q::SkillMastery { value: 2, min_level: Some(MasteryLevel::Expert) }),
        badge("high_achiever", "High Achiever", "Score 80% or more on an assessment", "📊", C::Achievement, R::Rare, 600, Q::AssessmentScore { value: 80 }),
        badge("perfect_score", "Perfect Score", "Score 100% on an assessment", "💯", C::Achievement, R::Epic, 1000, Q::AssessmentScore { value: 100 }),
        badge("point_collector", "Point Collector", "Earn 10,000 total points", "💰", C::Milestone, R::Rare, 0, Q::TotalPoints { value: 10_000 }),
        badge("point_magnate", "Point Magnate", "Earn 50,000 total points", "🏦", C::Milestone, R::Epic, 0, Q::TotalPoints { value: 50_000 }),
        badge("point_emperor", "Point Emperor", "Earn 100,000 total points", "🏯", C::Milestone, R::Legendary, 0, Q::TotalPoints { value: 100_000 }),
    ]
}

fn default_achievements() -> Vec<Achievement> {
    use crate::progress::MasteryLevel;

    vec![
        Achievement {
            id: "first_stage".into(),
            name: "First Steps".into(),
            description: "Complete your first learning stage".into(),
            icon: "🚀".into(),
            kind: AchievementKind::Milestone,
            points: 100,
            requirement: Requirement::CompleteStages { value: 1 },
        },
        Achievement {
            id: "week_streak".into(),
            name: "Consistent Learner".into(),
            description: "Maintain a 7-day learning streak".into(),
            icon: "🔥".into(),
            kind: AchievementKind::Consistency,
            points: 200,
            requirement: Requirement::StreakDays { value: 7 },
        },
        Achievement {
            id: "skill_master".into(),
            name: "Skill Builder".into(),
            description: "Reach intermediate level in 3 skills".into(),
            icon: "🎯".into(),
            kind: AchievementKind::Skill,
            points: 300,
            requirement: Requirement::SkillMastery {
                value: 3,
                min_level: Some(MasteryLevel::Intermediate),
            },
        },
        Achievement {
            id: "thousand_points".into(),
            name: "Point Streaker".into(),
            description: "Earn 1,000 points".into(),
            icon: "⭐".into(),
            kind: AchievementKind::Milestone,
            points: 150,
            requirement: Requirement::TotalPoints { value: 1_000 },
        },
    ]
}
