//! Badges, achievements and levels.

mod catalog;
mod engine;
pub mod level;
mod requirement;

pub use catalog::{
    Achievement, AchievementKind, Badge, BadgeCategory, Rarity, RewardCatalog, RewardId,
};
pub use engine::{evaluate, AchievementProgress, RewardEngine};
pub use level::{level_for, next_level, points_to_next_level, Level, LEVELS};
pub use requirement::Requirement;
