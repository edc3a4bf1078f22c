//! Reward rules evaluation.
//!
//! [`evaluate`] is a pure function: every catalog entry is tested against the
//! same snapshot, so the result never depends on catalog order.

use std::collections::BTreeSet;

use serde::Serialize;

use super::{RewardCatalog, RewardId};
use crate::progress::ProgressSnapshot;

/// Rewards whose requirement holds for `snapshot` and that are not yet unlocked.
pub fn evaluate(snapshot: &ProgressSnapshot, catalog: &RewardCatalog) -> BTreeSet<RewardId> {
    catalog
        .entries()
        .filter(|(id, _)| !snapshot.is_unlocked(id))
        .filter(|(_, requirement)| requirement.is_met(snapshot))
        .map(|(id, _)| id)
        .collect()
}

/// Progress of one achievement towards its requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementProgress {
    pub id: String,
    pub name: String,
    pub current: u64,
    pub target: u64,
    pub unlocked: bool,
}

impl AchievementProgress {
    pub fn percent(&self) -> u8 {
        if self.target == 0 {
            return 100;
        }
        ((self.current * 100) / self.target).min(100) as u8
    }
}

/// Evaluator bound to a catalog.
#[derive(Debug, Clone, Default)]
pub struct RewardEngine {
    catalog: RewardCatalog,
}

impl RewardEngine {
    pub fn new(catalog: RewardCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &RewardCatalog {
        &self.catalog
    }

    pub fn evaluate(&self, snapshot: &ProgressSnapshot) -> BTreeSet<RewardId> {
        evaluate(snapshot, &self.catalog)
    }

    pub fn achievement_progress(&self, snapshot: &ProgressSnapshot) -> Vec<AchievementProgress> {
        self.catalog
            .achievements()
            .iter()
            .map(|a| {
                let (current, target) = a.requirement.progress(snapshot);
                AchievementProgress {
                    id: a.id.clone(),
                    name: a.name.clone(),
                    current,
                    target,
                    unlocked: snapshot.is_unlocked(&RewardId::Achievement(a.id.clone())),
                }
            })
            .collect()
    }
}
