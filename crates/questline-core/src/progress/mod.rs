//! Per-user progress state.

mod snapshot;
mod store;

pub use snapshot::{
    MasteryLevel, ProgressSnapshot, SkillMastery, UnlockRecord, WeeklyTally,
    PRACTICE_SKILL_GAIN, STAGE_SKILL_GAIN,
};
pub use store::{ApplyOutcome, ProgressStore};
