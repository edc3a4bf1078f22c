//! Consecutive-day learning streaks.
//!
//! A streak counts calendar days (UTC) with at least one activity. Repeated
//! activity on the same day never inflates it, a one-day gap extends it, and
//! any longer gap restarts it at 1.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::OutOfOrderEventError;

/// Day counts that earn a streak milestone.
pub const STREAK_MILESTONES: [u32; 4] = [7, 30, 100, 365];

/// Streak state for one learner.
///
/// Invariant: `longest_streak >= current_streak`. `current_streak` is 0 only
/// when no activity has ever been recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakTracker {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
}

impl StreakTracker {
    /// Milestones reached by the longest streak so far.
    pub fn milestones(&self) -> Vec<StreakMilestone> {
        STREAK_MILESTONES
            .iter()
            .map(|&days| StreakMilestone {
                days,
                unlocked: self.longest_streak >= days,
            })
            .collect()
    }

    /// Days still missing for the next milestone, if any remain.
    pub fn days_to_next_milestone(&self) -> Option<u32> {
        STREAK_MILESTONES
            .iter()
            .find(|&&days| days > self.current_streak)
            .map(|days| days - self.current_streak)
    }
}

/// A streak milestone and whether it has been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakMilestone {
    pub days: u32,
    pub unlocked: bool,
}

/// Compute the streak after an activity on `activity_date`.
///
/// # Errors
/// Returns [`OutOfOrderEventError`] when `activity_date` precedes the last
/// recorded activity. Callers must submit a user's events in order.
pub fn compute_streak(
    user_id: &str,
    previous: &StreakTracker,
    activity_date: NaiveDate,
) -> Result<StreakTracker, OutOfOrderEventError> {
    let current_streak = match previous.last_activity_date {
        None => 1,
        Some(last) => match (activity_date - last).num_days() {
            gap if gap < 0 => {
                return Err(OutOfOrderEventError::for_dates(user_id, activity_date, last))
            }
            0 => return Ok(*previous),
            1 => previous.current_streak + 1,
            _ => 1,
        },
    };

    Ok(StreakTracker {
        current_streak,
        longest_streak: previous.longest_streak.max(current_streak),
        last_activity_date: Some(activity_date),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Duration::days(n as i64)
    }

    #[test]
    fn test_first_activity_starts_at_one() {
        let next = compute_streak("u", &StreakTracker::default(), day(0)).unwrap();
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 1);
        assert_eq!(next.last_activity_date, Some(day(0)));
    }

    #[test]
    fn test_same_day_does_not_inflate() {
        let first = compute_streak("u", &StreakTracker::default(), day(0)).unwrap();
        let again = compute_streak("u", &first, day(0)).unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn test_consecutive_days_extend() {
        let mut streak = StreakTracker::default();
        for n in 0..5 {
            streak = compute_streak("u", &streak, day(n)).unwrap();
        }
        assert_eq!(streak.current_streak, 5);
        assert_eq!(streak.longest_streak, 5);
    }

    #[test]
    fn test_gap_resets_to_one_and_keeps_longest() {
        let mut streak = StreakTracker::default();
        for n in 0..3 {
            streak = compute_streak("u", &streak, day(n)).unwrap();
        }
        let after_gap = compute_streak("u", &streak, day(5)).unwrap();
        assert_eq!(after_gap.current_streak, 1);
        assert_eq!(after_gap.longest_streak, 3);
    }

    #[test]
    fn test_earlier_date_rejected() {
        let streak = compute_streak("u", &StreakTracker::default(), day(3)).unwrap();
        let err = compute_streak("u", &streak, day(2)).unwrap_err();
        assert_eq!(err.user_id, "u");
    }

    #[test]
    fn test_milestones() {
        let streak = StreakTracker {
            current_streak: 8,
            longest_streak: 31,
            last_activity_date: Some(day(40)),
        };
        let unlocked: Vec<u32> = streak
            .milestones()
            .into_iter()
            .filter(|m| m.unlocked)
            .map(|m| m.days)
            .collect();
        assert_eq!(unlocked, vec![7, 30]);
        assert_eq!(streak.days_to_next_milestone(), Some(22));
    }

    proptest! {
        #[test]
        fn prop_longest_non_decreasing_and_bounds_current(
            steps in proptest::collection::vec(0u32..4, 1..60)
        ) {
            let mut streak = StreakTracker::default();
            let mut offset = 0u32;
            for step in steps {
                offset += step;
                let next = compute_streak("u", &streak, day(offset)).unwrap();
                prop_assert!(next.longest_streak >= streak.longest_streak);
                prop_assert!(next.longest_streak >= next.current_streak);
                prop_assert!(next.current_streak >= 1);
                streak = next;
            }
        }
    }
}
