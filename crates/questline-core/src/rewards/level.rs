//! Level table. A learner's level is a pure function of lifetime points.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Level {
    pub level: u32,
    pub name: &'static str,
    pub min_points: u64,
}

pub const LEVELS: [Level; 10] = [
    Level { level: 1, name: "Career Explorer", min_points: 0 },
    Level { level: 2, name: "Skill Seeker", min_points: 500 },
    Level { level: 3, name: "Knowledge Builder", min_points: 1_500 },
    Level { level: 4, name: "Competency Climber", min_points: 3_500 },
    Level { level: 5, name: "Professional Pathfinder", min_points: 7_500 },
    Level { level: 6, name: "Expertise Architect", min_points: 15_000 },
    Level { level: 7, name: "Industry Innovator", min_points: 30_000 },
    Level { level: 8, name: "Career Champion", min_points: 60_000 },
    Level { level: 9, name: "Master Strategist", min_points: 100_000 },
    Level { level: 10, name: "Visionary Leader", min_points: 200_000 },
];

/// Highest level whose threshold `total_points` has reached.
pub fn level_for(total_points: u64) -> Level {
    LEVELS
        .iter()
        .rev()
        .find(|l| total_points >= l.min_points)
        .copied()
        .unwrap_or(LEVELS[0])
}

/// The level after the current one, or `None` at the top.
pub fn next_level(total_points: u64) -> Option<Level> {
    LEVELS.iter().find(|l| l.min_points > total_points).copied()
}

/// Points still needed for the next level; 0 at the top.
pub fn points_to_next_level(total_points: u64) -> u64 {
    next_level(total_points).map_or(0, |l| l.min_points - total_points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level_for(0).level, 1);
        assert_eq!(level_for(499).level, 1);
        assert_eq!(level_for(500).level, 2);
        assert_eq!(level_for(1_500).name, "Knowledge Builder");
        assert_eq!(level_for(10_000_000).level, 10);
    }

    #[test]
    fn test_points_to_next_level() {
        assert_eq!(points_to_next_level(0), 500);
        assert_eq!(points_to_next_level(600), 900);
        assert_eq!(points_to_next_level(250_000), 0);
        assert!(next_level(200_000).is_none());
    }

    #[test]
    fn test_thresholds_strictly_increase() {
        for pair in LEVELS.windows(2) {
            assert!(pair[0].min_points < pair[1].min_points);
            assert_eq!(pair[0].level + 1, pair[1].level);
        }
    }
}
