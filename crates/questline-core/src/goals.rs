//! Daily challenges, weekly quests and motivational messages.
//!
//! Everything here is a pure function of a date, a level or a snapshot, so
//! the same inputs always produce the same goals.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::progress::{ProgressSnapshot, WeeklyTally};

/// Level from which the hard daily challenge is offered.
pub const HARD_CHALLENGE_MIN_LEVEL: u32 = 3;
/// Level from which the community objective joins the weekly quest.
pub const COMMUNITY_OBJECTIVE_MIN_LEVEL: u32 = 4;
pub const WEEKLY_QUEST_REWARD: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeDifficulty {
    Easy,
    Medium,
    Hard,
}

impl ChallengeDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeDifficulty::Easy => "easy",
            ChallengeDifficulty::Medium => "medium",
            ChallengeDifficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    SkillPractice,
    Learning,
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyChallenge {
    pub id: String,
    pub title: &'static str,
    pub description: &'static str,
    pub kind: ChallengeKind,
    pub difficulty: ChallengeDifficulty,
    pub points: u32,
    pub time_estimate: &'static str,
    pub expires_at: DateTime<Utc>,
}

impl DailyChallenge {
    /// Whether the snapshot already records this challenge as completed.
    pub fn is_completed(&self, snapshot: &ProgressSnapshot) -> bool {
        snapshot.completed_challenge_ids.contains(&self.id)
    }
}

/// Challenges offered on `date` to a learner at `level`.
///
/// Ids embed the date, so completing today's challenge never completes
/// tomorrow's.
pub fn daily_challenges(date: NaiveDate, level: u32) -> Vec<DailyChallenge> {
    let expires_at = next_midnight(date);
    let make = |difficulty: ChallengeDifficulty,
                kind: ChallengeKind,
                title: &'static str,
                description: &'static str,
                points: u32,
                time_estimate: &'static str| DailyChallenge {
        id: format!("daily_{}_{}", difficulty.as_str(), date.format("%Y-%m-%d")),
        title,
        description,
        kind,
        difficulty,
        points,
        time_estimate,
        expires_at,
    };

    let mut challenges = vec![
        make(
            ChallengeDifficulty::Easy,
            ChallengeKind::SkillPractice,
            "Quick Skill Review",
            "Spend 15 minutes reviewing a skill you've learned recently",
            25,
            "15 minutes",
        ),
        make(
            ChallengeDifficulty::Medium,
            ChallengeKind::Learning,
            "Learning Session",
            "Complete a tutorial or watch an educational video in your domain",
            50,
            "30 minutes",
        ),
    ];
    if level >= HARD_CHALLENGE_MIN_LEVEL {
        challenges.push(make(
            ChallengeDifficulty::Hard,
            ChallengeKind::Project,
            "Project Challenge",
            "Work on a personal project or complete a coding challenge",
            100,
            "1 hour",
        ));
    }
    challenges
}

fn next_midnight(date: NaiveDate) -> DateTime<Utc> {
    let next = date.succ_opt().unwrap_or(NaiveDate::MAX);
    next.and_time(NaiveTime::MIN).and_utc()
}

/// What a quest objective measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveMetric {
    StagesCompleted,
    ActiveDays,
    DistinctSkills,
    /// Tracked outside this library; never progresses locally.
    Community,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestObjective {
    pub id: &'static str,
    pub description: &'static str,
    pub metric: ObjectiveMetric,
    pub target: u32,
    pub current: u32,
    pub points: u32,
}

impl QuestObjective {
    pub fn is_completed(&self) -> bool {
        self.current >= self.target
    }

    fn measure(&mut self, tally: &WeeklyTally) {
        let value = match self.metric {
            ObjectiveMetric::StagesCompleted => tally.stages_completed,
            ObjectiveMetric::ActiveDays => saturating_u32(tally.active_days.len()),
            ObjectiveMetric::DistinctSkills => saturating_u32(tally.skills_practiced.len()),
            ObjectiveMetric::Community => 0,
        };
        self.current = value.min(self.target);
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyQuest {
    pub id: String,
    pub title: &'static str,
    pub description: &'static str,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub objectives: Vec<QuestObjective>,
    pub reward_points: u32,
}

impl WeeklyQuest {
    /// Sum of objective points.
    pub fn total_points(&self) -> u32 {
        self.objectives.iter().map(|o| o.points).sum()
    }

    /// Share of completed objectives, 0..=100.
    pub fn progress_percent(&self) -> u8 {
        if self.objectives.is_empty() {
            return 0;
        }
        let done = self.objectives.iter().filter(|o| o.is_completed()).count();
        u8::try_from(done * 100 / self.objectives.len()).unwrap_or(100)
    }

    pub fn is_completed(&self) -> bool {
        self.objectives.iter().all(QuestObjective::is_completed)
    }

    /// Fill objective progress from the learner's tally for this week.
    pub fn measure(&mut self, snapshot: &ProgressSnapshot) {
        let week_start = self.starts_at.date_naive();
        let tally = snapshot.week.for_week(week_start);
        for objective in &mut self.objectives {
            objective.measure(&tally);
        }
    }
}

/// The quest for the ISO week containing `week_start`, before any progress.
pub fn weekly_quest(week_start: NaiveDate, level: u32) -> WeeklyQuest {
    let monday = WeeklyTally::week_start_of(week_start);
    let starts_at = monday.and_time(NaiveTime::MIN).and_utc();

    let mut objectives = vec![
        QuestObjective {
            id: "complete_stages",
            description: "Complete 3 roadmap stages",
            metric: ObjectiveMetric::StagesCompleted,
            target: 3,
            current: 0,
            points: 150,
        },
        QuestObjective {
            id: "daily_streak",
            description: "Stay active on 5 days this week",
            metric: ObjectiveMetric::ActiveDays,
            target: 5,
            current: 0,
            points: 100,
        },
        QuestObjective {
            id: "skill_practice",
            description: "Practice 2 different skills",
            metric: ObjectiveMetric::DistinctSkills,
            target: 2,
            current: 0,
            points: 75,
        },
    ];
    if level >= COMMUNITY_OBJECTIVE_MIN_LEVEL {
        objectives.push(QuestObjective {
            id: "mentor_interaction",
            description: "Engage with community or mentorship",
            metric: ObjectiveMetric::Community,
            target: 1,
            current: 0,
            points: 125,
        });
    }

    WeeklyQuest {
        id: format!("weekly_{}", monday.format("%Y-%m-%d")),
        title: "Weekly Learning Quest",
        description: "Complete your weekly learning objectives to earn bonus rewards",
        starts_at,
        ends_at: starts_at + Duration::days(7),
        objectives,
        reward_points: WEEKLY_QUEST_REWARD,
    }
}

/// The quest for the week containing `today`, measured against `snapshot`.
pub fn current_quest(snapshot: &ProgressSnapshot, today: NaiveDate) -> WeeklyQuest {
    let mut quest = weekly_quest(today, snapshot.current_level().level);
    quest.measure(snapshot);
    quest
}

/// A short encouragement chosen from streak, level and weekly activity.
pub fn motivational_message(snapshot: &ProgressSnapshot) -> String {
    let streak = snapshot.streak.current_streak;
    let level = snapshot.current_level();

    if streak >= 7 {
        return format!("Amazing! You're on a {streak}-day streak! Keep it going!");
    }
    if level.level >= 5 {
        return format!(
            "Congratulations on reaching {}! You're in the top tier of learners.",
            level.name
        );
    }
    if let Some(days) = snapshot.streak.days_to_next_milestone() {
        if streak > 0 && days <= 2 {
            let plural = if days == 1 { "" } else { "s" };
            return format!("Only {days} more day{plural} to your next streak milestone!");
        }
    }
    if streak == 0 {
        return "Start a new learning streak today! Every expert was once a beginner.".to_string();
    }
    if snapshot.completed_stage_ids.is_empty() {
        return "Every journey begins with a single step. You've got this!".to_string();
    }
    format!(
        "{} points to {}. Keep building!",
        snapshot.points_to_next_level(),
        crate::rewards::level::next_level(snapshot.total_points)
            .map_or("the top", |next| next.name)
    )
}
