//! Rewards catalog, challenges, quests and motivation.

use chrono::{NaiveDate, Utc};
use questline_core::goals::current_quest;
use questline_core::rewards::RewardId;
use questline_core::{daily_challenges, motivational_message, ContentSource, EngagementService};

use crate::common::{block_on, print_json, CliResult, Session};

pub fn catalog(user: Option<String>, json: bool) -> CliResult {
    let session = Session::open()?;
    let catalog = session.engine.store().catalog();
    if json {
        return print_json(catalog);
    }

    let snapshot = session
        .user(user)
        .ok()
        .and_then(|user_id| session.engine.snapshot(&user_id));
    let mark = |reward: RewardId| match &snapshot {
        Some(s) if s.is_unlocked(&reward) => "x",
        _ => " ",
    };

    println!("Badges:");
    for badge in catalog.badges() {
        println!(
            "  [{}] {} {:<22} {:?}/{:?}  {}",
            mark(RewardId::Badge(badge.id.clone())),
            badge.icon,
            badge.name,
            badge.category,
            badge.rarity,
            badge.description
        );
    }
    println!("Achievements:");
    for achievement in catalog.achievements() {
        println!(
            "  [{}] {} {:<22} {}",
            mark(RewardId::Achievement(achievement.id.clone())),
            achievement.icon,
            achievement.name,
            achievement.description
        );
    }
    Ok(())
}

pub fn challenges(user: Option<String>, date: Option<NaiveDate>, json: bool) -> CliResult {
    let session = Session::open()?;
    let user_id = session.user(user)?;
    let snapshot = session.engine.get_or_create(&user_id, None);
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let challenges = daily_challenges(date, snapshot.current_level().level);
    if json {
        return print_json(&challenges);
    }

    for challenge in &challenges {
        let mark = if challenge.is_completed(&snapshot) { "x" } else { " " };
        println!(
            "[{mark}] {:<20} {:>3} pts  {}  ({})",
            challenge.title, challenge.points, challenge.description, challenge.time_estimate
        );
        println!("    id: {}", challenge.id);
    }
    Ok(())
}

pub fn quest(user: Option<String>, json: bool) -> CliResult {
    let session = Session::open()?;
    let user_id = session.user(user)?;
    let snapshot = session.engine.get_or_create(&user_id, None);
    let quest = current_quest(&snapshot, Utc::now().date_naive());
    if json {
        return print_json(&quest);
    }

    println!("{} ({}% complete)", quest.title, quest.progress_percent());
    for objective in &quest.objectives {
        let mark = if objective.is_completed() { "x" } else { " " };
        println!(
            "  [{mark}] {:<40} {}/{}  {} pts",
            objective.description, objective.current, objective.target, objective.points
        );
    }
    println!("Reward: {} pts", quest.reward_points);
    Ok(())
}

pub fn motivate(user: Option<String>) -> CliResult {
    let session = Session::open()?;
    let user_id = session.user(user)?;
    let snapshot = session.engine.get_or_create(&user_id, None);
    println!("{}", motivational_message(&snapshot));

    let engagement = block_on(EngagementService::default().daily_engagement(&snapshot))?;
    let motivation = &engagement.content.daily_motivation;
    println!();
    println!("\"{}\"", motivation.quote);
    println!("Tip: {}", motivation.tip);
    println!("Today: {}", motivation.challenge);
    for reminder in &engagement.content.reminders {
        println!(
            "Reminder {}: {} - {}",
            reminder.scheduled_time.format("%H:%M"),
            reminder.title,
            reminder.message
        );
    }
    if engagement.source == ContentSource::Fallback {
        tracing::debug!("showing built-in engagement content");
    }
    Ok(())
}
