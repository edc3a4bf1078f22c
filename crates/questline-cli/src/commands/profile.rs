//! Learner profile commands.

use clap::Subcommand;
use questline_core::sync::ProfileOutcome;
use questline_core::RewardEngine;

use crate::common::{block_on, print_json, CliResult, Session};

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Create a local profile and make it the default user
    Init {
        user_id: String,
        /// Career domain, e.g. "data-science"
        #[arg(long)]
        domain: Option<String>,
        /// Also fetch or create the profile on the remote backend
        #[arg(long)]
        remote: bool,
    },
    /// Show points, level, streak and rewards
    Show {
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: ProfileAction, user: Option<String>) -> CliResult {
    let mut session = Session::open()?;
    match action {
        ProfileAction::Init {
            user_id,
            domain,
            remote,
        } => {
            let created = session.db.create_profile(&user_id, domain.as_deref())?;
            session.engine.get_or_create(&user_id, domain.as_deref());
            if session.config.profile.user_id.is_none() {
                session.config.profile.user_id = Some(user_id.clone());
                session.config.profile.domain = domain.clone();
                session.config.save()?;
            }
            if created {
                println!("Profile created: {user_id}");
            } else {
                println!("Profile exists: {user_id}");
            }

            if remote {
                let outcome = block_on(
                    session
                        .engine
                        .remote()
                        .get_or_create_profile(&user_id, domain.as_deref()),
                )??;
                let verb = match outcome {
                    ProfileOutcome::Existing(_) => "found",
                    ProfileOutcome::Created(_) => "created",
                };
                let profile = outcome.profile();
                let level = profile.level.map_or_else(|| "-".to_string(), |l| l.to_string());
                println!(
                    "Remote profile {verb}: {} points, level {level}",
                    profile.total_points
                );
            }
        }
        ProfileAction::Show { json } => {
            let user_id = session.user(user)?;
            let snapshot = session.engine.get_or_create(&user_id, None);
            if json {
                return print_json(&snapshot);
            }

            let level = snapshot.current_level();
            println!("User:     {}", snapshot.user_id);
            if let Some(domain) = &snapshot.domain {
                println!("Domain:   {domain}");
            }
            println!("Points:   {}", snapshot.total_points);
            println!(
                "Level:    {} {} ({} points to next)",
                level.level,
                level.name,
                snapshot.points_to_next_level()
            );
            println!(
                "Streak:   {} day(s), longest {}",
                snapshot.streak.current_streak, snapshot.streak.longest_streak
            );
            println!("Stages:   {}", snapshot.completed_stage_ids.len());
            println!("Badges:   {}", snapshot.unlocked_badge_ids.len());

            let engine = RewardEngine::new(session.engine.store().catalog().clone());
            println!("Achievements:");
            for progress in engine.achievement_progress(&snapshot) {
                let mark = if progress.unlocked { "x" } else { " " };
                println!(
                    "  [{mark}] {:<24} {}/{} ({}%)",
                    progress.name,
                    progress.current,
                    progress.target,
                    progress.percent()
                );
            }
        }
    }
    Ok(())
}
