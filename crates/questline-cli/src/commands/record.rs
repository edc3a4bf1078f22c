//! Record learning actions.

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use questline_core::sync::BatchItemOutcome;
use questline_core::{ApplyOutcome, RawAction};
use serde_json::json;

use crate::common::{block_on, print_json, CliResult, Session};

#[derive(Subcommand)]
pub enum RecordAction {
    /// A roadmap stage was completed
    Stage {
        stage_id: String,
        /// Skill covered by the stage (repeatable)
        #[arg(long = "skill")]
        skills: Vec<String>,
        /// beginner, intermediate or advanced
        #[arg(long)]
        difficulty: Option<String>,
        #[command(flatten)]
        opts: RecordOptions,
    },
    /// A skill was practiced
    Practice {
        skill: String,
        /// Assessment score, 0-100
        #[arg(long)]
        score: Option<u8>,
        #[command(flatten)]
        opts: RecordOptions,
    },
    /// A learning resource was finished
    Resource {
        resource_id: String,
        #[command(flatten)]
        opts: RecordOptions,
    },
    /// A daily check-in
    Daily {
        #[command(flatten)]
        opts: RecordOptions,
    },
    /// A daily challenge was completed
    Challenge {
        challenge_id: String,
        #[command(flatten)]
        opts: RecordOptions,
    },
}

#[derive(Args)]
pub struct RecordOptions {
    /// Override the default points for this action
    #[arg(long)]
    points: Option<i64>,
    /// When the action happened (RFC 3339), defaults to now
    #[arg(long)]
    at: Option<DateTime<Utc>>,
    /// Client event id, for retransmitting the same action
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    json: bool,
}

pub fn run(action: RecordAction, user: Option<String>) -> CliResult {
    let session = Session::open()?;
    let user_id = session.user(user)?;

    let (kind, payload, opts) = match action {
        RecordAction::Stage {
            stage_id,
            skills,
            difficulty,
            opts,
        } => (
            "stage_completed",
            json!({ "stage_id": stage_id, "skills": skills, "difficulty": difficulty }),
            opts,
        ),
        RecordAction::Practice { skill, score, opts } => (
            "skill_practiced",
            json!({ "skill": skill, "assessment_score": score }),
            opts,
        ),
        RecordAction::Resource { resource_id, opts } => {
            ("resource_completed", json!({ "resource_id": resource_id }), opts)
        }
        RecordAction::Daily { opts } => ("daily_activity", json!({}), opts),
        RecordAction::Challenge { challenge_id, opts } => {
            ("challenge_completed", json!({ "challenge_id": challenge_id }), opts)
        }
    };

    let raw = RawAction {
        event_id: opts.id,
        user_id,
        kind: kind.to_string(),
        payload,
        points: opts.points,
        occurred_at: opts.at,
    };
    let outcome = session.record(raw)?;
    if opts.json {
        return print_json(&outcome);
    }
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &ApplyOutcome) {
    if !outcome.applied {
        println!("Already recorded; nothing changed.");
        return;
    }
    let snapshot = &outcome.snapshot;
    println!(
        "+{} points (total {}), streak {} day(s)",
        outcome.points_awarded, snapshot.total_points, snapshot.streak.current_streak
    );
    if let Some(level) = &outcome.level_up {
        println!("Level up! You are now level {} {}", level.level, level.name);
    }
    for reward in &outcome.newly_unlocked {
        println!("Unlocked {reward}");
    }
}

/// Record a practice session covering several skills as one batch.
pub fn run_session(
    skills: Vec<String>,
    sync: bool,
    user: Option<String>,
) -> CliResult {
    let session = Session::open()?;
    let user_id = session.user(user)?;
    if skills.is_empty() {
        return Err("a session needs at least one --skill".into());
    }

    let raws = skills
        .into_iter()
        .map(|skill| RawAction {
            user_id: user_id.clone(),
            kind: "skill_practiced".to_string(),
            payload: json!({ "skill": skill }),
            ..Default::default()
        })
        .collect();
    let batch = session.engine.record_batch(raws);
    for result in &batch.results {
        match result {
            Ok(recorded) if recorded.outcome.applied => {
                session.db.insert_event(&recorded.event, Some(&batch.batch_id))?;
                print_outcome(&recorded.outcome);
            }
            Ok(_) => {}
            Err(e) => eprintln!("rejected: {e}"),
        }
    }

    if sync {
        let report = block_on(session.engine.sync_batch(&user_id, &batch.batch_id))?;
        session.persist_sync_state(&user_id)?;
        for item in &report.items {
            let state = match &item.outcome {
                BatchItemOutcome::Acknowledged => "acknowledged".to_string(),
                BatchItemOutcome::Pending => "pending".to_string(),
                BatchItemOutcome::Failed(e) => format!("failed: {e}"),
            };
            println!("{} {state}", item.event_id);
        }
        println!(
            "{}/{} synced",
            report.succeeded(),
            report.items.len()
        );
    }
    Ok(())
}
