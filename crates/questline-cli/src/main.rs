use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "questline-cli", version, about = "Questline learning progress CLI")]
struct Cli {
    /// Learner id; defaults to the profile in config.toml
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Learner profiles
    Profile {
        #[command(subcommand)]
        action: commands::profile::ProfileAction,
    },
    /// Record a learning action
    Record {
        #[command(subcommand)]
        action: commands::record::RecordAction,
    },
    /// Record a practice session covering several skills as one batch
    Session {
        #[arg(long = "skill", required = true)]
        skills: Vec<String>,
        /// Sync the batch right away
        #[arg(long)]
        sync: bool,
    },
    /// Per-event sync state
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Deliver pending events to the remote backend
    Sync {
        /// Sync every known learner
        #[arg(long)]
        all: bool,
        /// Drop acknowledged events from the queue afterwards
        #[arg(long)]
        prune: bool,
    },
    /// Retry a failed event
    Retry { event_id: String },
    /// Stop trying to deliver a failed event
    Discard { event_id: String },
    /// Badges and achievements
    Catalog {
        #[arg(long)]
        json: bool,
    },
    /// Today's daily challenges
    Challenges {
        /// Date as YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// This week's quest
    Quest {
        #[arg(long)]
        json: bool,
    },
    /// A motivational message and today's reminders
    Motivate,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let user = cli.user;
    let result = match cli.command {
        Commands::Profile { action } => commands::profile::run(action, user),
        Commands::Record { action } => commands::record::run(action, user),
        Commands::Session { skills, sync } => commands::record::run_session(skills, sync, user),
        Commands::Status { json } => commands::sync::status(user, json),
        Commands::Sync { all, prune } => commands::sync::sync(user, all, prune),
        Commands::Retry { event_id } => commands::sync::retry(user, &event_id),
        Commands::Discard { event_id } => commands::sync::discard(user, &event_id),
        Commands::Catalog { json } => commands::goals::catalog(user, json),
        Commands::Challenges { date, json } => commands::goals::challenges(user, date, json),
        Commands::Quest { json } => commands::goals::quest(user, json),
        Commands::Motivate => commands::goals::motivate(user),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
