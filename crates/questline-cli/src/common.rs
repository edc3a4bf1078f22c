//! Shared CLI state: configuration, journal and a restored engine.

use std::future::Future;
use std::sync::Arc;

use questline_core::storage::data_dir;
use questline_core::{
    ApplyOutcome, Config, EventValidator, HttpRemoteClient, ProgressDb, ProgressEngine,
    ProgressStore, RawAction, RewardCatalog, SyncCoordinator, SystemClock,
};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Optional catalog override in the data directory.
const CATALOG_FILE: &str = "catalog.toml";

pub struct Session {
    pub config: Config,
    pub db: ProgressDb,
    pub engine: ProgressEngine<HttpRemoteClient>,
}

impl Session {
    /// Load config, open the journal and replay it into a fresh engine.
    pub fn open() -> CliResult<Self> {
        let config = Config::load()?;
        let db = ProgressDb::open()?;

        let remote = HttpRemoteClient::new(&config.remote.base_url, config.remote.timeout())?;
        let mut coordinator =
            SyncCoordinator::new(Arc::new(remote), config.retry.backoff_policy());
        if let Some(seed) = config.retry.seed {
            coordinator = coordinator.with_seed(seed);
        }
        let validator = EventValidator::with_clock(
            Arc::new(SystemClock),
            chrono::Duration::seconds(config.events.clock_skew_secs),
        );
        let catalog = RewardCatalog::load_or_default(&data_dir()?.join(CATALOG_FILE))?;
        let engine = ProgressEngine::new(validator, ProgressStore::new(catalog), coordinator);

        for profile in db.profiles()? {
            engine.get_or_create(&profile.user_id, profile.domain.as_deref());
        }
        let restored = engine.restore(db.load_events(None)?)?;
        tracing::debug!(
            applied = restored.applied,
            requeued = restored.requeued,
            "session opened"
        );

        Ok(Self { config, db, engine })
    }

    /// The explicit user, else the configured default profile.
    pub fn user(&self, explicit: Option<String>) -> CliResult<String> {
        explicit
            .or_else(|| self.config.profile.user_id.clone())
            .ok_or_else(|| "no user given; pass --user or run `profile init <user>`".into())
    }

    /// Apply one action and journal it when it changed state.
    pub fn record(&self, raw: RawAction) -> CliResult<ApplyOutcome> {
        let recorded = self.engine.record(raw)?;
        if recorded.outcome.applied {
            self.db.insert_event(&recorded.event, None)?;
        }
        Ok(recorded.outcome)
    }

    /// Write the queue's delivery state for `user_id` back to the journal.
    pub fn persist_sync_state(&self, user_id: &str) -> CliResult {
        for status in self.engine.sync_status(user_id) {
            self.db.record_sync_status(&status)?;
        }
        Ok(())
    }
}

/// Run a future to completion on a single-threaded runtime.
pub fn block_on<F: Future>(future: F) -> CliResult<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
