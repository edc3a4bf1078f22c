mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, EventsConfig, ProfileConfig, RemoteConfig, RetryConfig};
pub use database::{JournalRow, ProfileRow, ProgressDb};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `QUESTLINE_DATA_DIR` overrides the location. Otherwise the directory is
/// `~/.config/questline[-dev]/`, with the `-dev` suffix when
/// `QUESTLINE_ENV=dev`.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("QUESTLINE_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .ok_or_else(|| ConfigError::DataDir("home directory not found".into()))?
                .join(".config");
            let env = std::env::var("QUESTLINE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("questline-dev")
            } else {
                base_dir.join("questline")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
