use clap::Subcommand;
use questline_core::Config;

use crate::common::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the whole configuration as TOML
    Show,
    /// Get a config value
    Get {
        /// Dot-separated key (e.g. "remote.base_url", "retry.max_attempts")
        key: String,
    },
    /// Set a config value
    Set {
        key: String,
        value: String,
    },
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("ok");
        }
        ConfigAction::Init { force } => {
            let path = Config::path()?;
            if path.exists() && !force {
                return Err(format!("{} already exists; pass --force to reset", path.display()).into());
            }
            Config::default().save()?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}
