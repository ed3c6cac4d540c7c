mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, MeditationConfig, ProgressionConfig, StreakConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Returns the questlog data directory.
///
/// `QUESTLOG_DATA_DIR` wins when set. Otherwise `~/.config/questlog[-dev]/`,
/// with the `-dev` suffix selected by `QUESTLOG_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("QUESTLOG_DATA_DIR") {
        Some(explicit) if !explicit.is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .ok_or_else(|| ConfigError::DataDir("home directory not found".into()))?
                .join(".config");

            let env = std::env::var("QUESTLOG_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("questlog-dev")
            } else {
                base_dir.join("questlog")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
