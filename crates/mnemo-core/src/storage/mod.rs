mod config;
pub mod database;
pub mod migrations;
pub mod progress_db;

pub use config::Config;
pub use database::{Database, StudyStats};

use std::io;
use std::path::PathBuf;

/// Returns `~/.config/mnemo[-dev]/` based on MNEMO_ENV.
///
/// Set MNEMO_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("MNEMO_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("mnemo-dev")
    } else {
        base_dir.join("mnemo")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
