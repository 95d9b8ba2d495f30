//! Subcommand implementations.

pub mod card;
pub mod config;
pub mod deck;
pub mod learner;
pub mod problems;
pub mod stats;
pub mod study;
pub mod subject;

use mnemo_core::{Config, Database, StudyService};

/// Open the engine over the default database, honoring the on-disk config.
pub(crate) fn open_service() -> Result<StudyService, Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    Ok(StudyService::with_config(Database::open()?, &config))
}
