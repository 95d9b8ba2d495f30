//! Statistics commands.

use chrono::Utc;
use clap::Subcommand;

use super::open_service;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Corpus-wide totals
    All,
    /// One learner's counters for their current local day
    Today {
        /// Learner ID
        learner: String,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service()?;

    match action {
        StatsAction::All => {
            let stats = service.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::Today { learner } => {
            let account = service
                .db()
                .get_learner(&learner)?
                .ok_or(format!("Learner not found: {learner}"))?;
            let day = account.local_day(Utc::now());
            match service.db().session_day(&learner, day)? {
                Some(counters) => println!("{}", serde_json::to_string_pretty(&counters)?),
                None => println!("No study activity for {learner} on {day}"),
            }
        }
    }

    Ok(())
}
