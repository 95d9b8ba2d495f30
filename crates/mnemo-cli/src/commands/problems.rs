//! Difficulty report commands.

use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;

use super::open_service;

#[derive(Subcommand)]
pub enum ProblemsAction {
    /// Rank cards from hardest to easiest over a window of rating events
    Report {
        /// Window start date, YYYY-MM-DD inclusive (omit for all history)
        #[arg(long)]
        since: Option<String>,
        /// Window end date, YYYY-MM-DD exclusive (omit for up to now)
        #[arg(long)]
        until: Option<String>,
        /// Keep only the hardest N cards
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn parse_day(value: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid date: {value}"))?;
    Ok(midnight.and_utc())
}

pub fn run(action: ProblemsAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service()?;

    match action {
        ProblemsAction::Report {
            since,
            until,
            limit,
        } => {
            let since = since.as_deref().map(parse_day).transpose()?;
            let until = until.as_deref().map(parse_day).transpose()?;
            let mut scores = service.problem_scores(since, until)?;
            if let Some(limit) = limit {
                scores.truncate(limit);
            }
            println!("{}", serde_json::to_string_pretty(&scores)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_parses_to_utc_midnight() {
        let parsed = parse_day("2026-03-01").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T00:00:00+00:00");
    }

    #[test]
    fn garbage_dates_are_rejected() {
        assert!(parse_day("not-a-date").is_err());
        assert!(parse_day("2026-13-40").is_err());
    }
}
