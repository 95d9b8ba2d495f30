//! SQLite-based storage for scheduling state, the rating log, and daily
//! session counters.
//!
//! `apply_rating` is the serialization point the whole engine leans on:
//! progress row, log append, and quota counters move together in one
//! transaction, guarded by a version check on the progress row so racing
//! submissions (duplicate network retries included) cannot double-count.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

use super::database::{format_datetime, parse_datetime_fallback, Database};
use crate::catalog::DeckSelector;
use crate::events::RatingEvent;
use crate::session::quota::DailyCounters;
use crate::srs::{CardProgress, CardState, Rating};

// === Helper Functions ===

/// Parse card state from database string.
fn parse_card_state(state_str: &str) -> CardState {
    match state_str {
        "learning" => CardState::Learning,
        "review" => CardState::Review,
        _ => CardState::New,
    }
}

/// Parse rating from database string. Unknown values read back as `again`
/// so corrupted rows surface in curation rather than vanish.
fn parse_rating(rating_str: &str) -> Rating {
    match rating_str {
        "hard" => Rating::Hard,
        "good" => Rating::Good,
        "easy" => Rating::Easy,
        "again" => Rating::Again,
        _ => Rating::Again,
    }
}

fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn parse_day_fallback(day_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(day_str, "%Y-%m-%d").unwrap_or_else(|_| Utc::now().date_naive())
}

/// Build a CardProgress from a row in column order (learner_id, card_id,
/// state, interval_min, ease, due_at, repetitions, lapses, learning_step,
/// last_reviewed_at, version).
fn row_to_progress(row: &rusqlite::Row) -> Result<CardProgress, rusqlite::Error> {
    let state: String = row.get(2)?;
    let due_at: String = row.get(5)?;
    let last_reviewed_at: Option<String> = row.get(9)?;
    Ok(CardProgress {
        learner_id: row.get(0)?,
        card_id: row.get(1)?,
        state: parse_card_state(&state),
        interval_min: row.get(3)?,
        ease: row.get(4)?,
        due_at: parse_datetime_fallback(&due_at),
        repetitions: row.get(6)?,
        lapses: row.get(7)?,
        learning_step: row.get(8)?,
        last_reviewed_at: last_reviewed_at.as_deref().map(parse_datetime_fallback),
        version: row.get(10)?,
    })
}

fn row_to_event(row: &rusqlite::Row) -> Result<RatingEvent, rusqlite::Error> {
    let rating: String = row.get(3)?;
    let state_before: String = row.get(4)?;
    let state_after: String = row.get(5)?;
    let occurred_at: String = row.get(8)?;
    Ok(RatingEvent {
        id: row.get(0)?,
        learner_id: row.get(1)?,
        card_id: row.get(2)?,
        rating: parse_rating(&rating),
        state_before: parse_card_state(&state_before),
        state_after: parse_card_state(&state_after),
        ease_before: row.get(6)?,
        ease_after: row.get(7)?,
        occurred_at: parse_datetime_fallback(&occurred_at),
    })
}

const PROGRESS_COLUMNS: &str = "learner_id, card_id, state, interval_min, ease, due_at, \
     repetitions, lapses, learning_step, last_reviewed_at, version";

const EVENT_COLUMNS: &str = "id, learner_id, card_id, rating, state_before, state_after, \
     ease_before, ease_after, occurred_at";

impl Database {
    // === Card progress ===

    pub fn get_progress(
        &self,
        learner_id: &str,
        card_id: &str,
    ) -> Result<Option<CardProgress>, rusqlite::Error> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {PROGRESS_COLUMNS} FROM card_progress
                     WHERE learner_id = ?1 AND card_id = ?2"
                ),
                params![learner_id, card_id],
                row_to_progress,
            )
            .optional()
    }

    pub fn progress_for_learner(
        &self,
        learner_id: &str,
    ) -> Result<Vec<CardProgress>, rusqlite::Error> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM card_progress WHERE learner_id = ?1"
        ))?;
        let rows = stmt.query_map(params![learner_id], row_to_progress)?;
        rows.collect()
    }

    /// Unconditional write, for imports and tests. Ratings go through
    /// [`Database::apply_rating`] instead.
    pub fn upsert_progress(&self, progress: &CardProgress) -> Result<(), rusqlite::Error> {
        self.conn().execute(
            &format!(
                "INSERT OR REPLACE INTO card_progress ({PROGRESS_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                progress.learner_id,
                progress.card_id,
                progress.state.as_str(),
                progress.interval_min,
                progress.ease,
                format_datetime(progress.due_at),
                progress.repetitions,
                progress.lapses,
                progress.learning_step,
                progress.last_reviewed_at.map(format_datetime),
                progress.version,
            ],
        )?;
        Ok(())
    }

    /// Commit one rating atomically: progress row (version-checked), log
    /// append, and daily counters.
    ///
    /// `expected_version` is `None` for the pair's first-ever rating. Returns
    /// `Ok(false)` without writing anything when the version check loses a
    /// race; the caller decides whether to reload and retry.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_rating(
        &self,
        after: &CardProgress,
        expected_version: Option<i64>,
        event: &RatingEvent,
        day: NaiveDate,
        introduced_new: bool,
        completed_review: bool,
        session_token: &str,
    ) -> Result<bool, rusqlite::Error> {
        let tx = self.conn().unchecked_transaction()?;

        let new_version = expected_version.map_or(0, |v| v + 1);
        let written = match expected_version {
            None => tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO card_progress ({PROGRESS_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    after.learner_id,
                    after.card_id,
                    after.state.as_str(),
                    after.interval_min,
                    after.ease,
                    format_datetime(after.due_at),
                    after.repetitions,
                    after.lapses,
                    after.learning_step,
                    after.last_reviewed_at.map(format_datetime),
                    new_version,
                ],
            )?,
            Some(expected) => tx.execute(
                "UPDATE card_progress SET
                     state = ?1, interval_min = ?2, ease = ?3, due_at = ?4,
                     repetitions = ?5, lapses = ?6, learning_step = ?7,
                     last_reviewed_at = ?8, version = ?9
                 WHERE learner_id = ?10 AND card_id = ?11 AND version = ?12",
                params![
                    after.state.as_str(),
                    after.interval_min,
                    after.ease,
                    format_datetime(after.due_at),
                    after.repetitions,
                    after.lapses,
                    after.learning_step,
                    after.last_reviewed_at.map(format_datetime),
                    new_version,
                    after.learner_id,
                    after.card_id,
                    expected,
                ],
            )?,
        };
        if written == 0 {
            // Lost the race; dropping the transaction rolls it back.
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO rating_events (learner_id, card_id, rating, state_before, state_after, ease_before, ease_after, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.learner_id,
                event.card_id,
                event.rating.as_str(),
                event.state_before.as_str(),
                event.state_after.as_str(),
                event.ease_before,
                event.ease_after,
                format_datetime(event.occurred_at),
            ],
        )?;

        tx.execute(
            "INSERT INTO session_days (learner_id, day, new_introduced, reviews_completed, session_token)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(learner_id, day) DO UPDATE SET
                 new_introduced = new_introduced + excluded.new_introduced,
                 reviews_completed = reviews_completed + excluded.reviews_completed,
                 session_token = COALESCE(session_days.session_token, excluded.session_token)",
            params![
                after.learner_id,
                format_day(day),
                introduced_new as i64,
                completed_review as i64,
                session_token,
            ],
        )?;

        tx.commit()?;
        Ok(true)
    }

    // === Rating log ===

    /// Events in the half-open window; `None` bounds are unbounded.
    pub fn rating_events_between(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<RatingEvent>, rusqlite::Error> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM rating_events
             WHERE (?1 IS NULL OR occurred_at >= ?1)
               AND (?2 IS NULL OR occurred_at < ?2)
             ORDER BY occurred_at, id"
        ))?;
        let rows = stmt.query_map(
            params![since.map(format_datetime), until.map(format_datetime)],
            row_to_event,
        )?;
        rows.collect()
    }

    // === Session days ===

    pub fn session_day(
        &self,
        learner_id: &str,
        day: NaiveDate,
    ) -> Result<Option<DailyCounters>, rusqlite::Error> {
        self.conn()
            .query_row(
                "SELECT learner_id, day, new_introduced, reviews_completed, session_token, selector_json
                 FROM session_days WHERE learner_id = ?1 AND day = ?2",
                params![learner_id, format_day(day)],
                |row| {
                    let day_str: String = row.get(1)?;
                    let selector_json: Option<String> = row.get(5)?;
                    Ok(DailyCounters {
                        learner_id: row.get(0)?,
                        day: parse_day_fallback(&day_str),
                        new_introduced: row.get(2)?,
                        reviews_completed: row.get(3)?,
                        session_token: row.get(4)?,
                        selector: selector_json
                            .as_deref()
                            .and_then(|s| serde_json::from_str(s).ok()),
                    })
                },
            )
            .optional()
    }

    /// Make sure the day row exists, carries a session token, and records
    /// the scope the session was opened over. An already-assigned token is
    /// never replaced; the selector tracks the most recent open.
    pub fn ensure_session_day(
        &self,
        learner_id: &str,
        day: NaiveDate,
        session_token: &str,
        selector: &DeckSelector,
    ) -> Result<(), rusqlite::Error> {
        let selector_json = serde_json::to_string(selector)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.conn().execute(
            "INSERT INTO session_days (learner_id, day, new_introduced, reviews_completed, session_token, selector_json)
             VALUES (?1, ?2, 0, 0, ?3, ?4)
             ON CONFLICT(learner_id, day) DO UPDATE SET
                 session_token = COALESCE(session_days.session_token, excluded.session_token),
                 selector_json = excluded.selector_json",
            params![learner_id, format_day(day), session_token, selector_json],
        )?;
        Ok(())
    }
}
