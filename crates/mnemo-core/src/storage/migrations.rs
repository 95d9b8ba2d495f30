//! Database schema migrations for mnemo.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current migration
//! version.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current
/// schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or(0)
}

/// Set the schema version in an open transaction.
fn set_schema_version(tx: &rusqlite::Transaction, version: i32) -> SqliteResult<()> {
    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: core schema.
///
/// Catalog (subjects, cards, decks, learners), per-learner scheduling
/// state, the append-only rating log, and per-day session counters.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS subjects (
            id         TEXT PRIMARY KEY,
            title      TEXT NOT NULL,
            parent_id  TEXT,
            path       TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS cards (
            id                 TEXT PRIMARY KEY,
            subject_id         TEXT NOT NULL,
            front              TEXT NOT NULL,
            back               TEXT NOT NULL,
            position           INTEGER NOT NULL DEFAULT 0,
            visible            INTEGER NOT NULL DEFAULT 1,
            flagged_for_review INTEGER NOT NULL DEFAULT 0,
            author             TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS decks (
            id         TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            subject_id TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS deck_membership (
            deck_id TEXT NOT NULL,
            card_id TEXT NOT NULL,
            PRIMARY KEY (deck_id, card_id)
        );

        CREATE TABLE IF NOT EXISTS learners (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            tier          TEXT NOT NULL,
            tz_offset_min INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS card_progress (
            learner_id       TEXT NOT NULL,
            card_id          TEXT NOT NULL,
            state            TEXT NOT NULL,
            interval_min     INTEGER NOT NULL DEFAULT 0,
            ease             REAL NOT NULL,
            due_at           TEXT NOT NULL,
            repetitions      INTEGER NOT NULL DEFAULT 0,
            lapses           INTEGER NOT NULL DEFAULT 0,
            learning_step    INTEGER NOT NULL DEFAULT 0,
            last_reviewed_at TEXT,
            version          INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (learner_id, card_id)
        );

        CREATE TABLE IF NOT EXISTS rating_events (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            learner_id   TEXT NOT NULL,
            card_id      TEXT NOT NULL,
            rating       TEXT NOT NULL,
            state_before TEXT NOT NULL,
            state_after  TEXT NOT NULL,
            ease_before  REAL NOT NULL,
            ease_after   REAL NOT NULL,
            occurred_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_days (
            learner_id        TEXT NOT NULL,
            day               TEXT NOT NULL,
            new_introduced    INTEGER NOT NULL DEFAULT 0,
            reviews_completed INTEGER NOT NULL DEFAULT 0,
            session_token     TEXT,
            selector_json     TEXT,
            PRIMARY KEY (learner_id, day)
        );

        CREATE INDEX IF NOT EXISTS idx_cards_subject ON cards(subject_id);
        CREATE INDEX IF NOT EXISTS idx_subjects_path ON subjects(path);
        CREATE INDEX IF NOT EXISTS idx_progress_due ON card_progress(learner_id, due_at);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: rating-log indexes for the analytics window queries.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_events_occurred ON rating_events(occurred_at);
         CREATE INDEX IF NOT EXISTS idx_events_card ON rating_events(card_id, occurred_at);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);
    }

    #[test]
    fn all_tables_exist_after_migrate() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        for table in [
            "subjects",
            "cards",
            "decks",
            "deck_membership",
            "learners",
            "card_progress",
            "rating_events",
            "session_days",
        ] {
            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
