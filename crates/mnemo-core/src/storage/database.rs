//! SQLite-based catalog storage.
//!
//! Holds the content catalog:
//! - Subjects (materialized-path tree)
//! - Card templates
//! - Decks and their derived membership
//! - Learner accounts
//!
//! Scheduling state and the rating log live in the same database; their
//! queries are in `progress_db`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{data_dir, migrations};
use crate::catalog::{CardTemplate, Deck, Subject};
use crate::error::DatabaseError;
use crate::session::{Learner, ScopedCard, StudyTier};

// === Helper Functions ===

/// Parse datetime from RFC3339 string with fallback to current time.
pub(super) fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Format a datetime for database storage.
pub(super) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse study tier from database string.
fn parse_tier(tier_str: &str) -> StudyTier {
    match tier_str {
        "plus" => StudyTier::Plus,
        "unlimited" => StudyTier::Unlimited,
        _ => StudyTier::Basic,
    }
}

/// Build a Subject from a database row (id, title, parent_id, path).
fn row_to_subject(row: &rusqlite::Row) -> Result<Subject, rusqlite::Error> {
    Ok(Subject {
        id: row.get(0)?,
        title: row.get(1)?,
        parent_id: row.get(2)?,
        path: row.get(3)?,
    })
}

/// Build a CardTemplate from a database row in column order
/// (id, subject_id, front, back, position, visible, flagged_for_review,
/// author, created_at, updated_at).
fn row_to_card(row: &rusqlite::Row) -> Result<CardTemplate, rusqlite::Error> {
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(CardTemplate {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        front: row.get(2)?,
        back: row.get(3)?,
        position: row.get(4)?,
        visible: row.get(5)?,
        flagged_for_review: row.get(6)?,
        author: row.get(7)?,
        created_at: parse_datetime_fallback(&created_at),
        updated_at: parse_datetime_fallback(&updated_at),
    })
}

fn row_to_deck(row: &rusqlite::Row) -> Result<Deck, rusqlite::Error> {
    let created_at: String = row.get(3)?;
    Ok(Deck {
        id: row.get(0)?,
        name: row.get(1)?,
        subject_id: row.get(2)?,
        created_at: parse_datetime_fallback(&created_at),
    })
}

fn row_to_learner(row: &rusqlite::Row) -> Result<Learner, rusqlite::Error> {
    let tier: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    Ok(Learner {
        id: row.get(0)?,
        name: row.get(1)?,
        tier: parse_tier(&tier),
        tz_offset_min: row.get(3)?,
        created_at: parse_datetime_fallback(&created_at),
    })
}

const CARD_COLUMNS: &str =
    "id, subject_id, front, back, position, visible, flagged_for_review, author, created_at, updated_at";

/// Card columns qualified for joins against `subjects`.
const CARD_COLUMNS_QUALIFIED: &str =
    "cards.id, cards.subject_id, cards.front, cards.back, cards.position, cards.visible, \
     cards.flagged_for_review, cards.author, cards.created_at, cards.updated_at";

/// Catalog totals for status displays.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StudyStats {
    pub total_subjects: u64,
    pub total_cards: u64,
    pub total_decks: u64,
    pub total_learners: u64,
    pub total_ratings: u64,
    pub ratings_today: u64,
}

/// SQLite database holding the catalog, scheduling state, and rating log.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/mnemo/mnemo.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let path = data_dir()?.join("mnemo.db");
        Self::open_at(&path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: PathBuf::from(path),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (tests and tooling).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    // === Subjects ===

    pub fn insert_subject(&self, subject: &Subject) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO subjects (id, title, parent_id, path) VALUES (?1, ?2, ?3, ?4)",
            params![subject.id, subject.title, subject.parent_id, subject.path],
        )?;
        Ok(())
    }

    pub fn get_subject(&self, id: &str) -> Result<Option<Subject>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, title, parent_id, path FROM subjects WHERE id = ?1",
                params![id],
                row_to_subject,
            )
            .optional()
    }

    pub fn list_subjects(&self) -> Result<Vec<Subject>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, parent_id, path FROM subjects ORDER BY path")?;
        let rows = stmt.query_map([], row_to_subject)?;
        rows.collect()
    }

    /// Subjects whose path starts with `prefix` (the subtree rooted there).
    pub fn subjects_under_path(&self, prefix: &str) -> Result<Vec<Subject>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, parent_id, path FROM subjects WHERE path LIKE ?1 || '%' ORDER BY path",
        )?;
        let rows = stmt.query_map(params![prefix], row_to_subject)?;
        rows.collect()
    }

    /// Reparent a subject, rewriting the materialized paths of its whole
    /// subtree in one transaction. The caller has already validated that
    /// `new_parent` is not inside the moved subtree.
    pub fn move_subject(
        &self,
        subject: &Subject,
        new_parent: Option<&Subject>,
    ) -> Result<Subject, rusqlite::Error> {
        let old_path = subject.path.clone();
        let new_path = match new_parent {
            Some(parent) => parent.child_path(&subject.id),
            None => format!("/{}/", subject.id),
        };

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE subjects SET path = ?1 || substr(path, ?2) WHERE path LIKE ?3 || '%'",
            params![new_path, old_path.len() as i64 + 1, old_path],
        )?;
        tx.execute(
            "UPDATE subjects SET parent_id = ?1 WHERE id = ?2",
            params![new_parent.map(|p| p.id.as_str()), subject.id],
        )?;
        tx.commit()?;

        let mut moved = subject.clone();
        moved.parent_id = new_parent.map(|p| p.id.clone());
        moved.path = new_path;
        Ok(moved)
    }

    // === Cards ===

    pub fn insert_card(&self, card: &CardTemplate) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO cards (id, subject_id, front, back, position, visible, flagged_for_review, author, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                card.id,
                card.subject_id,
                card.front,
                card.back,
                card.position,
                card.visible,
                card.flagged_for_review,
                card.author,
                format_datetime(card.created_at),
                format_datetime(card.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_card(&self, id: &str) -> Result<Option<CardTemplate>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
                params![id],
                row_to_card,
            )
            .optional()
    }

    pub fn cards_for_subject(&self, subject_id: &str) -> Result<Vec<CardTemplate>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE subject_id = ?1 ORDER BY position, id"
        ))?;
        let rows = stmt.query_map(params![subject_id], row_to_card)?;
        rows.collect()
    }

    /// Ids of every card on the subtree rooted at `prefix`.
    ///
    /// This is the membership computation the resolver caches; it stays a
    /// single range scan thanks to the materialized paths.
    pub fn card_ids_under_path(&self, prefix: &str) -> Result<BTreeSet<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id FROM cards c
             JOIN subjects s ON s.id = c.subject_id
             WHERE s.path LIKE ?1 || '%'",
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
        rows.collect()
    }

    /// Every card joined with its subject path.
    pub fn all_scoped_cards(&self) -> Result<Vec<ScopedCard>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CARD_COLUMNS_QUALIFIED}, s.path FROM cards
             JOIN subjects s ON s.id = cards.subject_id
             ORDER BY s.path, cards.position"
        ))?;
        let rows = stmt.query_map([], |row| {
            let card = row_to_card(row)?;
            let path: String = row.get(10)?;
            Ok(ScopedCard::new(card, path))
        })?;
        rows.collect()
    }

    /// Cards by id, joined with their subject path. Chunked so arbitrarily
    /// large memberships stay under the bound-parameter limit.
    pub fn scoped_cards_by_ids<'a, I>(&self, ids: I) -> Result<Vec<ScopedCard>, rusqlite::Error>
    where
        I: IntoIterator<Item = &'a String>,
    {
        const CHUNK: usize = 500;
        let ids: Vec<&String> = ids.into_iter().collect();
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {CARD_COLUMNS_QUALIFIED}, s.path FROM cards
                 JOIN subjects s ON s.id = cards.subject_id
                 WHERE cards.id IN ({placeholders})"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                let card = row_to_card(row)?;
                let path: String = row.get(10)?;
                Ok(ScopedCard::new(card, path))
            })?;
            for row in rows {
                out.push(row?);
            }
        }
        Ok(out)
    }

    pub fn set_card_visibility(&self, card_id: &str, visible: bool) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE cards SET visible = ?1, updated_at = ?2 WHERE id = ?3",
            params![visible, format_datetime(Utc::now()), card_id],
        )?;
        Ok(())
    }

    pub fn set_card_flagged(&self, card_id: &str, flagged: bool) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE cards SET flagged_for_review = ?1, updated_at = ?2 WHERE id = ?3",
            params![flagged, format_datetime(Utc::now()), card_id],
        )?;
        Ok(())
    }

    /// Move a card to another subject.
    pub fn set_card_subject(&self, card_id: &str, subject_id: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE cards SET subject_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![subject_id, format_datetime(Utc::now()), card_id],
        )?;
        Ok(())
    }

    // === Decks ===

    pub fn insert_deck(&self, deck: &Deck) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO decks (id, name, subject_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                deck.id,
                deck.name,
                deck.subject_id,
                format_datetime(deck.created_at)
            ],
        )?;
        Ok(())
    }

    pub fn get_deck(&self, id: &str) -> Result<Option<Deck>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, name, subject_id, created_at FROM decks WHERE id = ?1",
                params![id],
                row_to_deck,
            )
            .optional()
    }

    pub fn list_decks(&self) -> Result<Vec<Deck>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, subject_id, created_at FROM decks ORDER BY name")?;
        let rows = stmt.query_map([], row_to_deck)?;
        rows.collect()
    }

    /// Decks rooted at any of the given subject ids.
    pub fn decks_for_subjects(&self, subject_ids: &[&str]) -> Result<Vec<Deck>, rusqlite::Error> {
        let mut out = Vec::new();
        for id in subject_ids {
            let mut stmt = self.conn.prepare(
                "SELECT id, name, subject_id, created_at FROM decks WHERE subject_id = ?1",
            )?;
            let rows = stmt.query_map(params![id], row_to_deck)?;
            for row in rows {
                out.push(row?);
            }
        }
        Ok(out)
    }

    /// Replace the persisted membership of a deck atomically.
    pub fn replace_deck_membership(
        &self,
        deck_id: &str,
        card_ids: &BTreeSet<String>,
    ) -> Result<(), rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM deck_membership WHERE deck_id = ?1",
            params![deck_id],
        )?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO deck_membership (deck_id, card_id) VALUES (?1, ?2)")?;
            for card_id in card_ids {
                stmt.execute(params![deck_id, card_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn deck_membership(&self, deck_id: &str) -> Result<BTreeSet<String>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT card_id FROM deck_membership WHERE deck_id = ?1")?;
        let rows = stmt.query_map(params![deck_id], |row| row.get::<_, String>(0))?;
        rows.collect()
    }

    // === Learners ===

    pub fn insert_learner(&self, learner: &Learner) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO learners (id, name, tier, tz_offset_min, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                learner.id,
                learner.name,
                learner.tier.as_str(),
                learner.tz_offset_min,
                format_datetime(learner.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_learner(&self, id: &str) -> Result<Option<Learner>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, name, tier, tz_offset_min, created_at FROM learners WHERE id = ?1",
                params![id],
                row_to_learner,
            )
            .optional()
    }

    pub fn list_learners(&self) -> Result<Vec<Learner>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, tier, tz_offset_min, created_at FROM learners ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_learner)?;
        rows.collect()
    }

    pub fn set_learner_tier(&self, learner_id: &str, tier: StudyTier) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE learners SET tier = ?1 WHERE id = ?2",
            params![tier.as_str(), learner_id],
        )?;
        Ok(())
    }

    // === Stats ===

    pub fn stats_all(&self) -> Result<StudyStats, rusqlite::Error> {
        let count = |sql: &str| -> Result<u64, rusqlite::Error> {
            self.conn.query_row(sql, [], |row| row.get::<_, u64>(0))
        };
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let ratings_today = self.conn.query_row(
            "SELECT COUNT(*) FROM rating_events WHERE occurred_at >= ?1",
            params![format!("{today}T00:00:00+00:00")],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(StudyStats {
            total_subjects: count("SELECT COUNT(*) FROM subjects")?,
            total_cards: count("SELECT COUNT(*) FROM cards")?,
            total_decks: count("SELECT COUNT(*) FROM decks")?,
            total_learners: count("SELECT COUNT(*) FROM learners")?,
            total_ratings: count("SELECT COUNT(*) FROM rating_events")?,
            ratings_today,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Database {
        Database::open_memory().unwrap()
    }

    #[test]
    fn subject_round_trip() {
        let db = open();
        let root = Subject::new_root("mathematics");
        db.insert_subject(&root).unwrap();
        let loaded = db.get_subject(&root.id).unwrap().unwrap();
        assert_eq!(loaded, root);
        assert!(db.get_subject("missing").unwrap().is_none());
    }

    #[test]
    fn card_round_trip_preserves_flags() {
        let db = open();
        let root = Subject::new_root("math");
        db.insert_subject(&root).unwrap();
        let mut card = CardTemplate::new(&root.id, "2+2?", "4", 1);
        card.author = Some("curator-a".to_string());
        db.insert_card(&card).unwrap();

        db.set_card_flagged(&card.id, true).unwrap();
        let loaded = db.get_card(&card.id).unwrap().unwrap();
        assert!(loaded.flagged_for_review);
        assert!(!loaded.eligible());
        assert_eq!(loaded.author.as_deref(), Some("curator-a"));
    }

    #[test]
    fn subtree_membership_uses_path_prefix() {
        let db = open();
        let root = Subject::new_root("math");
        let child = Subject::new_child(&root, "algebra");
        let other = Subject::new_root("history");
        for s in [&root, &child, &other] {
            db.insert_subject(s).unwrap();
        }
        let c1 = CardTemplate::new(&root.id, "q1", "a1", 0);
        let c2 = CardTemplate::new(&child.id, "q2", "a2", 0);
        let c3 = CardTemplate::new(&other.id, "q3", "a3", 0);
        for c in [&c1, &c2, &c3] {
            db.insert_card(c).unwrap();
        }

        let ids = db.card_ids_under_path(&root.path).unwrap();
        assert!(ids.contains(&c1.id));
        assert!(ids.contains(&c2.id));
        assert!(!ids.contains(&c3.id));
    }

    #[test]
    fn move_subject_rewrites_subtree_paths() {
        let db = open();
        let math = Subject::new_root("math");
        let algebra = Subject::new_child(&math, "algebra");
        let quadratics = Subject::new_child(&algebra, "quadratics");
        let science = Subject::new_root("science");
        for s in [&math, &algebra, &quadratics, &science] {
            db.insert_subject(s).unwrap();
        }

        let moved = db.move_subject(&algebra, Some(&science)).unwrap();
        assert_eq!(moved.path, science.child_path(&algebra.id));
        assert_eq!(moved.parent_id.as_deref(), Some(science.id.as_str()));

        let leaf = db.get_subject(&quadratics.id).unwrap().unwrap();
        assert!(leaf.path.starts_with(&science.path));
        assert!(science.is_ancestor_of(&leaf));
        assert!(!math.is_ancestor_of(&leaf));
    }

    #[test]
    fn deck_membership_replacement_is_atomic() {
        let db = open();
        let deck = Deck::new("daily", None);
        db.insert_deck(&deck).unwrap();
        let first: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        db.replace_deck_membership(&deck.id, &first).unwrap();
        let second: BTreeSet<String> = ["b", "c", "d"].iter().map(|s| s.to_string()).collect();
        db.replace_deck_membership(&deck.id, &second).unwrap();
        assert_eq!(db.deck_membership(&deck.id).unwrap(), second);
    }

    #[test]
    fn learner_tier_round_trip() {
        let db = open();
        let learner = Learner::new("dana", StudyTier::Plus, -300);
        db.insert_learner(&learner).unwrap();
        let loaded = db.get_learner(&learner.id).unwrap().unwrap();
        assert_eq!(loaded.tier, StudyTier::Plus);
        assert_eq!(loaded.tz_offset_min, -300);

        db.set_learner_tier(&learner.id, StudyTier::Unlimited).unwrap();
        let loaded = db.get_learner(&learner.id).unwrap().unwrap();
        assert_eq!(loaded.tier, StudyTier::Unlimited);
    }
}
