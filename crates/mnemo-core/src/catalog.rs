//! Catalog types: cards, subjects, decks.
//!
//! The catalog is owned by the curation side of the system; the engine treats
//! it as read-only content. Subjects form a tree addressed by materialized
//! paths so descendant lookups are plain prefix queries, never recursive
//! traversals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator used in materialized subject paths.
pub const PATH_SEP: char = '/';

/// An immutable-ish content unit: one flashcard template.
///
/// `position` is the curator-defined sequence key within a subject and drives
/// the order in which unseen cards are introduced to learners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardTemplate {
    pub id: String,
    pub subject_id: String,
    pub front: String,
    pub back: String,
    /// Curator sequence within the subject (introduction order for new cards).
    pub position: i64,
    /// Hidden cards are never offered in sessions.
    pub visible: bool,
    /// Cards held for curator review are never offered in sessions.
    pub flagged_for_review: bool,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CardTemplate {
    /// Create a new visible, unflagged card under a subject.
    pub fn new(
        subject_id: impl Into<String>,
        front: impl Into<String>,
        back: impl Into<String>,
        position: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            front: front.into(),
            back: back.into(),
            position,
            visible: true,
            flagged_for_review: false,
            author: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether sessions may offer this card at all.
    pub fn eligible(&self) -> bool {
        self.visible && !self.flagged_for_review
    }
}

/// A node in the hierarchical subject taxonomy.
///
/// The `path` is the node's full ancestry as one orderable string:
/// `/<root id>/<child id>/.../<own id>/`. A subject's path is always its
/// parent's path with its own id appended, which makes cycles structurally
/// impossible and descendant queries a lexicographic prefix match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub title: String,
    pub parent_id: Option<String>,
    pub path: String,
}

impl Subject {
    /// Create a root subject.
    pub fn new_root(title: impl Into<String>) -> Self {
        let id = Uuid::new_v4().to_string();
        let path = format!("{PATH_SEP}{id}{PATH_SEP}");
        Self {
            id,
            title: title.into(),
            parent_id: None,
            path,
        }
    }

    /// Create a child of `parent`.
    pub fn new_child(parent: &Subject, title: impl Into<String>) -> Self {
        let id = Uuid::new_v4().to_string();
        let path = format!("{}{id}{PATH_SEP}", parent.path);
        Self {
            id,
            title: title.into(),
            parent_id: Some(parent.id.clone()),
            path,
        }
    }

    /// Path a child of this subject would carry.
    pub fn child_path(&self, child_id: &str) -> String {
        format!("{}{child_id}{PATH_SEP}", self.path)
    }

    /// Whether `other` lies strictly below this subject in the tree.
    pub fn is_ancestor_of(&self, other: &Subject) -> bool {
        other.path.len() > self.path.len() && other.path.starts_with(&self.path)
    }

    /// Ancestor ids from the root down to (and including) this subject.
    pub fn ancestry(&self) -> Vec<&str> {
        self.path
            .split(PATH_SEP)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Tree depth; roots are depth 1.
    pub fn depth(&self) -> usize {
        self.ancestry().len()
    }
}

/// A named collection of cards.
///
/// When `subject_id` is set the membership is derived: every card assigned to
/// that subject or any of its descendants belongs to the deck. The resolver
/// maintains the denormalized `deck_membership` relation for such decks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub id: String,
    pub name: String,
    /// Root subject for derived membership, if any.
    pub subject_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(name: impl Into<String>, subject_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            subject_id,
            created_at: Utc::now(),
        }
    }
}

/// Selects which decks a study session draws cards from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum DeckSelector {
    /// Every deck the learner can see.
    Any,
    /// An explicit list of deck ids.
    Decks(Vec<String>),
    /// All cards under one subject subtree, deck membership aside.
    Subject(String),
}

impl DeckSelector {
    pub fn single(deck_id: impl Into<String>) -> Self {
        DeckSelector::Decks(vec![deck_id.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_path_extends_parent_path() {
        let root = Subject::new_root("Mathematics");
        let child = Subject::new_child(&root, "Algebra");
        assert!(child.path.starts_with(&root.path));
        assert_eq!(child.path, format!("{}{}/", root.path, child.id));
        assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
    }

    #[test]
    fn ancestry_lists_ids_root_first() {
        let root = Subject::new_root("Science");
        let mid = Subject::new_child(&root, "Physics");
        let leaf = Subject::new_child(&mid, "Optics");
        assert_eq!(leaf.ancestry(), vec![&root.id, &mid.id, &leaf.id]);
        assert_eq!(leaf.depth(), 3);
        assert_eq!(root.depth(), 1);
    }

    #[test]
    fn ancestor_check_is_strict() {
        let root = Subject::new_root("History");
        let child = Subject::new_child(&root, "Antiquity");
        assert!(root.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
    }

    #[test]
    fn fresh_card_is_eligible() {
        let subject = Subject::new_root("Latin");
        let mut card = CardTemplate::new(&subject.id, "ave", "hail", 0);
        assert!(card.eligible());
        card.flagged_for_review = true;
        assert!(!card.eligible());
        card.flagged_for_review = false;
        card.visible = false;
        assert!(!card.eligible());
    }

    #[test]
    fn deck_selector_serializes_tagged() {
        let sel = DeckSelector::single("deck-1");
        let json = serde_json::to_string(&sel).unwrap();
        let back: DeckSelector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sel);
    }
}
