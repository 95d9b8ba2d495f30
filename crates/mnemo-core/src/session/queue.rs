//! Presentation ordering for a study queue.
//!
//! Cards are served in three bands: learning steps whose delay has elapsed,
//! then due reviews, then fresh cards. Within a band the order is fully
//! deterministic so two builds over the same state produce the same queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Which band of the queue a card belongs to. Variant order is the
/// presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCategory {
    /// Mid-acquisition card whose step delay has elapsed (or falls inside
    /// the learn-ahead window).
    LearningStep,
    /// Graduated card whose interval has elapsed.
    DueReview,
    /// Card this learner has never answered.
    FreshCard,
}

/// One serveable card, joined with the fields the ordering needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub card_id: String,
    pub category: QueueCategory,
    pub due_at: DateTime<Utc>,
    pub subject_path: String,
    pub position: i64,
}

/// Order entries for presentation.
///
/// Learning and review bands go earliest-due first (for reviews that means
/// most overdue first); the fresh band follows curriculum order. Remaining
/// ties fall through to the card id so the order is total.
pub fn sort_for_presentation(entries: &mut [QueueEntry]) {
    entries.sort_by(compare_entries);
}

fn compare_entries(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    a.category.cmp(&b.category).then_with(|| match a.category {
        QueueCategory::LearningStep | QueueCategory::DueReview => a
            .due_at
            .cmp(&b.due_at)
            .then_with(|| a.subject_path.cmp(&b.subject_path))
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| a.card_id.cmp(&b.card_id)),
        QueueCategory::FreshCard => a
            .subject_path
            .cmp(&b.subject_path)
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| a.card_id.cmp(&b.card_id)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(card_id: &str, category: QueueCategory, due_min: i64, path: &str, pos: i64) -> QueueEntry {
        QueueEntry {
            card_id: card_id.to_string(),
            category,
            due_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(due_min),
            subject_path: path.to_string(),
            position: pos,
        }
    }

    #[test]
    fn bands_come_in_fixed_order() {
        let mut q = vec![
            entry("fresh", QueueCategory::FreshCard, 0, "/a/", 0),
            entry("review", QueueCategory::DueReview, -500, "/a/", 0),
            entry("learning", QueueCategory::LearningStep, -1, "/a/", 0),
        ];
        sort_for_presentation(&mut q);
        let ids: Vec<&str> = q.iter().map(|e| e.card_id.as_str()).collect();
        assert_eq!(ids, ["learning", "review", "fresh"]);
    }

    #[test]
    fn reviews_most_overdue_first() {
        let mut q = vec![
            entry("barely", QueueCategory::DueReview, -5, "/a/", 0),
            entry("very", QueueCategory::DueReview, -5000, "/a/", 0),
            entry("mid", QueueCategory::DueReview, -60, "/a/", 0),
        ];
        sort_for_presentation(&mut q);
        let ids: Vec<&str> = q.iter().map(|e| e.card_id.as_str()).collect();
        assert_eq!(ids, ["very", "mid", "barely"]);
    }

    #[test]
    fn fresh_cards_follow_curriculum_order() {
        let mut q = vec![
            entry("c3", QueueCategory::FreshCard, 0, "/algebra/quadratics/", 0),
            entry("c1", QueueCategory::FreshCard, 0, "/algebra/", 2),
            entry("c2", QueueCategory::FreshCard, 0, "/algebra/", 7),
        ];
        sort_for_presentation(&mut q);
        let ids: Vec<&str> = q.iter().map(|e| e.card_id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
    }

    #[test]
    fn review_ties_break_on_path_then_position() {
        let mut q = vec![
            entry("b", QueueCategory::DueReview, -10, "/b/", 1),
            entry("a2", QueueCategory::DueReview, -10, "/a/", 9),
            entry("a1", QueueCategory::DueReview, -10, "/a/", 3),
        ];
        sort_for_presentation(&mut q);
        let ids: Vec<&str> = q.iter().map(|e| e.card_id.as_str()).collect();
        assert_eq!(ids, ["a1", "a2", "b"]);
    }
}
