//! Per-learner card retention state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Retention phase of a card for one learner.
///
/// ```text
/// new ──(first success)──> learning ──(graduation)──> review
///                              ^                         │
///                              └───────(lapse)───────────┘
/// ```
///
/// `new` and `learning` cards run on short session-internal step delays;
/// `review` cards run on calendar intervals grown by the ease factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    New,
    Learning,
    Review,
}

impl Default for CardState {
    fn default() -> Self {
        CardState::New
    }
}

impl CardState {
    pub fn as_str(self) -> &'static str {
        match self {
            CardState::New => "new",
            CardState::Learning => "learning",
            CardState::Review => "review",
        }
    }
}

/// The mutable SRS state for one (learner, card) pair.
///
/// Created lazily the first time a card is presented; afterwards mutated only
/// by the scheduler. `version` is the optimistic-concurrency stamp the store
/// checks on every write so racing submissions for the same pair cannot
/// silently double-apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardProgress {
    pub learner_id: String,
    pub card_id: String,
    pub state: CardState,
    /// Current interval in minutes. While learning this mirrors the active
    /// step delay; in review it is the calendar interval.
    pub interval_min: i64,
    /// Multiplicative interval growth factor, floored at the configured
    /// minimum so it can never collapse.
    pub ease: f64,
    pub due_at: DateTime<Utc>,
    /// Consecutive successful reviews since the last `again`.
    pub repetitions: u32,
    /// Total `again` ratings recorded for this pair.
    pub lapses: u32,
    /// Index into the learning-step ladder; meaningful in new/learning.
    pub learning_step: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    /// Row version stamp; incremented by the store on every write.
    pub version: i64,
}

impl CardProgress {
    /// Default progress for a card never seen by this learner: `new` state,
    /// due immediately, starting ease.
    pub fn fresh(
        learner_id: impl Into<String>,
        card_id: impl Into<String>,
        starting_ease: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            learner_id: learner_id.into(),
            card_id: card_id.into(),
            state: CardState::New,
            interval_min: 0,
            ease: starting_ease,
            due_at: now,
            repetitions: 0,
            lapses: 0,
            learning_step: 0,
            last_reviewed_at: None,
            version: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::minutes(self.interval_min)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }

    /// Whether this pair has ever been rated.
    pub fn seen(&self) -> bool {
        self.last_reviewed_at.is_some()
    }

    /// Whether the card is in the short-delay learning phase (including a
    /// `new` card already rated within a session).
    pub fn in_learning_phase(&self) -> bool {
        match self.state {
            CardState::Learning => true,
            CardState::New => self.seen(),
            CardState::Review => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_progress_is_new_and_due() {
        let now = Utc::now();
        let p = CardProgress::fresh("learner", "card", 2.5, now);
        assert_eq!(p.state, CardState::New);
        assert!(p.is_due(now));
        assert!(!p.seen());
        assert!(!p.in_learning_phase());
        assert_eq!(p.repetitions, 0);
        assert_eq!(p.lapses, 0);
        assert_eq!(p.version, 0);
    }

    #[test]
    fn seen_new_card_counts_as_learning_phase() {
        let now = Utc::now();
        let mut p = CardProgress::fresh("learner", "card", 2.5, now);
        p.last_reviewed_at = Some(now);
        assert_eq!(p.state, CardState::New);
        assert!(p.in_learning_phase());
    }
}
