//! Append-only review history.
//!
//! Every accepted rating emits one [`RatingEvent`] capturing the transition
//! it caused. The log is the ground truth for analytics and never mutated;
//! progress rows can be rebuilt from it if they are ever lost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::srs::{CardProgress, CardState, Rating};

/// One graded answer, with the before/after snapshot of the transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEvent {
    /// Log sequence number; 0 until persisted.
    pub id: i64,
    pub learner_id: String,
    pub card_id: String,
    pub rating: Rating,
    pub state_before: CardState,
    pub state_after: CardState,
    pub ease_before: f64,
    pub ease_after: f64,
    pub occurred_at: DateTime<Utc>,
}

impl RatingEvent {
    /// Build the event for a transition computed by the scheduler.
    pub fn from_transition(
        before: &CardProgress,
        after: &CardProgress,
        rating: Rating,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            learner_id: after.learner_id.clone(),
            card_id: after.card_id.clone(),
            rating,
            state_before: before.state,
            state_after: after.state,
            ease_before: before.ease,
            ease_after: after.ease,
            occurred_at,
        }
    }

    /// Whether the answer counted as recalled.
    pub fn is_success(&self) -> bool {
        self.rating.is_success()
    }

    /// A lapse is a forgotten card: `again` on a card that was in review.
    pub fn is_lapse(&self) -> bool {
        self.rating == Rating::Again && self.state_before == CardState::Review
    }

    /// Signed ease movement caused by this answer.
    pub fn ease_drift(&self) -> f64 {
        self.ease_after - self.ease_before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srs::Scheduler;

    #[test]
    fn lapse_requires_review_state_before() {
        let now = Utc::now();
        let scheduler = Scheduler::new();
        let fresh = scheduler.fresh_progress("l1", "c1", now);
        let after = scheduler.next_progress(&fresh, Rating::Again, now);
        let event = RatingEvent::from_transition(&fresh, &after, Rating::Again, now);
        assert!(!event.is_lapse());

        let mut reviewed = fresh.clone();
        reviewed.state = CardState::Review;
        reviewed.interval_min = 10 * 24 * 60;
        let after = scheduler.next_progress(&reviewed, Rating::Again, now);
        let event = RatingEvent::from_transition(&reviewed, &after, Rating::Again, now);
        assert!(event.is_lapse());
        assert!(event.ease_drift() < 0.0);
    }
}
