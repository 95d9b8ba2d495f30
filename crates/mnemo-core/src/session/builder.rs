//! Study session assembly.
//!
//! The builder is pure: it takes the cards in scope, the learner's progress
//! rows, and today's quota state, and produces an ordered queue plus the
//! bookkeeping needed to tell "you are done" apart from "your tier is done
//! for today". Persistence and scope resolution happen elsewhere.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::queue::{sort_for_presentation, QueueCategory, QueueEntry};
use super::quota::{DailyCounters, TierLimits};
use crate::catalog::CardTemplate;
use crate::srs::{CardProgress, CardState};

/// Session assembly knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Learning-step cards due within this many minutes are served early,
    /// so short step delays never stall an active session.
    #[serde(default = "default_learn_ahead")]
    pub learn_ahead_min: i64,
}

fn default_learn_ahead() -> i64 {
    20
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            learn_ahead_min: default_learn_ahead(),
        }
    }
}

/// A card inside the session scope, joined with its subject path.
#[derive(Debug, Clone)]
pub struct ScopedCard {
    pub card: CardTemplate,
    pub subject_path: String,
}

impl ScopedCard {
    pub fn new(card: CardTemplate, subject_path: impl Into<String>) -> Self {
        Self {
            card,
            subject_path: subject_path.into(),
        }
    }
}

/// Pool sizes before quota truncation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub learning_pending: usize,
    pub reviews_pending: usize,
    pub fresh_pending: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.learning_pending + self.reviews_pending + self.fresh_pending
    }
}

/// An assembled queue for one learner on one local day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySession {
    /// Opaque token ratings must echo back. Stable for the whole local day.
    pub token: String,
    pub learner_id: String,
    pub day: NaiveDate,
    pub queue: Vec<QueueEntry>,
    /// What was waiting before quotas were applied.
    pub pending: QueueCounts,
    /// True when the queue is empty *only* because daily quotas blocked
    /// cards that are otherwise waiting.
    pub limit_reached: bool,
    pub built_at: DateTime<Utc>,
}

impl StudySession {
    pub fn next_entry(&self) -> Option<&QueueEntry> {
        self.queue.first()
    }

    /// Nothing waiting and nothing blocked: the learner is actually done.
    pub fn is_complete(&self) -> bool {
        self.queue.is_empty() && !self.limit_reached
    }
}

/// Assembles study sessions from scope + progress + quota state.
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Build the queue for `learner` over the given scope.
    ///
    /// `progress` is keyed by card id and holds this learner's rows only.
    /// Hidden and flagged cards are dropped here, so a card flagged after
    /// scheduling simply stops being served without touching its progress.
    pub fn build(
        &self,
        learner_id: &str,
        day: NaiveDate,
        cards: &[ScopedCard],
        progress: &HashMap<String, CardProgress>,
        limits: &TierLimits,
        counters: &DailyCounters,
        now: DateTime<Utc>,
    ) -> StudySession {
        let ahead = now + Duration::minutes(self.config.learn_ahead_min);
        let mut learning: Vec<QueueEntry> = Vec::new();
        let mut reviews: Vec<QueueEntry> = Vec::new();
        let mut fresh: Vec<QueueEntry> = Vec::new();

        for scoped in cards {
            if !scoped.card.eligible() {
                continue;
            }
            let entry = |category: QueueCategory, due_at: DateTime<Utc>| QueueEntry {
                card_id: scoped.card.id.clone(),
                category,
                due_at,
                subject_path: scoped.subject_path.clone(),
                position: scoped.card.position,
            };
            match progress.get(&scoped.card.id) {
                None => fresh.push(entry(QueueCategory::FreshCard, now)),
                Some(p) => match p.state {
                    CardState::Review => {
                        if p.due_at <= now {
                            reviews.push(entry(QueueCategory::DueReview, p.due_at));
                        }
                    }
                    CardState::Learning => {
                        if p.due_at <= ahead {
                            learning.push(entry(QueueCategory::LearningStep, p.due_at));
                        }
                    }
                    CardState::New => {
                        if p.seen() {
                            // Failed its first showing; behaves as a step card.
                            if p.due_at <= ahead {
                                learning.push(entry(QueueCategory::LearningStep, p.due_at));
                            }
                        } else {
                            fresh.push(entry(QueueCategory::FreshCard, p.due_at));
                        }
                    }
                },
            }
        }

        let pending = QueueCounts {
            learning_pending: learning.len(),
            reviews_pending: reviews.len(),
            fresh_pending: fresh.len(),
        };

        // Quotas cap what is offered, never what exists. Truncate after
        // sorting so the most overdue reviews survive the cut.
        sort_for_presentation(&mut learning);
        sort_for_presentation(&mut reviews);
        sort_for_presentation(&mut fresh);
        if let Some(cap) = counters.reviews_remaining(limits) {
            reviews.truncate(cap as usize);
        }
        if let Some(cap) = counters.new_remaining(limits) {
            fresh.truncate(cap as usize);
        }

        let mut queue = learning;
        queue.extend(reviews);
        queue.extend(fresh);

        let limit_reached = queue.is_empty()
            && ((pending.reviews_pending > 0 && !counters.can_review(limits))
                || (pending.fresh_pending > 0 && !counters.can_introduce_new(limits)));

        let token = counters
            .session_token
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        StudySession {
            token,
            learner_id: learner_id.to_string(),
            day,
            queue,
            pending,
            limit_reached,
            built_at: now,
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn scoped(subject: &str, position: i64) -> ScopedCard {
        ScopedCard::new(
            CardTemplate::new("s1", "front", "back", position),
            format!("/{subject}/"),
        )
    }

    fn counters() -> DailyCounters {
        DailyCounters::start("l1", day())
    }

    #[test]
    fn fresh_pool_is_truncated_to_new_quota() {
        let builder = SessionBuilder::new();
        let cards: Vec<ScopedCard> = (0..30).map(|i| scoped("algebra", i)).collect();
        let limits = TierLimits {
            new_per_day: Some(20),
            reviews_per_day: Some(200),
        };
        let session = builder.build(
            "l1",
            day(),
            &cards,
            &HashMap::new(),
            &limits,
            &counters(),
            now(),
        );
        assert_eq!(session.queue.len(), 20);
        assert_eq!(session.pending.fresh_pending, 30);
        assert!(!session.limit_reached);
    }

    #[test]
    fn bands_are_ordered_learning_then_review_then_fresh() {
        let builder = SessionBuilder::new();
        let cards = vec![scoped("a", 0), scoped("a", 1), scoped("a", 2)];
        let mut progress = HashMap::new();
        let mut review = CardProgress::fresh("l1", &cards[0].card.id, 2.5, now());
        review.state = CardState::Review;
        review.due_at = now() - Duration::days(2);
        progress.insert(cards[0].card.id.clone(), review);
        let mut step = CardProgress::fresh("l1", &cards[1].card.id, 2.5, now());
        step.state = CardState::Learning;
        step.due_at = now() - Duration::minutes(1);
        step.last_reviewed_at = Some(now() - Duration::minutes(11));
        progress.insert(cards[1].card.id.clone(), step);

        let session = builder.build(
            "l1",
            day(),
            &cards,
            &progress,
            &TierLimits::UNBOUNDED,
            &counters(),
            now(),
        );
        let categories: Vec<QueueCategory> = session.queue.iter().map(|e| e.category).collect();
        assert_eq!(
            categories,
            [
                QueueCategory::LearningStep,
                QueueCategory::DueReview,
                QueueCategory::FreshCard
            ]
        );
    }

    #[test]
    fn learn_ahead_window_includes_near_future_steps() {
        let builder = SessionBuilder::new();
        let cards = vec![scoped("a", 0), scoped("a", 1)];
        let mut progress = HashMap::new();
        for (i, due_in) in [15i64, 25].iter().enumerate() {
            let mut p = CardProgress::fresh("l1", &cards[i].card.id, 2.5, now());
            p.state = CardState::Learning;
            p.due_at = now() + Duration::minutes(*due_in);
            p.last_reviewed_at = Some(now());
            progress.insert(cards[i].card.id.clone(), p);
        }
        let session = builder.build(
            "l1",
            day(),
            &cards,
            &progress,
            &TierLimits::UNBOUNDED,
            &counters(),
            now(),
        );
        assert_eq!(session.queue.len(), 1);
        assert_eq!(session.queue[0].card_id, cards[0].card.id);
    }

    #[test]
    fn quota_exhaustion_is_not_completion() {
        let builder = SessionBuilder::new();
        let cards = vec![scoped("a", 0)];
        let mut progress = HashMap::new();
        let mut review = CardProgress::fresh("l1", &cards[0].card.id, 2.5, now());
        review.state = CardState::Review;
        review.due_at = now() - Duration::hours(1);
        progress.insert(cards[0].card.id.clone(), review);
        let limits = TierLimits {
            new_per_day: Some(20),
            reviews_per_day: Some(200),
        };
        let mut used = counters();
        used.reviews_completed = 200;

        let session = builder.build("l1", day(), &cards, &progress, &limits, &used, now());
        assert!(session.queue.is_empty());
        assert!(session.limit_reached);
        assert!(!session.is_complete());

        let empty = builder.build("l1", day(), &[], &HashMap::new(), &limits, &used, now());
        assert!(empty.is_complete());
    }

    #[test]
    fn hidden_and_flagged_cards_are_skipped() {
        let builder = SessionBuilder::new();
        let mut hidden = scoped("a", 0);
        hidden.card.visible = false;
        let mut flagged = scoped("a", 1);
        flagged.card.flagged_for_review = true;
        let session = builder.build(
            "l1",
            day(),
            &[hidden, flagged],
            &HashMap::new(),
            &TierLimits::UNBOUNDED,
            &counters(),
            now(),
        );
        assert!(session.queue.is_empty());
        assert!(session.is_complete());
    }

    #[test]
    fn day_token_is_reused_when_present() {
        let builder = SessionBuilder::new();
        let mut c = counters();
        c.session_token = Some("tok-1".to_string());
        let session = builder.build(
            "l1",
            day(),
            &[],
            &HashMap::new(),
            &TierLimits::UNBOUNDED,
            &c,
            now(),
        );
        assert_eq!(session.token, "tok-1");
    }
}
