//! The rating transition function.
//!
//! `Scheduler::next_progress` maps (current progress, rating, now) to the
//! next progress value. It is a pure function: no clock reads, no I/O, no
//! shared state -- the caller supplies `now` and persists the result. That
//! keeps every transition exhaustively testable and makes concurrent
//! execution across learners trivially safe.
//!
//! Policy constants (step ladder, ease bounds, bonuses, interval cap, fuzz
//! ratio) live in [`SrsConfig`] rather than in code so curation policy can
//! be tuned without a release.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_pcg::Mcg128Xsl64;
use serde::{Deserialize, Serialize};

use super::progress::{CardProgress, CardState};
use super::rating::Rating;

/// Minutes in one calendar day.
const DAY_MIN: i64 = 24 * 60;

/// Hard upper bound on the fuzz ratio. Adjacent ease tiers differ by at
/// least the minimum ease (30%), so two windows of at most 10% each can
/// never swap the order of neighboring intervals.
const MAX_FUZZ_RATIO: f64 = 0.1;

/// Scheduling policy constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsConfig {
    /// Session-internal learning step delays in minutes. The ladder length
    /// is the graduation threshold.
    #[serde(default = "default_learning_steps")]
    pub learning_steps_min: Vec<u32>,
    /// First review interval after graduation, in days.
    #[serde(default = "default_graduating_interval")]
    pub graduating_interval_days: u32,
    /// Ease assigned to never-seen cards.
    #[serde(default = "default_starting_ease")]
    pub starting_ease: f64,
    /// Floor below which ease can never fall.
    #[serde(default = "default_min_ease")]
    pub min_ease: f64,
    /// Subtracted from ease on a lapse.
    #[serde(default = "default_lapse_ease_penalty")]
    pub lapse_ease_penalty: f64,
    /// Subtracted from ease on a hard review.
    #[serde(default = "default_hard_ease_penalty")]
    pub hard_ease_penalty: f64,
    /// Added to ease on an easy review.
    #[serde(default = "default_easy_ease_bonus")]
    pub easy_ease_bonus: f64,
    /// Sub-unity interval multiplier for hard reviews.
    #[serde(default = "default_hard_interval_factor")]
    pub hard_interval_factor: f64,
    /// Extra interval multiplier for easy outcomes.
    #[serde(default = "default_easy_bonus")]
    pub easy_bonus: f64,
    /// Review intervals never grow past this many days.
    #[serde(default = "default_max_interval_days")]
    pub max_interval_days: u32,
    /// Due-date fuzz window as a fraction of the interval; clamped to
    /// [`MAX_FUZZ_RATIO`].
    #[serde(default = "default_fuzz_ratio")]
    pub fuzz_ratio: f64,
}

fn default_learning_steps() -> Vec<u32> {
    vec![1, 10]
}
fn default_graduating_interval() -> u32 {
    1
}
fn default_starting_ease() -> f64 {
    2.5
}
fn default_min_ease() -> f64 {
    1.3
}
fn default_lapse_ease_penalty() -> f64 {
    0.2
}
fn default_hard_ease_penalty() -> f64 {
    0.15
}
fn default_easy_ease_bonus() -> f64 {
    0.15
}
fn default_hard_interval_factor() -> f64 {
    0.8
}
fn default_easy_bonus() -> f64 {
    1.3
}
fn default_max_interval_days() -> u32 {
    36500
}
fn default_fuzz_ratio() -> f64 {
    0.05
}

impl Default for SrsConfig {
    fn default() -> Self {
        Self {
            learning_steps_min: default_learning_steps(),
            graduating_interval_days: default_graduating_interval(),
            starting_ease: default_starting_ease(),
            min_ease: default_min_ease(),
            lapse_ease_penalty: default_lapse_ease_penalty(),
            hard_ease_penalty: default_hard_ease_penalty(),
            easy_ease_bonus: default_easy_ease_bonus(),
            hard_interval_factor: default_hard_interval_factor(),
            easy_bonus: default_easy_bonus(),
            max_interval_days: default_max_interval_days(),
            fuzz_ratio: default_fuzz_ratio(),
        }
    }
}

impl SrsConfig {
    /// Number of learning steps a card must clear to graduate.
    pub fn graduation_threshold(&self) -> u32 {
        self.learning_steps_min.len().max(1) as u32
    }

    /// Delay for a learning step, clamped to the ladder. An empty ladder
    /// degrades to a single one-minute step.
    pub fn step_delay_min(&self, step: u32) -> i64 {
        match self.learning_steps_min.as_slice() {
            [] => 1,
            steps => {
                let idx = (step as usize).min(steps.len() - 1);
                steps[idx] as i64
            }
        }
    }

    /// The learning-phase minimum: delay of the first step.
    pub fn first_step_min(&self) -> i64 {
        self.step_delay_min(0)
    }

    fn cap_min(&self) -> i64 {
        self.max_interval_days as i64 * DAY_MIN
    }

    fn graduating_interval_min(&self) -> i64 {
        self.graduating_interval_days as i64 * DAY_MIN
    }
}

/// The retention-state machine.
pub struct Scheduler {
    config: SrsConfig,
}

impl Scheduler {
    /// Create a scheduler with default policy.
    pub fn new() -> Self {
        Self {
            config: SrsConfig::default(),
        }
    }

    /// Create with custom policy.
    pub fn with_config(config: SrsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SrsConfig {
        &self.config
    }

    /// Default progress for a card this learner has never seen.
    pub fn fresh_progress(
        &self,
        learner_id: &str,
        card_id: &str,
        now: DateTime<Utc>,
    ) -> CardProgress {
        CardProgress::fresh(learner_id, card_id, self.config.starting_ease, now)
    }

    /// Compute the progress resulting from one rating.
    ///
    /// Pure and total: every (state, rating) pair is covered, identical
    /// inputs always produce identical output (including the fuzzed due
    /// date, whose offset is seeded from the pair's identity).
    pub fn next_progress(
        &self,
        progress: &CardProgress,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> CardProgress {
        let mut next = progress.clone();
        next.last_reviewed_at = Some(now);

        if rating == Rating::Again {
            next.lapses += 1;
            next.repetitions = 0;
        } else {
            next.repetitions += 1;
        }

        match (progress.state, rating) {
            // A new card stays new until its first successful showing.
            (CardState::New, Rating::Again) => {
                self.place_in_learning(&mut next, CardState::New, 0, now);
            }
            (CardState::New, Rating::Hard) => {
                self.place_in_learning(&mut next, CardState::Learning, progress.learning_step, now);
            }
            (CardState::New, Rating::Good) | (CardState::Learning, Rating::Good) => {
                let cleared = progress.learning_step + 1;
                if cleared >= self.config.graduation_threshold() {
                    self.graduate(&mut next, false, now);
                } else {
                    self.place_in_learning(&mut next, CardState::Learning, cleared, now);
                }
            }
            (CardState::New, Rating::Easy) | (CardState::Learning, Rating::Easy) => {
                self.graduate(&mut next, true, now);
            }
            (CardState::Learning, Rating::Again) => {
                self.place_in_learning(&mut next, CardState::Learning, 0, now);
            }
            (CardState::Learning, Rating::Hard) => {
                self.place_in_learning(&mut next, CardState::Learning, progress.learning_step, now);
            }
            // A lapse demotes the card for re-stabilization.
            (CardState::Review, Rating::Again) => {
                next.ease = floor_ease(progress.ease - self.config.lapse_ease_penalty, &self.config);
                self.place_in_learning(&mut next, CardState::Learning, 0, now);
            }
            (CardState::Review, Rating::Hard) => {
                next.ease = floor_ease(progress.ease - self.config.hard_ease_penalty, &self.config);
                let shrunk = scale_interval(progress.interval_min, self.config.hard_interval_factor);
                self.place_in_review(&mut next, shrunk.max(DAY_MIN), now);
            }
            (CardState::Review, Rating::Good) => {
                let grown = scale_interval(progress.interval_min, progress.ease);
                self.place_in_review(&mut next, grown, now);
            }
            (CardState::Review, Rating::Easy) => {
                next.ease = progress.ease + self.config.easy_ease_bonus;
                let grown =
                    scale_interval(progress.interval_min, progress.ease * self.config.easy_bonus);
                self.place_in_review(&mut next, grown, now);
            }
        }

        next
    }

    /// Park the card on a learning step: short delay, no fuzz.
    fn place_in_learning(
        &self,
        next: &mut CardProgress,
        state: CardState,
        step: u32,
        now: DateTime<Utc>,
    ) {
        next.state = state;
        next.learning_step = step;
        next.interval_min = self.config.step_delay_min(step);
        next.due_at = now + Duration::minutes(next.interval_min);
    }

    /// Move a learning-phase card into review.
    fn graduate(&self, next: &mut CardProgress, easy: bool, now: DateTime<Utc>) {
        let base = self.config.graduating_interval_min();
        let interval = if easy {
            scale_interval(base, self.config.easy_bonus)
        } else {
            base
        };
        self.place_in_review(next, interval, now);
    }

    /// Park the card in review at `interval_min` (capped), with the
    /// deterministic fuzz applied to the due date only -- the stored
    /// interval stays exact.
    fn place_in_review(&self, next: &mut CardProgress, interval_min: i64, now: DateTime<Utc>) {
        next.state = CardState::Review;
        next.learning_step = 0;
        next.interval_min = interval_min.min(self.config.cap_min());
        let fuzz = self.fuzz_offset_min(
            &next.learner_id,
            &next.card_id,
            next.repetitions,
            next.interval_min,
        );
        next.due_at = now + Duration::minutes(next.interval_min + fuzz);
    }

    /// Signed due-date offset in minutes, at most `interval × fuzz_ratio`.
    ///
    /// Seeded from the pair identity and repetition count so the same review
    /// occurrence always lands on the same instant, while a cohort of cards
    /// reaching the same interval together spreads out instead of clustering.
    fn fuzz_offset_min(
        &self,
        learner_id: &str,
        card_id: &str,
        repetitions: u32,
        interval_min: i64,
    ) -> i64 {
        let ratio = self.config.fuzz_ratio.clamp(0.0, MAX_FUZZ_RATIO);
        let window = (interval_min as f64 * ratio).floor() as i64;
        if window == 0 {
            return 0;
        }
        let mut rng = Mcg128Xsl64::seed_from_u64(fuzz_seed(learner_id, card_id, repetitions));
        rng.gen_range(-window..=window)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn floor_ease(ease: f64, config: &SrsConfig) -> f64 {
    ease.max(config.min_ease)
}

fn scale_interval(interval_min: i64, factor: f64) -> i64 {
    (interval_min as f64 * factor).round() as i64
}

/// FNV-1a over the identifying inputs of one review occurrence.
fn fuzz_seed(learner_id: &str, card_id: &str, repetitions: u32) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in learner_id
        .as_bytes()
        .iter()
        .chain([0xffu8].iter())
        .chain(card_id.as_bytes())
        .chain(repetitions.to_le_bytes().iter())
    {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minute: i64) -> DateTime<Utc> {
        chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 1, 9, 0, 0).unwrap()
            + Duration::minutes(minute)
    }

    fn review_progress(interval_days: i64, ease: f64) -> CardProgress {
        let mut p = CardProgress::fresh("l1", "c1", 2.5, at(0));
        p.state = CardState::Review;
        p.interval_min = interval_days * DAY_MIN;
        p.ease = ease;
        p.due_at = at(0);
        p.repetitions = 3;
        p
    }

    #[test]
    fn good_on_six_day_interval_yields_fifteen_days() {
        let scheduler = Scheduler::new();
        let p = review_progress(6, 2.5);
        let next = scheduler.next_progress(&p, Rating::Good, at(0));
        assert_eq!(next.state, CardState::Review);
        assert_eq!(next.interval_min, 15 * DAY_MIN);
        assert_eq!(next.repetitions, 4);
    }

    #[test]
    fn again_resets_to_learning_minimum_and_applies_exact_penalty() {
        let scheduler = Scheduler::new();
        let p = review_progress(20, 2.5);
        let next = scheduler.next_progress(&p, Rating::Again, at(0));
        assert_eq!(next.state, CardState::Learning);
        assert_eq!(next.interval_min, scheduler.config().first_step_min());
        assert_eq!(next.ease, 2.5 - 0.2);
        assert_eq!(next.lapses, p.lapses + 1);
        assert_eq!(next.repetitions, 0);
        assert_eq!(next.due_at, at(0) + Duration::minutes(1));
    }

    #[test]
    fn ease_penalty_is_floored_at_min_ease() {
        let scheduler = Scheduler::new();
        let p = review_progress(10, 1.4);
        let next = scheduler.next_progress(&p, Rating::Again, at(0));
        assert_eq!(next.ease, 1.3);
    }

    #[test]
    fn again_good_good_graduates_with_two_reps_one_lapse() {
        let scheduler = Scheduler::new();
        let fresh = scheduler.fresh_progress("l1", "c1", at(0));

        let p1 = scheduler.next_progress(&fresh, Rating::Again, at(0));
        assert_eq!(p1.state, CardState::New);
        assert_eq!(p1.lapses, 1);
        assert_eq!(p1.learning_step, 0);

        let p2 = scheduler.next_progress(&p1, Rating::Good, at(1));
        assert_eq!(p2.state, CardState::Learning);
        assert_eq!(p2.learning_step, 1);
        assert_eq!(p2.interval_min, 10);

        let p3 = scheduler.next_progress(&p2, Rating::Good, at(11));
        assert_eq!(p3.state, CardState::Review);
        assert_eq!(p3.repetitions, 2);
        assert_eq!(p3.lapses, 1);
        assert_eq!(p3.interval_min, DAY_MIN);
    }

    #[test]
    fn easy_graduates_immediately_with_bonus() {
        let scheduler = Scheduler::new();
        let fresh = scheduler.fresh_progress("l1", "c1", at(0));
        let next = scheduler.next_progress(&fresh, Rating::Easy, at(0));
        assert_eq!(next.state, CardState::Review);
        assert_eq!(next.interval_min, (DAY_MIN as f64 * 1.3).round() as i64);
        assert_eq!(next.repetitions, 1);
    }

    #[test]
    fn hard_review_shrinks_interval_but_not_below_one_day() {
        let scheduler = Scheduler::new();
        let p = review_progress(10, 2.5);
        let next = scheduler.next_progress(&p, Rating::Hard, at(0));
        assert_eq!(next.state, CardState::Review);
        assert_eq!(next.interval_min, (10.0 * DAY_MIN as f64 * 0.8).round() as i64);
        assert_eq!(next.ease, 2.5 - 0.15);

        let short = review_progress(1, 2.5);
        let floored = scheduler.next_progress(&short, Rating::Hard, at(0));
        assert_eq!(floored.interval_min, DAY_MIN);
    }

    #[test]
    fn easy_review_grows_interval_and_ease() {
        let scheduler = Scheduler::new();
        let p = review_progress(10, 2.0);
        let next = scheduler.next_progress(&p, Rating::Easy, at(0));
        assert_eq!(next.interval_min, (10.0 * DAY_MIN as f64 * 2.0 * 1.3).round() as i64);
        assert_eq!(next.ease, 2.0 + 0.15);
    }

    #[test]
    fn good_growth_is_capped_at_max_interval() {
        let config = SrsConfig {
            max_interval_days: 30,
            ..SrsConfig::default()
        };
        let scheduler = Scheduler::with_config(config);
        let mut p = review_progress(20, 2.5);
        p.interval_min = 20 * DAY_MIN;
        let next = scheduler.next_progress(&p, Rating::Good, at(0));
        assert_eq!(next.interval_min, 30 * DAY_MIN);
        let after_cap = scheduler.next_progress(&next, Rating::Good, at(10));
        assert_eq!(after_cap.interval_min, 30 * DAY_MIN);
    }

    #[test]
    fn fuzz_is_deterministic_and_bounded() {
        let scheduler = Scheduler::new();
        let p = review_progress(30, 2.5);
        let a = scheduler.next_progress(&p, Rating::Good, at(0));
        let b = scheduler.next_progress(&p, Rating::Good, at(0));
        assert_eq!(a.due_at, b.due_at);

        let window = (a.interval_min as f64 * 0.05).floor() as i64;
        let nominal = at(0) + Duration::minutes(a.interval_min);
        let offset = (a.due_at - nominal).num_minutes();
        assert!(offset.abs() <= window, "offset {offset} beyond window {window}");
    }

    #[test]
    fn fuzz_differs_across_cards() {
        let scheduler = Scheduler::new();
        let mut p1 = review_progress(100, 2.5);
        let mut p2 = review_progress(100, 2.5);
        p1.card_id = "card-a".into();
        p2.card_id = "card-b".into();
        let a = scheduler.next_progress(&p1, Rating::Good, at(0));
        let b = scheduler.next_progress(&p2, Rating::Good, at(0));
        // Same interval, different spread points.
        assert_eq!(a.interval_min, b.interval_min);
        assert_ne!(a.due_at, b.due_at);
    }

    #[test]
    fn learning_steps_are_never_fuzzed() {
        let scheduler = Scheduler::new();
        let fresh = scheduler.fresh_progress("l1", "c1", at(0));
        let next = scheduler.next_progress(&fresh, Rating::Good, at(0));
        assert_eq!(next.due_at, at(0) + Duration::minutes(next.interval_min));
    }

    #[test]
    fn empty_step_ladder_degrades_to_one_minute() {
        let config = SrsConfig {
            learning_steps_min: vec![],
            ..SrsConfig::default()
        };
        assert_eq!(config.first_step_min(), 1);
        assert_eq!(config.graduation_threshold(), 1);
    }
}
