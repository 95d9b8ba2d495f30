//! Curation analytics over the rating-event log.
//!
//! `ProblemAnalyzer` folds a window of rating events into one
//! [`ProblemScore`] per card, answering the curator's question "which
//! cards are badly authored?". Two distinct smells are separated:
//!
//! - `hard`: everyone fails it (high lapse rate)
//! - `variable`: some learners consistently fail it while others never do,
//!   which points at ambiguity rather than difficulty
//!
//! Thresholds live in [`AnalyticsConfig`] so curation policy can move
//! without a code change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::events::RatingEvent;
use crate::srs::{CardState, Rating};

/// Classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Lapse rate at or above which a card counts as hard.
    #[serde(default = "default_high_lapse")]
    pub high_lapse_threshold: f64,
    /// Per-learner success-rate spread beyond which a card counts as
    /// variable.
    #[serde(default = "default_variability")]
    pub variability_threshold: f64,
    /// Spread over fewer learners than this is noise, not signal.
    #[serde(default = "default_min_learners")]
    pub min_learners_for_variability: usize,
}

fn default_high_lapse() -> f64 {
    0.4
}
fn default_variability() -> f64 {
    0.25
}
fn default_min_learners() -> usize {
    3
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            high_lapse_threshold: default_high_lapse(),
            variability_threshold: default_variability(),
            min_learners_for_variability: default_min_learners(),
        }
    }
}

/// Why a card was flagged. Checked in order: hard wins over variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Optimal,
    Hard,
    Variable,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Optimal => "optimal",
            Classification::Hard => "hard",
            Classification::Variable => "variable",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse difficulty band for list displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyBand {
    Low,
    Medium,
    High,
}

impl DifficultyBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyBand::Low => "low",
            DifficultyBand::Medium => "medium",
            DifficultyBand::High => "high",
        }
    }
}

impl fmt::Display for DifficultyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate difficulty signal for one card over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemScore {
    pub card_id: String,
    pub total_ratings: usize,
    pub distinct_learners: usize,
    /// Fraction of ratings that were `again`.
    pub lapse_rate: f64,
    /// Mean ease movement across review-state transitions; 0 when the
    /// card saw none.
    pub avg_ease_drift: f64,
    /// Population standard deviation of per-learner success rates.
    pub success_stddev: f64,
    pub classification: Classification,
    pub difficulty: DifficultyBand,
}

#[derive(Default)]
struct CardAccumulator {
    total: usize,
    agains: usize,
    drift_sum: f64,
    drift_count: usize,
    /// learner id -> (successes, answers)
    per_learner: HashMap<String, (u32, u32)>,
}

impl CardAccumulator {
    fn add(&mut self, event: &RatingEvent) {
        self.total += 1;
        if event.rating == Rating::Again {
            self.agains += 1;
        }
        if event.state_before == CardState::Review {
            self.drift_sum += event.ease_drift();
            self.drift_count += 1;
        }
        let entry = self
            .per_learner
            .entry(event.learner_id.clone())
            .or_insert((0, 0));
        if event.is_success() {
            entry.0 += 1;
        }
        entry.1 += 1;
    }
}

/// Computes problem scores from rating events.
pub struct ProblemAnalyzer {
    config: AnalyticsConfig,
}

impl ProblemAnalyzer {
    pub fn new() -> Self {
        Self {
            config: AnalyticsConfig::default(),
        }
    }

    pub fn with_config(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Fold a window of events into per-card scores.
    ///
    /// The caller picks the window (the event query is theirs); cards with
    /// no events in the window simply do not appear.
    pub fn compute<'a, I>(&self, events: I) -> HashMap<String, ProblemScore>
    where
        I: IntoIterator<Item = &'a RatingEvent>,
    {
        let mut by_card: HashMap<String, CardAccumulator> = HashMap::new();
        for event in events {
            by_card
                .entry(event.card_id.clone())
                .or_default()
                .add(event);
        }

        by_card
            .into_iter()
            .map(|(card_id, acc)| {
                let score = self.score(card_id.clone(), &acc);
                (card_id, score)
            })
            .collect()
    }

    fn score(&self, card_id: String, acc: &CardAccumulator) -> ProblemScore {
        let lapse_rate = if acc.total == 0 {
            0.0
        } else {
            acc.agains as f64 / acc.total as f64
        };
        let avg_ease_drift = if acc.drift_count == 0 {
            0.0
        } else {
            acc.drift_sum / acc.drift_count as f64
        };
        let success_stddev = success_rate_stddev(&acc.per_learner);
        let distinct_learners = acc.per_learner.len();

        let classification = if lapse_rate >= self.config.high_lapse_threshold {
            Classification::Hard
        } else if distinct_learners >= self.config.min_learners_for_variability
            && success_stddev > self.config.variability_threshold
        {
            Classification::Variable
        } else {
            Classification::Optimal
        };

        let difficulty = if lapse_rate >= self.config.high_lapse_threshold {
            DifficultyBand::High
        } else if lapse_rate >= self.config.high_lapse_threshold / 2.0 {
            DifficultyBand::Medium
        } else {
            DifficultyBand::Low
        };

        ProblemScore {
            card_id,
            total_ratings: acc.total,
            distinct_learners,
            lapse_rate,
            avg_ease_drift,
            success_stddev,
            classification,
            difficulty,
        }
    }
}

impl Default for ProblemAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn success_rate_stddev(per_learner: &HashMap<String, (u32, u32)>) -> f64 {
    let rates: Vec<f64> = per_learner
        .values()
        .filter(|(_, answers)| *answers > 0)
        .map(|(successes, answers)| f64::from(*successes) / f64::from(*answers))
        .collect();
    if rates.is_empty() {
        return 0.0;
    }
    let mean = rates.iter().sum::<f64>() / rates.len() as f64;
    let variance = rates
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / rates.len() as f64;
    variance.sqrt()
}
