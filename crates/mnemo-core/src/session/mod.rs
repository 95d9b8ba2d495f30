//! Study sessions: who studies, how much per day, and in what order.
//!
//! - `quota`: tiers, per-day limits, local-day counters
//! - `queue`: the three-band presentation ordering
//! - `builder`: assembles a day's queue from scope + progress + quota

pub mod builder;
pub mod queue;
pub mod quota;

pub use builder::{QueueCounts, ScopedCard, SessionBuilder, SessionConfig, StudySession};
pub use queue::{sort_for_presentation, QueueCategory, QueueEntry};
pub use quota::{local_day, DailyCounters, StudyTier, TierLimits, TierQuotas};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Westernmost civil offset in use (UTC-12:00).
const MIN_TZ_OFFSET_MIN: i32 = -720;
/// Easternmost civil offset in use (UTC+14:00).
const MAX_TZ_OFFSET_MIN: i32 = 840;

/// A study account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learner {
    pub id: String,
    pub name: String,
    pub tier: StudyTier,
    /// Minutes east of UTC; fixes where this learner's day boundary falls.
    pub tz_offset_min: i32,
    pub created_at: DateTime<Utc>,
}

impl Learner {
    pub fn new(name: impl Into<String>, tier: StudyTier, tz_offset_min: i32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            tier,
            tz_offset_min: tz_offset_min.clamp(MIN_TZ_OFFSET_MIN, MAX_TZ_OFFSET_MIN),
            created_at: Utc::now(),
        }
    }

    /// The local calendar day `now` falls on for this learner.
    pub fn local_day(&self, now: DateTime<Utc>) -> NaiveDate {
        local_day(now, self.tz_offset_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tz_offset_is_clamped_to_civil_range() {
        let east = Learner::new("a", StudyTier::Basic, 2000);
        assert_eq!(east.tz_offset_min, 840);
        let west = Learner::new("b", StudyTier::Basic, -2000);
        assert_eq!(west.tz_offset_min, -720);
    }
}
