//! Daily study quotas.
//!
//! Quotas are tracked per learner per *local* calendar day. The learner's
//! fixed UTC offset decides where the day boundary falls, so a midnight
//! rollover in Tokyo does not reset counters for a learner in Lima.
//! Learning-step re-presentations are deliberately uncounted; only first
//! introductions and completed reviews consume quota.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::DeckSelector;
use crate::error::CoreError;

/// Subscription tier controlling daily study volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyTier {
    Basic,
    Plus,
    Unlimited,
}

impl StudyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyTier::Basic => "basic",
            StudyTier::Plus => "plus",
            StudyTier::Unlimited => "unlimited",
        }
    }
}

impl fmt::Display for StudyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudyTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(StudyTier::Basic),
            "plus" => Ok(StudyTier::Plus),
            "unlimited" => Ok(StudyTier::Unlimited),
            other => Err(CoreError::InvalidTier(other.to_string())),
        }
    }
}

/// Per-day ceilings for one tier. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub new_per_day: Option<u32>,
    pub reviews_per_day: Option<u32>,
}

impl TierLimits {
    pub const UNBOUNDED: TierLimits = TierLimits {
        new_per_day: None,
        reviews_per_day: None,
    };
}

/// The tier-to-limits table, overridable from config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierQuotas {
    #[serde(default = "default_basic")]
    pub basic: TierLimits,
    #[serde(default = "default_plus")]
    pub plus: TierLimits,
    #[serde(default = "default_unlimited")]
    pub unlimited: TierLimits,
}

fn default_basic() -> TierLimits {
    TierLimits {
        new_per_day: Some(20),
        reviews_per_day: Some(200),
    }
}

fn default_plus() -> TierLimits {
    TierLimits {
        new_per_day: Some(50),
        reviews_per_day: Some(500),
    }
}

fn default_unlimited() -> TierLimits {
    TierLimits::UNBOUNDED
}

impl Default for TierQuotas {
    fn default() -> Self {
        Self {
            basic: default_basic(),
            plus: default_plus(),
            unlimited: default_unlimited(),
        }
    }
}

impl TierQuotas {
    pub fn limits_for(&self, tier: StudyTier) -> TierLimits {
        match tier {
            StudyTier::Basic => self.basic,
            StudyTier::Plus => self.plus,
            StudyTier::Unlimited => self.unlimited,
        }
    }
}

/// The calendar day `now` falls on for a learner at the given UTC offset.
pub fn local_day(now: DateTime<Utc>, tz_offset_min: i32) -> NaiveDate {
    (now + Duration::minutes(i64::from(tz_offset_min))).date_naive()
}

/// Quota consumption for one learner on one local day.
///
/// Also carries the session token handed out for the day (so a rebuilt
/// queue keeps validating ratings from the session that issued them) and
/// the scope the session was opened over (so continuation can be decided
/// after each rating without the caller restating it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCounters {
    pub learner_id: String,
    pub day: NaiveDate,
    pub new_introduced: u32,
    pub reviews_completed: u32,
    pub session_token: Option<String>,
    pub selector: Option<DeckSelector>,
}

impl DailyCounters {
    /// Zeroed counters for a day with no activity yet.
    pub fn start(learner_id: &str, day: NaiveDate) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            day,
            new_introduced: 0,
            reviews_completed: 0,
            session_token: None,
            selector: None,
        }
    }

    /// How many fresh introductions remain, `None` if unbounded.
    pub fn new_remaining(&self, limits: &TierLimits) -> Option<u32> {
        limits
            .new_per_day
            .map(|cap| cap.saturating_sub(self.new_introduced))
    }

    /// How many reviews remain, `None` if unbounded.
    pub fn reviews_remaining(&self, limits: &TierLimits) -> Option<u32> {
        limits
            .reviews_per_day
            .map(|cap| cap.saturating_sub(self.reviews_completed))
    }

    pub fn can_introduce_new(&self, limits: &TierLimits) -> bool {
        self.new_remaining(limits) != Some(0)
    }

    pub fn can_review(&self, limits: &TierLimits) -> bool {
        self.reviews_remaining(limits) != Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_tier_table() {
        let quotas = TierQuotas::default();
        assert_eq!(quotas.limits_for(StudyTier::Basic).new_per_day, Some(20));
        assert_eq!(quotas.limits_for(StudyTier::Plus).reviews_per_day, Some(500));
        assert_eq!(quotas.limits_for(StudyTier::Unlimited).new_per_day, None);
    }

    #[test]
    fn tier_round_trips_through_str() {
        for tier in [StudyTier::Basic, StudyTier::Plus, StudyTier::Unlimited] {
            assert_eq!(tier.as_str().parse::<StudyTier>().unwrap(), tier);
        }
        assert!("gold".parse::<StudyTier>().is_err());
    }

    #[test]
    fn local_day_respects_utc_offset() {
        // 03:00 UTC is still the previous evening at UTC-5.
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap();
        assert_eq!(
            local_day(now, -300),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
        );
        assert_eq!(
            local_day(now, 0),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
        // 23:00 UTC is already the next morning at UTC+9.
        let evening = Utc.with_ymd_and_hms(2026, 3, 1, 23, 0, 0).unwrap();
        assert_eq!(
            local_day(evening, 540),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let limits = TierLimits {
            new_per_day: Some(5),
            reviews_per_day: Some(10),
        };
        let mut counters = DailyCounters::start("l1", NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        counters.new_introduced = 7;
        assert_eq!(counters.new_remaining(&limits), Some(0));
        assert!(!counters.can_introduce_new(&limits));
        assert!(counters.can_review(&limits));
        assert!(counters.can_introduce_new(&TierLimits::UNBOUNDED));
    }
}
