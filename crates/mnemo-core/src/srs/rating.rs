//! The four-value rating domain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A learner's answer quality for one review, ordered by strength.
///
/// `Again` means the material was forgotten; everything else is a success
/// of increasing confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    /// All ratings, weakest first.
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Anything but `Again` counts as a successful recall.
    pub fn is_success(self) -> bool {
        self != Rating::Again
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = CoreError;

    /// Boundary parser; anything outside the four-value domain is rejected
    /// before any state is touched.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" => Ok(Rating::Again),
            "hard" => Ok(Rating::Hard),
            "good" => Ok(Rating::Good),
            "easy" => Ok(Rating::Easy),
            other => Err(CoreError::InvalidRating(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_by_strength() {
        assert!(Rating::Again < Rating::Hard);
        assert!(Rating::Hard < Rating::Good);
        assert!(Rating::Good < Rating::Easy);
    }

    #[test]
    fn parses_known_ratings() {
        for r in Rating::ALL {
            assert_eq!(r.as_str().parse::<Rating>().unwrap(), r);
        }
        assert_eq!(" Good ".parse::<Rating>().unwrap(), Rating::Good);
    }

    #[test]
    fn rejects_unknown_rating() {
        let err = "brilliant".parse::<Rating>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidRating(_)));
    }

    #[test]
    fn only_again_is_a_failure() {
        assert!(!Rating::Again.is_success());
        assert!(Rating::Hard.is_success());
        assert!(Rating::Good.is_success());
        assert!(Rating::Easy.is_success());
    }
}
