//! Spaced-repetition scheduling.
//!
//! The submodules split the concern in three:
//! - `rating`: the four-grade answer scale
//! - `progress`: per-(learner, card) retention state
//! - `scheduler`: the pure transition function between the two

pub mod progress;
pub mod rating;
pub mod scheduler;

pub use progress::{CardProgress, CardState};
pub use rating::Rating;
pub use scheduler::{Scheduler, SrsConfig};
