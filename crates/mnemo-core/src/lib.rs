//! # Mnemo Core Library
//!
//! This library provides the core engine for the Mnemo spaced-repetition
//! study service. It implements a CLI-first philosophy where every operation
//! is available via a standalone CLI binary, with any outer surface being a
//! thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Scheduler**: A pure retention-state machine; every rating maps old
//!   progress to new progress deterministically, fuzz included
//! - **Sessions**: Queue assembly over three bands (learning steps, due
//!   reviews, fresh cards) under per-tier daily quotas
//! - **Hierarchy**: Subject taxonomy on materialized paths, with a cached
//!   resolver for derived deck membership
//! - **Analytics**: Difficulty classification over the append-only rating log
//! - **Storage**: SQLite-based persistence and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`StudyService`]: The operation facade callers talk to
//! - [`Scheduler`]: Rating-to-schedule transition function
//! - [`SessionBuilder`]: Queue assembly from scope + progress + quota state
//! - [`DeckResolver`]: Cached subject-subtree membership
//! - [`ProblemAnalyzer`]: Problem-card scoring
//! - [`Database`]: Catalog, progress, and event persistence
//! - [`Config`]: Engine configuration management

pub mod analytics;
pub mod catalog;
pub mod error;
pub mod events;
pub mod hierarchy;
pub mod service;
pub mod session;
pub mod srs;
pub mod storage;

pub use analytics::{Classification, DifficultyBand, ProblemAnalyzer, ProblemScore};
pub use catalog::{CardTemplate, Deck, DeckSelector, Subject};
pub use error::{ConfigError, CoreError, DatabaseError, Result};
pub use events::RatingEvent;
pub use hierarchy::{DeckResolver, MembershipSnapshot};
pub use service::{CardSummary, DeckResolution, NextCards, RatingOutcome, StudyService};
pub use session::{
    Learner, QueueCategory, QueueCounts, QueueEntry, SessionBuilder, StudySession, StudyTier,
    TierLimits,
};
pub use srs::{CardProgress, CardState, Rating, Scheduler, SrsConfig};
pub use storage::{Config, Database, StudyStats};
