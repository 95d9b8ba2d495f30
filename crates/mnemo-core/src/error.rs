//! Core error types for mnemo-core.
//!
//! One hierarchy covers every failure the engine can surface to a caller.
//! Two conditions are deliberately *not* errors: an exhausted daily quota is
//! a normal session outcome (`limit_reached`), and a stale deck-membership
//! snapshot is logged and repaired in place, never returned.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for mnemo-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rating outside the {again, hard, good, easy} domain.
    /// Rejected at the boundary; no state is mutated.
    #[error("Invalid rating '{0}': expected one of again, hard, good, easy")]
    InvalidRating(String),

    /// Tier name outside the {basic, plus, unlimited} domain.
    #[error("Invalid tier '{0}': expected one of basic, plus, unlimited")]
    InvalidTier(String),

    /// Reference to a card that does not exist.
    #[error("Unknown card: {0}")]
    UnknownCard(String),

    /// Reference to a learner that does not exist.
    #[error("Unknown learner: {0}")]
    UnknownLearner(String),

    /// Reference to a subject that does not exist.
    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    /// Reference to a deck that does not exist.
    #[error("Unknown deck: {0}")]
    UnknownDeck(String),

    /// Subject move that would place a subtree inside itself.
    #[error("Cannot move subject {subject_id} under {target_id}: target is inside the moved subtree")]
    InvalidMove {
        subject_id: String,
        target_id: String,
    },

    /// Session token does not match the learner's open session for today.
    #[error("Stale or unknown session token for learner {learner_id}")]
    StaleSession { learner_id: String },

    /// Two ratings raced for the same (learner, card) progress row and the
    /// retry also lost. Transient; the caller may resubmit.
    #[error("Concurrent rating conflict for learner {learner_id}, card {card_id}")]
    RatingConflict { learner_id: String, card_id: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Data directory could not be prepared
    #[error("Failed to prepare data directory: {0}")]
    DataDir(#[from] std::io::Error),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Configuration directory could not be prepared
    #[error("Failed to prepare configuration directory: {0}")]
    DirUnavailable(#[from] std::io::Error),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
