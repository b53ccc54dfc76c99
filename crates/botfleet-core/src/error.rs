//! Fleet-wide error model.

use thiserror::Error;

/// Result type used across BotFleet crates.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Top-level error for the fleet engine.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Storage failure (SQLite open, statement, transaction).
    #[error("store error: {0}")]
    Store(String),

    /// Configuration load/parse/save failure.
    #[error("config error: {0}")]
    Config(String),

    /// The external generation pipeline failed or timed out.
    #[error("generation error: {0}")]
    Generation(String),

    /// The moderation collaborator failed (not a rejection — a failure).
    #[error("moderation error: {0}")]
    Moderation(String),

    /// A job payload did not match the shape its handler expects.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A job referenced an agent that does not exist.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// A stored value could not be parsed back (corrupt row, bad enum tag).
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FleetError {
    pub fn store(e: impl std::fmt::Display) -> Self {
        Self::Store(e.to_string())
    }
}
