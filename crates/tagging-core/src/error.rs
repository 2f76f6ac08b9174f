//! Error types for the tagging engine.

use thiserror::Error;

/// Result type alias using the tagging engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tagging operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A tag name failed the name grammar or the length limit
    #[error("Invalid tag name: {0}")]
    InvalidName(String),

    /// Unrecognized font size distribution for tag clouds
    #[error("Invalid font size distribution algorithm specified: {0}")]
    InvalidDistribution(String),

    /// The entity kind has not been registered with the engine
    #[error("Unknown model kind: {0}")]
    UnknownModelKind(String),

    /// The entity kind was registered twice
    #[error("The model kind {0} has already been registered with tagging")]
    AlreadyRegistered(String),

    /// Resource required by the operation does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Concurrent writers kept colliding on a unique constraint
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
