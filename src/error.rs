//! Error types for the cassette lifecycle core.
//!
//! Every operation returns [`CassetteError`]. Transition failures are raised
//! while planning, before anything is written, so an `Err` always means the
//! unit of work was dropped without commit.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CassetteError {
    /// The requested status edge is not in the entity's adjacency table.
    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// The cassette tracker does not accept `event` from the cassette's current status.
    #[error("Cassette {cassette_id} in status {status} does not accept event {event}")]
    IllegalCassetteTransition {
        cassette_id: Uuid,
        status: String,
        event: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Action {action} is not permitted for this actor")]
    Forbidden { action: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CassetteError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short machine-readable kind, used in logs and HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::IllegalCassetteTransition { .. } => "ILLEGAL_CASSETTE_TRANSITION",
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::PreconditionFailed(_) => "PRECONDITION_FAILED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client errors are the caller's fault and are logged at `warn`
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Configuration(_) | Self::Internal(_)
        )
    }
}

impl From<sqlx::Error> for CassetteError {
    fn from(err: sqlx::Error) -> Self {
        CassetteError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for CassetteError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CassetteError::Database(format!("Migration failed: {err}"))
    }
}

impl From<serde_json::Error> for CassetteError {
    fn from(err: serde_json::Error) -> Self {
        CassetteError::Internal(format!("JSON serialization error: {err}"))
    }
}

impl From<::config::ConfigError> for CassetteError {
    fn from(err: ::config::ConfigError) -> Self {
        CassetteError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CassetteError>;
