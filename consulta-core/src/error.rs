//! Error types for consulta-core

use thiserror::Error;

/// Main error type for the consulta-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid input; nothing was constructed or changed
    #[error("validation error: {0}")]
    Validation(String),

    /// A lifecycle method was called from a status that does not allow it
    #[error("invalid transition: cannot {action} {entity} in status {from}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        action: &'static str,
    },

    /// The operation is valid in general but not in the current lifecycle phase
    #[error("invalid state: cannot {operation} while {entity} is {status}")]
    InvalidState {
        entity: &'static str,
        status: String,
        operation: &'static str,
    },

    /// Referenced id is not present
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The stored snapshot moved on since this copy was loaded
    #[error("conflict: {entity} {id} was changed by another writer")]
    Conflict { entity: &'static str, id: String },

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Document generator error
    #[error("generator error: {0}")]
    Generator(String),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for consulta-core
pub type Result<T> = std::result::Result<T, Error>;
