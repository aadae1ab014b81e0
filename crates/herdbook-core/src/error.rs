//! Error types for the Herdbook system.

use serde::Serialize;
use thiserror::Error;

/// Machine-readable error category returned alongside every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Internal,
}

/// Infrastructure failure classes. The underlying storage message is
/// logged where the failure is converted and never carried further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("storage operation failed")]
    Storage,

    #[error("unit of work timed out")]
    Timeout,

    #[error("storage pool exhausted")]
    PoolExhausted,

    #[error("stored record is malformed")]
    Corrupt,
}

#[derive(Debug, Error)]
pub enum HerdError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Internal error: {0}")]
    Internal(InternalError),
}

impl HerdError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type HerdResult<T> = Result<T, HerdError>;
