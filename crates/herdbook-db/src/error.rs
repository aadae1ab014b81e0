//! Database-specific error types and conversions.

use herdbook_core::error::{HerdError, InternalError};

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Transaction {operation} failed: {message}")]
    Transaction {
        operation: &'static str,
        message: String,
    },

    #[error("Transaction {operation} exceeded its deadline")]
    Timeout { operation: &'static str },

    #[error("No storage slot available for {operation}")]
    PoolExhausted { operation: &'static str },

    #[error("Malformed record: {0}")]
    Corrupt(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<DbError> for HerdError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => HerdError::NotFound { entity, id },
            DbError::Timeout { operation } => {
                tracing::warn!(operation, "unit of work timed out");
                HerdError::Internal(InternalError::Timeout)
            }
            DbError::PoolExhausted { operation } => {
                tracing::warn!(operation, "storage pool exhausted");
                HerdError::Internal(InternalError::PoolExhausted)
            }
            DbError::Corrupt(detail) => {
                tracing::error!(%detail, "malformed record in storage");
                HerdError::Internal(InternalError::Corrupt)
            }
            other => {
                tracing::error!(error = %other, "storage failure");
                HerdError::Internal(InternalError::Storage)
            }
        }
    }
}
