use common::CorrelationId;
use thiserror::Error;

/// Errors that can occur when interacting with a saga repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Another saga already owns the resource key.
    #[error("Resource {resource_key} is already tracked by saga {existing}")]
    DuplicateResourceKey {
        resource_key: String,
        existing: CorrelationId,
    },

    /// The saga's correlation id is already taken by a saga for another
    /// resource.
    #[error("Correlation id {correlation_id} already belongs to resource {resource_key}")]
    CorrelationIdInUse {
        correlation_id: CorrelationId,
        resource_key: String,
    },

    /// The saga being persisted is not the one the handle was acquired for.
    #[error("Handle acquired for {expected} cannot persist saga {actual}")]
    CorrelationMismatch { expected: String, actual: String },

    /// Persist was called on a handle that holds no exclusive lease.
    #[error("Handle for {0} holds no exclusive lease")]
    NotLocked(String),

    /// The backing store is unreachable or rejected the write.
    #[error("Saga store unavailable: {0}")]
    Unavailable(String),

    /// A stored record violates the saga invariants.
    #[error("Corrupt saga record {correlation_id}: {reason}")]
    Corrupt {
        correlation_id: CorrelationId,
        reason: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
