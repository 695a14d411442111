//! Saga error types.

use common::CorrelationId;
use saga_store::{RepositoryError, SagaState};
use thiserror::Error;

use crate::machine::Action;

/// Errors raised by an activity invoked during saga creation.
#[derive(Debug, Error)]
pub enum ActivityError {
    /// The activity ran and reported a failure.
    #[error("Activity '{activity}' failed: {reason}")]
    Failed {
        activity: &'static str,
        reason: String,
    },

    /// The retrieval command queue is no longer accepting commands.
    #[error("Retrieval queue closed")]
    QueueClosed,
}

/// Errors that can occur while handling an inbound message.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A non-creating message matched no saga. No saga was created.
    #[error("No saga for {message_type} on resource {resource_key}")]
    CorrelationMiss {
        message_type: &'static str,
        resource_key: String,
    },

    /// The saga's current state has no transition for the message.
    #[error("Saga {correlation_id} in state {state} does not handle {message_type}")]
    UnhandledEvent {
        state: SagaState,
        message_type: &'static str,
        correlation_id: CorrelationId,
    },

    /// A transition rule's action cannot be applied to the message or state
    /// it was registered for.
    #[error("Rule {action:?} cannot apply {message_type} in state {state}")]
    InvalidRule {
        action: Action,
        state: SagaState,
        message_type: &'static str,
    },

    /// The creation activity failed; nothing was persisted.
    #[error("Activity error: {0}")]
    Activity(#[from] ActivityError),

    /// Acquiring, persisting or releasing the saga failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Publishing an outbound message failed after the transition was persisted.
    #[error("Publish error: {0}")]
    Publish(String),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
