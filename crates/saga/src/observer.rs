//! Observability hooks called by the engine.
//!
//! The engine never logs directly; it reports to an injected
//! [`SagaObserver`]. Calls are synchronous and must not block.

use std::sync::{Arc, Mutex, PoisonError};

use common::CorrelationId;
use saga_store::SagaState;

use crate::error::SagaError;
use crate::machine::Action;

/// A successfully applied transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub correlation_id: CorrelationId,
    pub resource_key: String,
    pub message_type: &'static str,
    pub action: Action,
    pub from: SagaState,
    pub to: SagaState,
}

pub trait SagaObserver: Send + Sync {
    fn transitioned(&self, record: &TransitionRecord);

    /// A non-creating message found no saga.
    fn correlation_missed(&self, message_type: &'static str, resource_key: &str);

    /// A saga received a message its state does not handle.
    fn unhandled(
        &self,
        state: SagaState,
        correlation_id: CorrelationId,
        message_type: &'static str,
        resource_key: &str,
    );

    /// Handling failed with an activity, repository or rule error.
    fn failed(&self, message_type: &'static str, resource_key: &str, error: &SagaError);
}

/// Reports through `tracing` events and `metrics` counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SagaObserver for TracingObserver {
    fn transitioned(&self, record: &TransitionRecord) {
        metrics::counter!(
            "saga_transitions_total",
            "from" => record.from.as_str(),
            "to" => record.to.as_str()
        )
        .increment(1);
        tracing::info!(
            state = %record.to,
            from = %record.from,
            correlation_id = %record.correlation_id,
            resource_key = %record.resource_key,
            message_type = record.message_type,
            action = ?record.action,
            "saga transition"
        );
    }

    fn correlation_missed(&self, message_type: &'static str, resource_key: &str) {
        metrics::counter!("saga_correlation_misses_total", "message_type" => message_type)
            .increment(1);
        tracing::warn!(
            message_type,
            resource_key,
            "message matched no saga, dropping"
        );
    }

    fn unhandled(
        &self,
        state: SagaState,
        correlation_id: CorrelationId,
        message_type: &'static str,
        resource_key: &str,
    ) {
        metrics::counter!(
            "saga_unhandled_events_total",
            "state" => state.as_str(),
            "message_type" => message_type
        )
        .increment(1);
        tracing::warn!(
            %state,
            %correlation_id,
            resource_key,
            message_type,
            "saga state has no transition for message"
        );
    }

    fn failed(&self, message_type: &'static str, resource_key: &str, error: &SagaError) {
        if matches!(error, SagaError::Activity(_)) {
            metrics::counter!("saga_activity_failures_total").increment(1);
        }
        tracing::error!(message_type, resource_key, error = %error, "saga transition failed");
    }
}

/// What a [`RecordingObserver`] saw.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Transitioned(TransitionRecord),
    CorrelationMissed {
        message_type: &'static str,
        resource_key: String,
    },
    Unhandled {
        state: SagaState,
        correlation_id: CorrelationId,
        message_type: &'static str,
    },
    Failed {
        message_type: &'static str,
        error: String,
    },
}

/// Keeps every observation in memory for testing.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    observations: Arc<Mutex<Vec<Observation>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, observation: Observation) {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observation);
    }
}

impl SagaObserver for RecordingObserver {
    fn transitioned(&self, record: &TransitionRecord) {
        self.record(Observation::Transitioned(record.clone()));
    }

    fn correlation_missed(&self, message_type: &'static str, resource_key: &str) {
        self.record(Observation::CorrelationMissed {
            message_type,
            resource_key: resource_key.to_string(),
        });
    }

    fn unhandled(
        &self,
        state: SagaState,
        correlation_id: CorrelationId,
        message_type: &'static str,
        _resource_key: &str,
    ) {
        self.record(Observation::Unhandled {
            state,
            correlation_id,
            message_type,
        });
    }

    fn failed(&self, message_type: &'static str, _resource_key: &str, error: &SagaError) {
        self.record(Observation::Failed {
            message_type,
            error: error.to_string(),
        });
    }
}
