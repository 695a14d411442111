//! The persisted saga instance.

use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::{Deserialize, Serialize};

use crate::state::SagaState;

/// One tracked image retrieval.
///
/// Content fields (`last_retrieved`, `resolved_location`, `content_type`,
/// `content_length`) are present exactly when the saga is `Available`;
/// `fault_reason` is present exactly when it is `Faulted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSaga {
    pub(crate) correlation_id: CorrelationId,
    pub(crate) state: SagaState,
    pub(crate) resource_key: String,
    pub(crate) created: DateTime<Utc>,
    pub(crate) first_requested: DateTime<Utc>,
    pub(crate) last_retrieved: Option<DateTime<Utc>>,
    pub(crate) resolved_location: Option<String>,
    pub(crate) content_type: Option<String>,
    pub(crate) content_length: Option<u64>,
    pub(crate) fault_reason: Option<String>,
}

impl ImageSaga {
    /// Creates a `Pending` saga for `resource_key`.
    ///
    /// The resolved location stays unknown until the resource is retrieved.
    pub fn create(
        correlation_id: CorrelationId,
        resource_key: impl Into<String>,
        first_requested: DateTime<Utc>,
    ) -> Self {
        Self {
            correlation_id,
            state: SagaState::Pending,
            resource_key: resource_key.into(),
            created: Utc::now(),
            first_requested,
            last_retrieved: None,
            resolved_location: None,
            content_type: None,
            content_length: None,
            fault_reason: None,
        }
    }

    /// Moves the saga to `Available`, recording where the content now lives.
    pub fn record_retrieval(
        &mut self,
        resolved_location: impl Into<String>,
        content_type: impl Into<String>,
        content_length: u64,
        retrieved_at: DateTime<Utc>,
    ) {
        self.state = SagaState::Available;
        self.last_retrieved = Some(retrieved_at);
        self.resolved_location = Some(resolved_location.into());
        self.content_type = Some(content_type.into());
        self.content_length = Some(content_length);
    }

    /// Moves the saga to `Faulted`.
    pub fn record_fault(&mut self, reason: impl Into<String>) {
        self.state = SagaState::Faulted;
        self.fault_reason = Some(reason.into());
    }

    /// Checks the field/state invariants, returning the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if !self.state.is_persistable() {
            return Err(format!("state {} cannot be stored", self.state));
        }

        let available = self.state == SagaState::Available;
        let content = [
            self.last_retrieved.is_some(),
            self.resolved_location.is_some(),
            self.content_type.is_some(),
            self.content_length.is_some(),
        ];
        if content.iter().any(|present| *present != available) {
            return Err(format!(
                "content fields must be set exactly when Available (state {})",
                self.state
            ));
        }

        if self.fault_reason.is_some() != (self.state == SagaState::Faulted) {
            return Err(format!(
                "fault reason must be set exactly when Faulted (state {})",
                self.state
            ));
        }

        Ok(())
    }
}

// Query methods
impl ImageSaga {
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Returns the business key (source address) this saga tracks.
    pub fn resource_key(&self) -> &str {
        &self.resource_key
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn first_requested(&self) -> DateTime<Utc> {
        self.first_requested
    }

    pub fn last_retrieved(&self) -> Option<DateTime<Utc>> {
        self.last_retrieved
    }

    pub fn resolved_location(&self) -> Option<&str> {
        self.resolved_location.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn fault_reason(&self) -> Option<&str> {
        self.fault_reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> ImageSaga {
        ImageSaga::create(CorrelationId::new(), "res://a", Utc::now())
    }

    #[test]
    fn test_create_is_pending_without_content() {
        let saga = pending();
        assert_eq!(saga.state(), SagaState::Pending);
        assert_eq!(saga.resource_key(), "res://a");
        assert!(saga.resolved_location().is_none());
        assert!(saga.last_retrieved().is_none());
        assert!(saga.fault_reason().is_none());
        assert!(saga.validate().is_ok());
    }

    #[test]
    fn test_record_retrieval_sets_all_content_fields() {
        let mut saga = pending();
        let retrieved_at = Utc::now();
        saga.record_retrieval("cache://a.bin", "image/jpeg", 2048, retrieved_at);

        assert_eq!(saga.state(), SagaState::Available);
        assert_eq!(saga.resolved_location(), Some("cache://a.bin"));
        assert_eq!(saga.content_type(), Some("image/jpeg"));
        assert_eq!(saga.content_length(), Some(2048));
        assert_eq!(saga.last_retrieved(), Some(retrieved_at));
        assert!(saga.validate().is_ok());
    }

    #[test]
    fn test_record_fault_sets_reason() {
        let mut saga = pending();
        saga.record_fault("timeout");

        assert_eq!(saga.state(), SagaState::Faulted);
        assert_eq!(saga.fault_reason(), Some("timeout"));
        assert!(saga.resolved_location().is_none());
        assert!(saga.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_content_outside_available() {
        let mut saga = pending();
        saga.content_type = Some("image/png".to_string());
        assert!(saga.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_content_on_faulted() {
        let mut saga = pending();
        saga.record_retrieval("cache://a.bin", "image/jpeg", 1, Utc::now());
        saga.record_fault("late failure");
        assert!(saga.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_initial_state() {
        let mut saga = pending();
        saga.state = SagaState::Initial;
        assert!(saga.validate().is_err());
    }

    #[test]
    fn test_serializes_camel_case_with_absent_fields_as_null() {
        let saga = pending();
        let json = serde_json::to_value(&saga).unwrap();

        assert_eq!(json["state"], "Pending");
        assert_eq!(json["resourceKey"], "res://a");
        assert!(json["resolvedLocation"].is_null());
        assert!(json.get("resource_key").is_none());
    }
}
