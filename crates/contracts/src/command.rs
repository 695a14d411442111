//! Commands sent to the retrieval worker.

use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Instructs the retrieval worker to fetch the resource at `source_address`.
///
/// Issued once per resource, when its saga is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveImage {
    pub correlation_id: CorrelationId,
    pub source_address: String,
    pub timestamp: DateTime<Utc>,
}

impl RetrieveImage {
    pub fn new(correlation_id: CorrelationId, source_address: impl Into<String>) -> Self {
        Self {
            correlation_id,
            source_address: source_address.into(),
            timestamp: Utc::now(),
        }
    }
}

impl Message for RetrieveImage {
    fn message_type(&self) -> &'static str {
        "RetrieveImage"
    }
}
