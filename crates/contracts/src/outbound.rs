//! Outbound notifications published by the saga.

use chrono::{DateTime, Utc};
use common::{EventId, RequestId};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Messages the saga emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutboundMessage {
    /// A request for the resource was accepted.
    ImageRequested(ImageRequested),

    /// The resource is available in the local cache.
    ImageRequestCompleted(ImageRequestCompleted),

    /// Retrieval of the resource failed permanently.
    ImageRequestFaulted(ImageRequestFaulted),
}

impl OutboundMessage {
    /// Returns the source address the message refers to.
    pub fn source_address(&self) -> &str {
        match self {
            OutboundMessage::ImageRequested(m) => &m.source_address,
            OutboundMessage::ImageRequestCompleted(m) => &m.source_address,
            OutboundMessage::ImageRequestFaulted(m) => &m.source_address,
        }
    }
}

impl Message for OutboundMessage {
    fn message_type(&self) -> &'static str {
        match self {
            OutboundMessage::ImageRequested(_) => "ImageRequested",
            OutboundMessage::ImageRequestCompleted(_) => "ImageRequestCompleted",
            OutboundMessage::ImageRequestFaulted(_) => "ImageRequestFaulted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequested {
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
    pub originating_request_id: RequestId,
    pub source_address: String,
}

impl ImageRequested {
    /// Creates an announcement for the given request.
    pub fn new(originating_request_id: RequestId, source_address: impl Into<String>) -> Self {
        Self {
            event_id: EventId::new(),
            timestamp: Utc::now(),
            originating_request_id,
            source_address: source_address.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequestCompleted {
    pub content_length: u64,
    pub content_type: String,
    pub local_address: String,
    pub source_address: String,
    pub retrieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequestFaulted {
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
    pub source_address: String,
    pub reason: String,
}

impl ImageRequestFaulted {
    pub fn new(source_address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            event_id: EventId::new(),
            timestamp: Utc::now(),
            source_address: source_address.into(),
            reason: reason.into(),
        }
    }
}

impl From<ImageRequested> for OutboundMessage {
    fn from(m: ImageRequested) -> Self {
        OutboundMessage::ImageRequested(m)
    }
}

impl From<ImageRequestCompleted> for OutboundMessage {
    fn from(m: ImageRequestCompleted) -> Self {
        OutboundMessage::ImageRequestCompleted(m)
    }
}

impl From<ImageRequestFaulted> for OutboundMessage {
    fn from(m: ImageRequestFaulted) -> Self {
        OutboundMessage::ImageRequestFaulted(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type() {
        let requested: OutboundMessage = ImageRequested::new(RequestId::new(), "res://a").into();
        let faulted: OutboundMessage = ImageRequestFaulted::new("res://a", "timeout").into();

        assert_eq!(requested.message_type(), "ImageRequested");
        assert_eq!(faulted.message_type(), "ImageRequestFaulted");
        assert_eq!(faulted.source_address(), "res://a");
    }

    #[test]
    fn test_image_requested_wire_fields() {
        let request_id = RequestId::new();
        let message: OutboundMessage = ImageRequested::new(request_id, "res://a").into();
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["type"], "ImageRequested");
        assert_eq!(
            json["data"]["originatingRequestId"],
            request_id.to_string().as_str()
        );
        assert!(json["data"]["eventId"].is_string());
        assert!(json["data"]["timestamp"].is_string());
    }

    #[test]
    fn test_completed_wire_fields() {
        let completed = ImageRequestCompleted {
            content_length: 2048,
            content_type: "image/jpeg".to_string(),
            local_address: "cache://a.bin".to_string(),
            source_address: "res://a".to_string(),
            retrieved_at: Utc::now(),
        };
        let json = serde_json::to_value(&completed).unwrap();

        assert_eq!(json["contentLength"], 2048);
        assert_eq!(json["localAddress"], "cache://a.bin");
        assert!(json["retrievedAt"].is_string());
    }
}
