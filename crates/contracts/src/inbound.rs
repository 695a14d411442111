//! Inbound messages delivered to the saga.

use chrono::{DateTime, Utc};
use common::RequestId;
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Discriminant of an inbound message, used as the event column of the
/// transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InboundKind {
    RequestImage,
    ImageRetrieved,
    ImageRetrievalFailed,
    ImageNotFound,
}

impl InboundKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundKind::RequestImage => "RequestImage",
            InboundKind::ImageRetrieved => "ImageRetrieved",
            InboundKind::ImageRetrievalFailed => "ImageRetrievalFailed",
            InboundKind::ImageNotFound => "ImageNotFound",
        }
    }
}

impl std::fmt::Display for InboundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Messages the saga consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InboundMessage {
    /// A requester wants the image at `source_address`.
    RequestImage(RequestImage),

    /// The retrieval worker stored the image locally.
    ImageRetrieved(ImageRetrieved),

    /// The retrieval worker gave up.
    ImageRetrievalFailed(ImageRetrievalFailed),

    /// The source reported the image does not exist.
    ImageNotFound(ImageNotFound),
}

impl InboundMessage {
    /// Returns the discriminant of this message.
    pub fn kind(&self) -> InboundKind {
        match self {
            InboundMessage::RequestImage(_) => InboundKind::RequestImage,
            InboundMessage::ImageRetrieved(_) => InboundKind::ImageRetrieved,
            InboundMessage::ImageRetrievalFailed(_) => InboundKind::ImageRetrievalFailed,
            InboundMessage::ImageNotFound(_) => InboundKind::ImageNotFound,
        }
    }

    /// Returns the business key this message refers to.
    pub fn source_address(&self) -> &str {
        match self {
            InboundMessage::RequestImage(m) => &m.source_address,
            InboundMessage::ImageRetrieved(m) => &m.source_address,
            InboundMessage::ImageRetrievalFailed(m) => &m.source_address,
            InboundMessage::ImageNotFound(m) => &m.source_address,
        }
    }

    /// Returns when the message was produced.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            InboundMessage::RequestImage(m) => m.timestamp,
            InboundMessage::ImageRetrieved(m) => m.timestamp,
            InboundMessage::ImageRetrievalFailed(m) => m.timestamp,
            InboundMessage::ImageNotFound(m) => m.timestamp,
        }
    }
}

impl Message for InboundMessage {
    fn message_type(&self) -> &'static str {
        self.kind().as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestImage {
    pub request_id: RequestId,
    pub source_address: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestImage {
    /// Creates a request with a fresh request id stamped now.
    pub fn new(source_address: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            source_address: source_address.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRetrieved {
    pub source_address: String,
    pub local_address: String,
    pub content_type: String,
    pub content_length: u64,
    pub timestamp: DateTime<Utc>,
}

impl ImageRetrieved {
    pub fn new(
        source_address: impl Into<String>,
        local_address: impl Into<String>,
        content_type: impl Into<String>,
        content_length: u64,
    ) -> Self {
        Self {
            source_address: source_address.into(),
            local_address: local_address.into(),
            content_type: content_type.into(),
            content_length,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRetrievalFailed {
    pub source_address: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl ImageRetrievalFailed {
    pub fn new(source_address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Declared by the retrieval worker but not wired to any saga transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageNotFound {
    pub source_address: String,
    pub timestamp: DateTime<Utc>,
}

impl ImageNotFound {
    pub fn new(source_address: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            timestamp: Utc::now(),
        }
    }
}

impl From<RequestImage> for InboundMessage {
    fn from(m: RequestImage) -> Self {
        InboundMessage::RequestImage(m)
    }
}

impl From<ImageRetrieved> for InboundMessage {
    fn from(m: ImageRetrieved) -> Self {
        InboundMessage::ImageRetrieved(m)
    }
}

impl From<ImageRetrievalFailed> for InboundMessage {
    fn from(m: ImageRetrievalFailed) -> Self {
        InboundMessage::ImageRetrievalFailed(m)
    }
}

impl From<ImageNotFound> for InboundMessage {
    fn from(m: ImageNotFound) -> Self {
        InboundMessage::ImageNotFound(m)
    }
}
