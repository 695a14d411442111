//! Message contracts for the image retrieval saga.
//!
//! These shapes are the wire-level contract shared with requesters and the
//! retrieval worker. Field names are serialized in camelCase and must stay
//! stable.
//!
//! - [`InboundMessage`]: requests and retrieval results delivered to the saga
//! - [`OutboundMessage`]: notifications the saga publishes
//! - [`RetrieveImage`]: the command issued once per resource when a saga is created

pub mod command;
pub mod inbound;
pub mod message;
pub mod outbound;

pub use command::RetrieveImage;
pub use inbound::{
    ImageNotFound, ImageRetrievalFailed, ImageRetrieved, InboundKind, InboundMessage, RequestImage,
};
pub use message::Message;
pub use outbound::{ImageRequestCompleted, ImageRequestFaulted, ImageRequested, OutboundMessage};
