//! Common trait for message contracts.

use serde::{Serialize, de::DeserializeOwned};

/// A message exchanged over the bus.
///
/// Messages are immutable facts or instructions; the type name is used for
/// routing and observability.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the message type name.
    fn message_type(&self) -> &'static str;
}
