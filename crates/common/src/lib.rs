//! Shared identifier types.

pub mod types;

pub use types::{CorrelationId, EventId, RequestId};
