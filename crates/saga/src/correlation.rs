//! Routing inbound messages to saga instances.

use common::CorrelationId;
use contracts::InboundMessage;
use saga_store::{ImageSaga, SagaLookup};

/// Decides whether a stored saga owns a message.
pub type CorrelationPredicate = fn(&ImageSaga, &InboundMessage) -> bool;

/// Default predicate: the saga's resource key equals the message's source address.
pub fn by_resource_key(saga: &ImageSaga, message: &InboundMessage) -> bool {
    saga.resource_key() == message.source_address()
}

/// Outcome of correlating a message with what the repository holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    /// The message belongs to this saga.
    Existing(&'a ImageSaga),
    /// No saga exists and the message may create one with this id.
    Create(CorrelationId),
    /// No saga owns the message and it cannot create one.
    Orphaned,
}

/// Maps inbound messages to the saga they belong to.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationResolver {
    predicate: CorrelationPredicate,
}

impl Default for CorrelationResolver {
    fn default() -> Self {
        Self::new(by_resource_key)
    }
}

impl CorrelationResolver {
    pub fn new(predicate: CorrelationPredicate) -> Self {
        Self { predicate }
    }

    /// Returns the repository lookup for a message: its business key.
    pub fn lookup(&self, message: &InboundMessage) -> SagaLookup {
        SagaLookup::resource_key(message.source_address())
    }

    /// Correlates `message` with `stored`, the saga found under its lookup.
    ///
    /// Only `RequestImage` may create a saga; its correlation id is derived
    /// from the request id.
    pub fn resolve<'a>(
        &self,
        message: &InboundMessage,
        stored: Option<&'a ImageSaga>,
    ) -> Resolution<'a> {
        match stored {
            Some(saga) if (self.predicate)(saga, message) => Resolution::Existing(saga),
            Some(_) => Resolution::Orphaned,
            None => match message {
                InboundMessage::RequestImage(request) => {
                    Resolution::Create(CorrelationId::from(request.request_id))
                }
                _ => Resolution::Orphaned,
            },
        }
    }
}
