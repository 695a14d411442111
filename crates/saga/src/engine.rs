//! The saga state machine engine.

use std::sync::Arc;

use common::CorrelationId;
use contracts::{
    ImageRequestCompleted, ImageRequestFaulted, ImageRequested, InboundMessage, Message,
    OutboundMessage,
};
use saga_store::{
    ImageSaga, RepositoryError, SagaHandle, SagaLookup, SagaRepository, SagaState,
};
use serde::Serialize;

use crate::activity::ActivityStrategy;
use crate::correlation::{CorrelationResolver, Resolution};
use crate::error::{Result, SagaError};
use crate::machine::{Action, TransitionRule, TransitionTable};
use crate::observer::{SagaObserver, TracingObserver, TransitionRecord};
use crate::publisher::Publisher;

/// The result of handling one inbound message.
///
/// `publish` lists the messages to publish, in order; `response` is the
/// direct answer to a requester, present only on a cache hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub correlation_id: CorrelationId,
    pub action: Action,
    pub from: SagaState,
    pub to: SagaState,
    pub response: Option<ImageRequestCompleted>,
    pub publish: Vec<OutboundMessage>,
}

/// Drives image sagas through their transition table.
///
/// For each message the engine acquires the saga from the repository,
/// applies the matching rule, persists the new state and releases the
/// saga. It holds no locks of its own; the repository serializes work on
/// one resource. Outbound messages are only returned once the new state is
/// stored.
pub struct SagaEngine<R, A>
where
    R: SagaRepository,
    A: ActivityStrategy,
{
    repository: R,
    activities: A,
    resolver: CorrelationResolver,
    table: TransitionTable,
    observer: Arc<dyn SagaObserver>,
}

impl<R, A> SagaEngine<R, A>
where
    R: SagaRepository,
    A: ActivityStrategy,
{
    /// Creates an engine with the standard table, resource-key correlation
    /// and tracing observer.
    pub fn new(repository: R, activities: A) -> Self {
        Self {
            repository,
            activities,
            resolver: CorrelationResolver::default(),
            table: TransitionTable::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SagaObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_resolver(mut self, resolver: CorrelationResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn activities(&self) -> &A {
        &self.activities
    }

    /// Handles one inbound message and returns the resulting transition.
    ///
    /// The saga is always released, whatever the outcome. A failure to
    /// release after a successful transition is logged, not returned: the
    /// new state is already stored.
    ///
    /// On creation the activity runs before the new saga is persisted. If
    /// the persist then fails, the `RetrieveImage` command has already gone
    /// out while no saga is stored, so redelivering the request issues a
    /// second command. Consumers of the retrieval queue must tolerate
    /// duplicates.
    #[tracing::instrument(
        skip(self, message),
        fields(message_type = message.message_type(), resource_key = message.source_address())
    )]
    pub async fn handle(&self, message: InboundMessage) -> Result<Transition> {
        let start = std::time::Instant::now();
        let lookup = self.resolver.lookup(&message);

        let mut handle = match self.repository.acquire(&lookup).await {
            Ok(handle) => handle,
            Err(e) => {
                let error = SagaError::from(e);
                self.observer
                    .failed(message.message_type(), message.source_address(), &error);
                return Err(error);
            }
        };

        let result = self.apply(&mut handle, &message).await;

        if let Err(e) = self.repository.release(handle).await {
            tracing::warn!(error = %e, %lookup, "failed to release saga");
        }

        metrics::histogram!("saga_transition_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        result
    }

    /// Handles a message, then publishes its outbound messages in order.
    ///
    /// Publishing starts only after the transition was persisted; a publish
    /// failure leaves the stored state as is.
    pub async fn deliver<P: Publisher>(
        &self,
        message: InboundMessage,
        publisher: &P,
    ) -> Result<Transition> {
        let transition = self.handle(message).await?;
        for outbound in &transition.publish {
            publisher.publish(outbound).await?;
        }
        Ok(transition)
    }

    async fn apply(
        &self,
        handle: &mut SagaHandle<R::Lease>,
        message: &InboundMessage,
    ) -> Result<Transition> {
        let message_type = message.message_type();
        let resource_key = message.source_address();

        let (stored, correlation_id) = match self.resolver.resolve(message, handle.saga()) {
            Resolution::Existing(saga) => (Some(saga.clone()), saga.correlation_id()),
            Resolution::Create(requested) => match self.creation_id(requested, resource_key).await {
                Ok(correlation_id) => (None, correlation_id),
                Err(e) => {
                    self.observer.failed(message_type, resource_key, &e);
                    return Err(e);
                }
            },
            Resolution::Orphaned => {
                self.observer.correlation_missed(message_type, resource_key);
                return Err(SagaError::CorrelationMiss {
                    message_type,
                    resource_key: resource_key.to_string(),
                });
            }
        };

        let from = stored.as_ref().map_or(SagaState::Initial, ImageSaga::state);
        let Some(rule) = self.table.get(from, message.kind()).copied() else {
            self.observer
                .unhandled(from, correlation_id, message_type, resource_key);
            return Err(SagaError::UnhandledEvent {
                state: from,
                message_type,
                correlation_id,
            });
        };

        match self
            .execute(rule, correlation_id, stored, message, handle)
            .await
        {
            Ok(transition) => {
                self.observer.transitioned(&TransitionRecord {
                    correlation_id,
                    resource_key: resource_key.to_string(),
                    message_type,
                    action: rule.action,
                    from,
                    to: rule.to,
                });
                Ok(transition)
            }
            Err(e) => {
                self.observer.failed(message_type, resource_key, &e);
                Err(e)
            }
        }
    }

    /// Keeps the requester's id for a new saga unless a saga for another
    /// resource already owns it, in which case a fresh id is drawn.
    async fn creation_id(
        &self,
        requested: CorrelationId,
        resource_key: &str,
    ) -> Result<CorrelationId> {
        match self
            .repository
            .find(&SagaLookup::CorrelationId(requested))
            .await?
        {
            Some(owner) if owner.resource_key() != resource_key => {
                tracing::warn!(
                    %requested,
                    owner = owner.resource_key(),
                    "request id already names another saga, assigning a fresh one"
                );
                Ok(CorrelationId::new())
            }
            _ => Ok(requested),
        }
    }

    async fn execute(
        &self,
        rule: TransitionRule,
        correlation_id: CorrelationId,
        stored: Option<ImageSaga>,
        message: &InboundMessage,
        handle: &mut SagaHandle<R::Lease>,
    ) -> Result<Transition> {
        let invalid = || SagaError::InvalidRule {
            action: rule.action,
            state: rule.from,
            message_type: message.message_type(),
        };

        let mut publish = Vec::new();
        let mut response = None;

        let updated = match (rule.action, message, stored) {
            (Action::Create, InboundMessage::RequestImage(request), None) => {
                let saga = ImageSaga::create(
                    correlation_id,
                    request.source_address.as_str(),
                    request.timestamp,
                );
                let activity = self.activities.get_activity(&saga, request);
                tracing::debug!(activity = activity.name(), %correlation_id, "running creation activity");
                activity.execute().await?;

                publish.push(
                    ImageRequested::new(request.request_id, request.source_address.as_str()).into(),
                );
                Some(saga)
            }
            (Action::Announce, InboundMessage::RequestImage(request), Some(_)) => {
                publish.push(
                    ImageRequested::new(request.request_id, request.source_address.as_str()).into(),
                );
                None
            }
            (Action::RecordRetrieval, InboundMessage::ImageRetrieved(retrieved), Some(mut saga)) => {
                saga.record_retrieval(
                    retrieved.local_address.as_str(),
                    retrieved.content_type.as_str(),
                    retrieved.content_length,
                    retrieved.timestamp,
                );
                Some(saga)
            }
            (Action::RecordFault, InboundMessage::ImageRetrievalFailed(failed), Some(mut saga)) => {
                saga.record_fault(failed.reason.as_str());
                publish.push(
                    ImageRequestFaulted::new(saga.resource_key(), failed.reason.as_str()).into(),
                );
                Some(saga)
            }
            (Action::RespondFromCache, InboundMessage::RequestImage(request), Some(saga)) => {
                publish.push(
                    ImageRequested::new(request.request_id, request.source_address.as_str()).into(),
                );
                response = Some(completed_response(&saga)?);
                None
            }
            _ => return Err(invalid()),
        };

        match updated {
            Some(saga) => {
                if saga.state() != rule.to {
                    return Err(invalid());
                }
                self.repository.persist(handle, saga).await?;
            }
            None if rule.from != rule.to => return Err(invalid()),
            None => {}
        }

        Ok(Transition {
            correlation_id,
            action: rule.action,
            from: rule.from,
            to: rule.to,
            response,
            publish,
        })
    }
}

/// Builds the cache-hit answer from a stored `Available` saga.
pub fn completed_response(saga: &ImageSaga) -> Result<ImageRequestCompleted> {
    let corrupt = |field: &str| {
        SagaError::Repository(RepositoryError::Corrupt {
            correlation_id: saga.correlation_id(),
            reason: format!("Available saga has no {field}"),
        })
    };

    Ok(ImageRequestCompleted {
        content_length: saga
            .content_length()
            .ok_or_else(|| corrupt("content_length"))?,
        content_type: saga
            .content_type()
            .ok_or_else(|| corrupt("content_type"))?
            .to_string(),
        local_address: saga
            .resolved_location()
            .ok_or_else(|| corrupt("resolved_location"))?
            .to_string(),
        source_address: saga.resource_key().to_string(),
        retrieved_at: saga
            .last_retrieved()
            .ok_or_else(|| corrupt("last_retrieved"))?,
    })
}
