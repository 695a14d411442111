//! Delivery of outbound messages.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use contracts::{Message, OutboundMessage};
use tokio::sync::RwLock;

use crate::error::SagaError;

/// Publishes outbound messages to interested parties.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    messages: VecDeque<OutboundMessage>,
    fail_on_publish: bool,
}

/// Keeps published messages in memory, oldest first.
///
/// With a capacity the oldest messages are dropped once it is exceeded.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
    capacity: Option<usize>,
}

impl InMemoryPublisher {
    /// Creates an unbounded publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a publisher that keeps at most `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::default(),
            capacity: Some(capacity),
        }
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().await.fail_on_publish = fail;
    }

    /// Returns the retained messages in publish order.
    pub async fn messages(&self) -> Vec<OutboundMessage> {
        self.state.read().await.messages.iter().cloned().collect()
    }

    /// Returns how many retained messages have the given type.
    pub async fn count_of(&self, message_type: &str) -> usize {
        self.state
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.message_type() == message_type)
            .count()
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), SagaError> {
        let mut state = self.state.write().await;
        if state.fail_on_publish {
            return Err(SagaError::Publish(format!(
                "publisher rejected {}",
                message.message_type()
            )));
        }

        state.messages.push_back(message.clone());
        if let Some(capacity) = self.capacity {
            while state.messages.len() > capacity {
                state.messages.pop_front();
            }
        }
        Ok(())
    }
}
