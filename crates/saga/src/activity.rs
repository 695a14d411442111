//! Activities executed when a saga is created.
//!
//! The engine asks an [`ActivityStrategy`] for the unit of work to run for a
//! newly created saga and awaits it before anything is persisted. The
//! standard activity issues a [`RetrieveImage`] command to the retrieval
//! worker.

use std::sync::Arc;

use async_trait::async_trait;
use contracts::{RequestImage, RetrieveImage};
use saga_store::ImageSaga;
use tokio::sync::{Mutex, mpsc};

use crate::error::ActivityError;

/// A side-effecting unit of work.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Runs the activity.
    async fn execute(&self) -> Result<(), ActivityError>;
}

/// Chooses the activity to run when a saga is created.
pub trait ActivityStrategy: Send + Sync {
    fn get_activity(&self, saga: &ImageSaga, message: &RequestImage) -> Box<dyn Activity>;
}

/// Builds the retrieval command for a new saga.
fn retrieve_command(saga: &ImageSaga) -> RetrieveImage {
    RetrieveImage::new(saga.correlation_id(), saga.resource_key())
}

/// Sends `RetrieveImage` commands to a bounded channel drained by the
/// retrieval worker.
#[derive(Debug, Clone)]
pub struct QueueActivityStrategy {
    sender: mpsc::Sender<RetrieveImage>,
}

impl QueueActivityStrategy {
    pub fn new(sender: mpsc::Sender<RetrieveImage>) -> Self {
        Self { sender }
    }

    /// Creates a strategy and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RetrieveImage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

impl ActivityStrategy for QueueActivityStrategy {
    fn get_activity(&self, saga: &ImageSaga, _message: &RequestImage) -> Box<dyn Activity> {
        Box::new(EnqueueRetrieval {
            command: retrieve_command(saga),
            sender: self.sender.clone(),
        })
    }
}

struct EnqueueRetrieval {
    command: RetrieveImage,
    sender: mpsc::Sender<RetrieveImage>,
}

#[async_trait]
impl Activity for EnqueueRetrieval {
    fn name(&self) -> &'static str {
        "enqueue_retrieval"
    }

    async fn execute(&self) -> Result<(), ActivityError> {
        self.sender
            .send(self.command.clone())
            .await
            .map_err(|_| ActivityError::QueueClosed)
    }
}

#[derive(Debug, Default)]
struct InMemoryActivityState {
    issued: Vec<RetrieveImage>,
    fail_on_execute: bool,
}

/// In-memory activity strategy for testing.
///
/// Records every retrieval command instead of sending it anywhere.
#[derive(Debug, Clone, Default)]
pub struct InMemoryActivityStrategy {
    state: Arc<Mutex<InMemoryActivityState>>,
}

impl InMemoryActivityStrategy {
    /// Creates a new in-memory activity strategy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures activities to fail when executed.
    pub async fn set_fail_on_execute(&self, fail: bool) {
        self.state.lock().await.fail_on_execute = fail;
    }

    /// Returns the number of successfully issued commands.
    pub async fn issued_count(&self) -> usize {
        self.state.lock().await.issued.len()
    }

    /// Returns the issued commands in order.
    pub async fn issued(&self) -> Vec<RetrieveImage> {
        self.state.lock().await.issued.clone()
    }
}

impl ActivityStrategy for InMemoryActivityStrategy {
    fn get_activity(&self, saga: &ImageSaga, _message: &RequestImage) -> Box<dyn Activity> {
        Box::new(RecordRetrieval {
            command: retrieve_command(saga),
            state: self.state.clone(),
        })
    }
}

struct RecordRetrieval {
    command: RetrieveImage,
    state: Arc<Mutex<InMemoryActivityState>>,
}

#[async_trait]
impl Activity for RecordRetrieval {
    fn name(&self) -> &'static str {
        "record_retrieval"
    }

    async fn execute(&self) -> Result<(), ActivityError> {
        let mut state = self.state.lock().await;
        if state.fail_on_execute {
            return Err(ActivityError::Failed {
                activity: self.name(),
                reason: "retrieval worker unavailable".to_string(),
            });
        }
        state.issued.push(self.command.clone());
        Ok(())
    }
}
