//! Image retrieval saga.
//!
//! One saga exists per resource key. It is created by the first
//! `RequestImage` for that key, which also issues a `RetrieveImage` command
//! to the retrieval worker, and then follows the retrieval's outcome:
//!
//! ```text
//! Initial --RequestImage--> Pending --ImageRetrieved-------> Available
//!                              |
//!                              +-----ImageRetrievalFailed--> Faulted
//! ```
//!
//! Requests for a resource that is already `Available` are answered from the
//! stored content without another retrieval. `Faulted` is terminal.

pub mod activity;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod machine;
pub mod observer;
pub mod publisher;

pub use activity::{Activity, ActivityStrategy, InMemoryActivityStrategy, QueueActivityStrategy};
pub use correlation::{CorrelationPredicate, CorrelationResolver, Resolution, by_resource_key};
pub use engine::{SagaEngine, Transition, completed_response};
pub use error::{ActivityError, Result, SagaError};
pub use machine::{Action, IMAGE_SAGA_RULES, TransitionRule, TransitionTable};
pub use observer::{Observation, RecordingObserver, SagaObserver, TracingObserver, TransitionRecord};
pub use publisher::{InMemoryPublisher, Publisher};
pub use saga_store::SagaState;
