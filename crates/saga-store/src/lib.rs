//! Saga instance model and the repositories that persist it.
//!
//! A repository grants exclusive access to one saga at a time through
//! [`SagaHandle`]s: `acquire` locks the resource, `persist` stores the
//! updated instance atomically and `release` hands the resource to the next
//! caller.

pub mod error;
pub mod instance;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod state;

pub use common::CorrelationId;
pub use error::{RepositoryError, Result};
pub use instance::ImageSaga;
pub use memory::InMemorySagaRepository;
pub use postgres::{PgLease, PostgresSagaRepository};
pub use repository::{SagaHandle, SagaLookup, SagaRepository};
pub use state::SagaState;
