use async_trait::async_trait;
use common::CorrelationId;

use crate::{ImageSaga, RepositoryError, Result};

/// How a caller identifies the saga it wants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SagaLookup {
    /// By primary key.
    CorrelationId(CorrelationId),
    /// By business key (the source address).
    ResourceKey(String),
}

impl SagaLookup {
    pub fn resource_key(key: impl Into<String>) -> Self {
        SagaLookup::ResourceKey(key.into())
    }

    /// Returns true if `saga` is the instance this lookup designates.
    pub fn matches(&self, saga: &ImageSaga) -> bool {
        match self {
            SagaLookup::CorrelationId(id) => saga.correlation_id() == *id,
            SagaLookup::ResourceKey(key) => saga.resource_key() == key,
        }
    }
}

impl std::fmt::Display for SagaLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaLookup::CorrelationId(id) => write!(f, "correlation {id}"),
            SagaLookup::ResourceKey(key) => write!(f, "resource {key}"),
        }
    }
}

/// Exclusive access to one saga, obtained from [`SagaRepository::acquire`].
///
/// `saga` is `None` when nothing is stored under the lookup yet. The lease
/// is repository specific and keeps the resource locked until the handle is
/// passed to [`SagaRepository::release`].
#[derive(Debug)]
pub struct SagaHandle<L> {
    lookup: SagaLookup,
    saga: Option<ImageSaga>,
    lease: L,
}

impl<L> SagaHandle<L> {
    pub fn new(lookup: SagaLookup, saga: Option<ImageSaga>, lease: L) -> Self {
        Self {
            lookup,
            saga,
            lease,
        }
    }

    pub fn lookup(&self) -> &SagaLookup {
        &self.lookup
    }

    /// Returns the saga as it was stored when the handle was acquired, or
    /// as last persisted through this handle.
    pub fn saga(&self) -> Option<&ImageSaga> {
        self.saga.as_ref()
    }

    pub fn lease(&self) -> &L {
        &self.lease
    }

    pub fn lease_mut(&mut self) -> &mut L {
        &mut self.lease
    }

    pub(crate) fn set_saga(&mut self, saga: ImageSaga) {
        self.saga = Some(saga);
    }

    pub fn into_lease(self) -> L {
        self.lease
    }
}

/// Keyed storage for saga instances with per-resource exclusivity.
///
/// Operations on distinct resources are independent. Between `acquire` and
/// `release` no other caller can acquire the same resource, so transitions
/// for one resource never interleave.
#[async_trait]
pub trait SagaRepository: Send + Sync {
    /// Lock held by a [`SagaHandle`].
    type Lease: Send;

    /// Locks the resource designated by `lookup` and loads its saga.
    ///
    /// Returns a handle with no saga when none exists; the caller decides
    /// whether that means "create".
    async fn acquire(&self, lookup: &SagaLookup) -> Result<SagaHandle<Self::Lease>>;

    /// Stores `saga` durably. Either every field is written or none is.
    async fn persist(&self, handle: &mut SagaHandle<Self::Lease>, saga: ImageSaga) -> Result<()>;

    /// Releases exclusivity over the handle's resource.
    async fn release(&self, handle: SagaHandle<Self::Lease>) -> Result<()>;

    /// Reads a saga without locking it.
    async fn find(&self, lookup: &SagaLookup) -> Result<Option<ImageSaga>>;
}

/// Checks that `saga` may be persisted through `handle`.
pub fn validate_for_persist<L>(handle: &SagaHandle<L>, saga: &ImageSaga) -> Result<()> {
    if let Some(current) = handle.saga()
        && current.correlation_id() != saga.correlation_id()
    {
        return Err(RepositoryError::CorrelationMismatch {
            expected: current.correlation_id().to_string(),
            actual: saga.correlation_id().to_string(),
        });
    }

    if !handle.lookup().matches(saga) {
        return Err(RepositoryError::CorrelationMismatch {
            expected: handle.lookup().to_string(),
            actual: saga.correlation_id().to_string(),
        });
    }

    saga.validate()
        .map_err(|reason| RepositoryError::Corrupt {
            correlation_id: saga.correlation_id(),
            reason,
        })
}
