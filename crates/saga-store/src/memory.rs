use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    CorrelationId, ImageSaga, RepositoryError, Result,
    repository::{SagaHandle, SagaLookup, SagaRepository, validate_for_persist},
};

#[derive(Debug, Default)]
struct Tables {
    sagas: HashMap<CorrelationId, ImageSaga>,
    by_resource: HashMap<String, CorrelationId>,
}

impl Tables {
    fn get(&self, lookup: &SagaLookup) -> Option<&ImageSaga> {
        match lookup {
            SagaLookup::CorrelationId(id) => self.sagas.get(id),
            SagaLookup::ResourceKey(key) => self
                .by_resource
                .get(key)
                .and_then(|id| self.sagas.get(id)),
        }
    }
}

/// In-memory saga repository.
///
/// Exclusivity is a `tokio` mutex per resource key whose owned guard lives
/// in the handle's lease. Used by tests and by the API when no database is
/// configured.
///
/// Lock entries are created per resource key and never removed, so memory
/// grows with the number of distinct keys ever seen.
#[derive(Clone, Default)]
pub struct InMemorySagaRepository {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    fail_on_persist: Arc<AtomicBool>,
    persist_count: Arc<AtomicUsize>,
}

impl InMemorySagaRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `persist` fail until reset.
    pub fn set_fail_on_persist(&self, fail: bool) {
        self.fail_on_persist.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored sagas.
    pub async fn saga_count(&self) -> usize {
        self.tables.read().await.sagas.len()
    }

    /// Returns the number of successful `persist` calls.
    pub fn persist_count(&self) -> usize {
        self.persist_count.load(Ordering::SeqCst)
    }

    /// Returns every stored saga.
    pub async fn all(&self) -> Vec<ImageSaga> {
        self.tables.read().await.sagas.values().cloned().collect()
    }

    async fn lock_for(&self, resource_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(resource_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl SagaRepository for InMemorySagaRepository {
    /// `None` when the lookup names a correlation id that was never stored;
    /// such a handle can be released but not persisted.
    type Lease = Option<OwnedMutexGuard<()>>;

    async fn acquire(&self, lookup: &SagaLookup) -> Result<SagaHandle<Self::Lease>> {
        let resource_key = match lookup {
            SagaLookup::ResourceKey(key) => key.clone(),
            SagaLookup::CorrelationId(id) => {
                let tables = self.tables.read().await;
                match tables.sagas.get(id) {
                    Some(saga) => saga.resource_key().to_string(),
                    None => return Ok(SagaHandle::new(lookup.clone(), None, None)),
                }
            }
        };

        let guard = self.lock_for(&resource_key).await.lock_owned().await;

        // Re-read under the lock: the previous holder may have just persisted.
        let saga = self.tables.read().await.get(lookup).cloned();
        Ok(SagaHandle::new(lookup.clone(), saga, Some(guard)))
    }

    async fn persist(&self, handle: &mut SagaHandle<Self::Lease>, saga: ImageSaga) -> Result<()> {
        if handle.lease().is_none() {
            return Err(RepositoryError::NotLocked(handle.lookup().to_string()));
        }
        validate_for_persist(handle, &saga)?;

        if self.fail_on_persist.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "in-memory store configured to fail".to_string(),
            ));
        }

        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.sagas.get(&saga.correlation_id())
            && existing.resource_key() != saga.resource_key()
        {
            return Err(RepositoryError::CorrelationIdInUse {
                correlation_id: saga.correlation_id(),
                resource_key: existing.resource_key().to_string(),
            });
        }
        if let Some(existing) = tables.by_resource.get(saga.resource_key())
            && *existing != saga.correlation_id()
        {
            return Err(RepositoryError::DuplicateResourceKey {
                resource_key: saga.resource_key().to_string(),
                existing: *existing,
            });
        }

        tables
            .by_resource
            .insert(saga.resource_key().to_string(), saga.correlation_id());
        tables.sagas.insert(saga.correlation_id(), saga.clone());
        drop(tables);

        self.persist_count.fetch_add(1, Ordering::SeqCst);
        handle.set_saga(saga);
        Ok(())
    }

    async fn release(&self, handle: SagaHandle<Self::Lease>) -> Result<()> {
        drop(handle.into_lease());
        Ok(())
    }

    async fn find(&self, lookup: &SagaLookup) -> Result<Option<ImageSaga>> {
        Ok(self.tables.read().await.get(lookup).cloned())
    }
}
