use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgConnection, PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    CorrelationId, ImageSaga, RepositoryError, Result, SagaState,
    repository::{SagaHandle, SagaLookup, SagaRepository, validate_for_persist},
};

const SELECT_COLUMNS: &str = r#"
    SELECT correlation_id, state, resource_key, created, first_requested,
           last_retrieved, resolved_location, content_type, content_length, fault_reason
    FROM image_sagas
"#;

/// Session-level advisory lock on a resource key, held on a dedicated
/// pooled connection.
///
/// Dropping a lease without releasing it closes the connection so the lock
/// never leaks back into the pool.
pub struct PgLease {
    conn: Option<PoolConnection<Postgres>>,
    resource_key: String,
}

impl PgLease {
    fn unlocked() -> Self {
        Self {
            conn: None,
            resource_key: String::new(),
        }
    }

    /// Returns the resource key this lease locks, if any.
    pub fn resource_key(&self) -> Option<&str> {
        self.conn.as_ref().map(|_| self.resource_key.as_str())
    }

    async fn unlock(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked = sqlx::query("SELECT pg_advisory_unlock(hashtextextended($1, 0))")
            .bind(&self.resource_key)
            .execute(&mut *conn)
            .await;

        if let Err(e) = unlocked {
            drop(conn.detach());
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for PgLease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(
                resource_key = %self.resource_key,
                "saga lease dropped without release, closing connection"
            );
            drop(conn.detach());
        }
    }
}

/// PostgreSQL-backed saga repository.
///
/// One row per saga in `image_sagas`. Exclusivity is
/// `pg_advisory_lock(hashtextextended(resource_key, 0))`, so it also covers
/// resources that have no row yet.
#[derive(Clone)]
pub struct PostgresSagaRepository {
    pool: PgPool,
}

impl PostgresSagaRepository {
    /// Creates a new PostgreSQL saga repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_saga(row: PgRow) -> Result<ImageSaga> {
        let correlation_id = CorrelationId::from_uuid(row.try_get::<Uuid, _>("correlation_id")?);
        let corrupt = |reason: String| RepositoryError::Corrupt {
            correlation_id,
            reason,
        };

        let state = row
            .try_get::<String, _>("state")?
            .parse::<SagaState>()
            .map_err(corrupt)?;
        let content_length = row
            .try_get::<Option<i64>, _>("content_length")?
            .map(u64::try_from)
            .transpose()
            .map_err(|e| corrupt(format!("content_length: {e}")))?;

        let saga = ImageSaga {
            correlation_id,
            state,
            resource_key: row.try_get("resource_key")?,
            created: row.try_get("created")?,
            first_requested: row.try_get("first_requested")?,
            last_retrieved: row.try_get("last_retrieved")?,
            resolved_location: row.try_get("resolved_location")?,
            content_type: row.try_get("content_type")?,
            content_length,
            fault_reason: row.try_get("fault_reason")?,
        };
        saga.validate().map_err(corrupt)?;
        Ok(saga)
    }

    async fn load_locked(conn: &mut PgConnection, resource_key: &str) -> Result<Option<ImageSaga>> {
        sqlx::query(&format!("{SELECT_COLUMNS} WHERE resource_key = $1"))
            .bind(resource_key)
            .fetch_optional(conn)
            .await?
            .map(Self::row_to_saga)
            .transpose()
    }

    async fn resource_key_of(&self, id: CorrelationId) -> Result<Option<String>> {
        let key = sqlx::query_scalar("SELECT resource_key FROM image_sagas WHERE correlation_id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(key)
    }
}

#[async_trait]
impl SagaRepository for PostgresSagaRepository {
    type Lease = PgLease;

    async fn acquire(&self, lookup: &SagaLookup) -> Result<SagaHandle<Self::Lease>> {
        let resource_key = match lookup {
            SagaLookup::ResourceKey(key) => key.clone(),
            SagaLookup::CorrelationId(id) => match self.resource_key_of(*id).await? {
                Some(key) => key,
                None => return Ok(SagaHandle::new(lookup.clone(), None, PgLease::unlocked())),
            },
        };

        let wait_start = std::time::Instant::now();
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock(hashtextextended($1, 0))")
            .bind(&resource_key)
            .execute(&mut *conn)
            .await?;
        metrics::histogram!("saga_store_lock_wait_seconds")
            .record(wait_start.elapsed().as_secs_f64());

        let loaded = Self::load_locked(&mut conn, &resource_key).await;
        let mut lease = PgLease {
            conn: Some(conn),
            resource_key,
        };
        let saga = match loaded {
            Ok(saga) => saga,
            Err(e) => {
                if let Err(unlock_err) = lease.unlock().await {
                    tracing::warn!(error = %unlock_err, "failed to release saga lock");
                }
                return Err(e);
            }
        };

        // Looked up by id but the key now belongs to another saga: nothing to hand out.
        let saga = saga.filter(|s| lookup.matches(s));
        Ok(SagaHandle::new(lookup.clone(), saga, lease))
    }

    async fn persist(&self, handle: &mut SagaHandle<Self::Lease>, saga: ImageSaga) -> Result<()> {
        validate_for_persist(handle, &saga)?;

        let not_locked = RepositoryError::NotLocked(handle.lookup().to_string());
        let lease = handle.lease_mut();
        if lease.resource_key != saga.resource_key() {
            return Err(not_locked);
        }
        let Some(conn) = lease.conn.as_mut() else {
            return Err(not_locked);
        };

        let content_length = saga
            .content_length
            .map(i64::try_from)
            .transpose()
            .map_err(|e| RepositoryError::Corrupt {
                correlation_id: saga.correlation_id,
                reason: format!("content_length: {e}"),
            })?;

        let mut tx = conn.begin().await?;
        let written = sqlx::query(
            r#"
            INSERT INTO image_sagas (correlation_id, state, resource_key, created, first_requested,
                                     last_retrieved, resolved_location, content_type, content_length, fault_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (correlation_id) DO UPDATE SET
                state = EXCLUDED.state,
                last_retrieved = EXCLUDED.last_retrieved,
                resolved_location = EXCLUDED.resolved_location,
                content_type = EXCLUDED.content_type,
                content_length = EXCLUDED.content_length,
                fault_reason = EXCLUDED.fault_reason
            WHERE image_sagas.resource_key = EXCLUDED.resource_key
            "#,
        )
        .bind(saga.correlation_id.as_uuid())
        .bind(saga.state.as_str())
        .bind(&saga.resource_key)
        .bind(saga.created)
        .bind(saga.first_requested)
        .bind(saga.last_retrieved)
        .bind(&saga.resolved_location)
        .bind(&saga.content_type)
        .bind(content_length)
        .bind(&saga.fault_reason)
        .execute(&mut *tx)
        .await;

        match written {
            Ok(done) if done.rows_affected() == 0 => {
                tx.rollback().await?;
                let owner: String = sqlx::query_scalar(
                    "SELECT resource_key FROM image_sagas WHERE correlation_id = $1",
                )
                .bind(saga.correlation_id.as_uuid())
                .fetch_one(&mut **conn)
                .await?;
                return Err(RepositoryError::CorrelationIdInUse {
                    correlation_id: saga.correlation_id,
                    resource_key: owner,
                });
            }
            Ok(_) => tx.commit().await?,
            Err(sqlx::Error::Database(db_err)) if db_err.constraint() == Some("unique_resource_key") => {
                tx.rollback().await?;
                let existing: Uuid = sqlx::query_scalar(
                    "SELECT correlation_id FROM image_sagas WHERE resource_key = $1",
                )
                .bind(&saga.resource_key)
                .fetch_one(&mut **conn)
                .await?;
                return Err(RepositoryError::DuplicateResourceKey {
                    resource_key: saga.resource_key.clone(),
                    existing: CorrelationId::from_uuid(existing),
                });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(
            correlation_id = %saga.correlation_id,
            state = %saga.state,
            "saga persisted"
        );
        handle.set_saga(saga);
        Ok(())
    }

    async fn release(&self, handle: SagaHandle<Self::Lease>) -> Result<()> {
        let mut lease = handle.into_lease();
        lease.unlock().await
    }

    async fn find(&self, lookup: &SagaLookup) -> Result<Option<ImageSaga>> {
        let row = match lookup {
            SagaLookup::CorrelationId(id) => {
                sqlx::query(&format!("{SELECT_COLUMNS} WHERE correlation_id = $1"))
                    .bind(id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?
            }
            SagaLookup::ResourceKey(key) => {
                sqlx::query(&format!("{SELECT_COLUMNS} WHERE resource_key = $1"))
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        row.map(Self::row_to_saga).transpose()
    }
}
