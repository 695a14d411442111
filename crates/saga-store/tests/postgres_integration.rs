//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p saga-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use saga_store::{
    CorrelationId, ImageSaga, PostgresSagaRepository, RepositoryError, SagaLookup,
    SagaRepository, SagaState,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresSagaRepository::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh repository with its own pool and a cleared table
async fn get_test_repository() -> PostgresSagaRepository {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE image_sagas")
        .execute(&pool)
        .await
        .unwrap();

    PostgresSagaRepository::new(pool)
}

async fn create_pending(repo: &PostgresSagaRepository, key: &str) -> ImageSaga {
    let saga = ImageSaga::create(CorrelationId::new(), key, Utc::now());
    let mut handle = repo
        .acquire(&SagaLookup::resource_key(key))
        .await
        .unwrap();
    assert!(handle.saga().is_none());
    repo.persist(&mut handle, saga.clone()).await.unwrap();
    repo.release(handle).await.unwrap();
    saga
}

#[tokio::test]
async fn persist_and_find_pending_saga() {
    let repo = get_test_repository().await;
    let saga = create_pending(&repo, "res://a").await;

    let by_key = repo
        .find(&SagaLookup::resource_key("res://a"))
        .await
        .unwrap()
        .unwrap();
    let by_id = repo
        .find(&SagaLookup::CorrelationId(saga.correlation_id()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(by_key.correlation_id(), saga.correlation_id());
    assert_eq!(by_id.state(), SagaState::Pending);
    assert_eq!(by_id.resource_key(), "res://a");
    assert!(by_id.resolved_location().is_none());
}

#[tokio::test]
async fn update_to_available_round_trips_content_fields() {
    let repo = get_test_repository().await;
    let saga = create_pending(&repo, "res://a").await;

    let mut handle = repo
        .acquire(&SagaLookup::CorrelationId(saga.correlation_id()))
        .await
        .unwrap();
    let mut updated = handle.saga().cloned().unwrap();
    let retrieved_at = Utc::now();
    updated.record_retrieval("cache://a.bin", "image/jpeg", 2048, retrieved_at);
    repo.persist(&mut handle, updated).await.unwrap();
    repo.release(handle).await.unwrap();

    let stored = repo
        .find(&SagaLookup::resource_key("res://a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state(), SagaState::Available);
    assert_eq!(stored.resolved_location(), Some("cache://a.bin"));
    assert_eq!(stored.content_type(), Some("image/jpeg"));
    assert_eq!(stored.content_length(), Some(2048));
    // Postgres keeps microseconds.
    assert_eq!(
        stored.last_retrieved().map(|t| t.timestamp_micros()),
        Some(retrieved_at.timestamp_micros())
    );
}

#[tokio::test]
async fn second_saga_for_same_resource_is_rejected() {
    let repo = get_test_repository().await;
    let first = create_pending(&repo, "res://a").await;

    let mut handle = repo
        .acquire(&SagaLookup::resource_key("res://a"))
        .await
        .unwrap();
    assert!(handle.saga().is_some());

    let intruder = ImageSaga::create(CorrelationId::new(), "res://a", Utc::now());
    let result = repo.persist(&mut handle, intruder).await;
    repo.release(handle).await.unwrap();

    assert!(matches!(
        result,
        Err(RepositoryError::CorrelationMismatch { .. })
    ));
    let stored = repo
        .find(&SagaLookup::resource_key("res://a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.correlation_id(), first.correlation_id());
}

#[tokio::test]
async fn correlation_id_of_another_resource_is_rejected() {
    let repo = get_test_repository().await;
    let first = create_pending(&repo, "res://a").await;

    let mut handle = repo
        .acquire(&SagaLookup::resource_key("res://a"))
        .await
        .unwrap();
    let mut available = handle.saga().cloned().unwrap();
    available.record_retrieval("cache://a.bin", "image/jpeg", 2048, Utc::now());
    repo.persist(&mut handle, available).await.unwrap();
    repo.release(handle).await.unwrap();

    let mut handle = repo
        .acquire(&SagaLookup::resource_key("res://b"))
        .await
        .unwrap();
    let clash = ImageSaga::create(first.correlation_id(), "res://b", Utc::now());
    let result = repo.persist(&mut handle, clash).await;
    repo.release(handle).await.unwrap();

    assert!(matches!(
        result,
        Err(RepositoryError::CorrelationIdInUse { ref resource_key, .. }) if resource_key == "res://a"
    ));
    let stored = repo
        .find(&SagaLookup::CorrelationId(first.correlation_id()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.resource_key(), "res://a");
    assert_eq!(stored.state(), SagaState::Available);
    assert_eq!(stored.resolved_location(), Some("cache://a.bin"));
    assert!(
        repo.find(&SagaLookup::resource_key("res://b"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn migrations_can_run_again() {
    let repo = get_test_repository().await;

    repo.run_migrations().await.unwrap();

    create_pending(&repo, "res://after-migrate").await;
}

#[tokio::test]
async fn acquire_blocks_same_resource_until_release() {
    let repo = get_test_repository().await;
    let lookup = SagaLookup::resource_key("res://locked");

    let first = repo.acquire(&lookup).await.unwrap();

    let contender = {
        let repo = repo.clone();
        let lookup = lookup.clone();
        tokio::spawn(async move { repo.acquire(&lookup).await.unwrap() })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!contender.is_finished());

    repo.release(first).await.unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), contender)
        .await
        .unwrap()
        .unwrap();
    repo.release(second).await.unwrap();
}

#[tokio::test]
async fn unknown_correlation_id_yields_unlocked_empty_handle() {
    let repo = get_test_repository().await;
    let handle = repo
        .acquire(&SagaLookup::CorrelationId(CorrelationId::new()))
        .await
        .unwrap();

    assert!(handle.saga().is_none());
    assert!(handle.lease().resource_key().is_none());
    repo.release(handle).await.unwrap();
}

#[tokio::test]
async fn faulted_saga_round_trips_reason() {
    let repo = get_test_repository().await;
    let saga = create_pending(&repo, "res://broken").await;

    let mut handle = repo
        .acquire(&SagaLookup::CorrelationId(saga.correlation_id()))
        .await
        .unwrap();
    let mut faulted = handle.saga().cloned().unwrap();
    faulted.record_fault("timeout");
    repo.persist(&mut handle, faulted).await.unwrap();
    repo.release(handle).await.unwrap();

    let stored = repo
        .find(&SagaLookup::CorrelationId(saga.correlation_id()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state(), SagaState::Faulted);
    assert_eq!(stored.fault_reason(), Some("timeout"));
    assert!(stored.content_type().is_none());
}
