//! HTTP hosting layer for the image retrieval saga.
//!
//! Delivers inbound messages posted by requesters and the retrieval worker to
//! the saga engine, publishes the resulting outbound messages and exposes
//! saga status, message history, health and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use contracts::RetrieveImage;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryPublisher, QueueActivityStrategy, SagaEngine};
use saga_store::SagaRepository;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::images::AppState;

/// Published messages kept for `GET /messages`.
const MESSAGE_HISTORY: usize = 10_000;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R: SagaRepository + 'static>(
    state: Arc<AppState<R>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<R>))
        .route("/images", get(routes::images::by_source::<R>))
        .route("/images/requests", post(routes::images::request::<R>))
        .route("/images/retrieved", post(routes::images::retrieved::<R>))
        .route("/images/failed", post(routes::images::failed::<R>))
        .route("/images/not-found", post(routes::images::not_found::<R>))
        .route("/images/sagas/{id}", get(routes::images::get::<R>))
        .route("/messages", get(routes::messages::list::<R>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around `repository`.
///
/// Returns the receiving end of the `RetrieveImage` queue; whoever drains it
/// plays the retrieval worker. Once it is dropped, new sagas can no longer
/// be created.
pub fn create_default_state<R: SagaRepository + 'static>(
    repository: R,
    storage: &'static str,
    queue_capacity: usize,
) -> (Arc<AppState<R>>, mpsc::Receiver<RetrieveImage>) {
    let (activities, commands) = QueueActivityStrategy::channel(queue_capacity);
    let engine = SagaEngine::new(repository, activities);

    let state = Arc::new(AppState {
        engine,
        publisher: InMemoryPublisher::with_capacity(MESSAGE_HISTORY),
        storage,
    });

    (state, commands)
}
