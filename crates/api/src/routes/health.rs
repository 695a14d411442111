//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga_store::SagaRepository;
use serde::Serialize;

use crate::routes::images::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Where sagas are kept: `"memory"` or `"postgres"`.
    pub storage: &'static str,
}

/// GET /health: liveness and the configured saga storage.
pub async fn check<R: SagaRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        storage: state.storage,
    })
}
