//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;
use saga_store::RepositoryError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Saga(#[from] SagaError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Saga(err) => saga_error_status(err),
            ApiError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn saga_error_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::CorrelationMiss { .. } => StatusCode::NOT_FOUND,
        SagaError::UnhandledEvent { .. } => StatusCode::CONFLICT,
        SagaError::Activity(_) => StatusCode::BAD_GATEWAY,
        SagaError::InvalidRule { .. } | SagaError::Repository(_) | SagaError::Publish(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use common::CorrelationId;
    use saga::ActivityError;
    use saga_store::SagaState;

    use super::*;

    #[test]
    fn test_saga_errors_map_to_statuses() {
        let miss = ApiError::from(SagaError::CorrelationMiss {
            message_type: "ImageRetrieved",
            resource_key: "res://a".to_string(),
        });
        assert_eq!(miss.status(), StatusCode::NOT_FOUND);

        let unhandled = ApiError::from(SagaError::UnhandledEvent {
            state: SagaState::Faulted,
            message_type: "RequestImage",
            correlation_id: CorrelationId::new(),
        });
        assert_eq!(unhandled.status(), StatusCode::CONFLICT);

        let activity = ApiError::from(SagaError::Activity(ActivityError::QueueClosed));
        assert_eq!(activity.status(), StatusCode::BAD_GATEWAY);

        let publish = ApiError::from(SagaError::Publish("down".to_string()));
        assert_eq!(publish.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_repository_error_is_internal() {
        let err = ApiError::from(RepositoryError::Unavailable("down".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
