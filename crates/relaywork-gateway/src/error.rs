use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;
use tracing::error;

use relaywork_core::WorkflowError;
use relaywork_platform::ApiResponse;

pub type ApiResult<T> = Result<T, ApiError>;

/// Gateway-level error: the workflow taxonomy plus infrastructure failures,
/// rendered as the `{success: false, error}` envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Workflow(err) => {
                let status = match err {
                    WorkflowError::Unauthorized => StatusCode::UNAUTHORIZED,
                    WorkflowError::Forbidden => StatusCode::FORBIDDEN,
                    WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
                    WorkflowError::InvalidState(_)
                    | WorkflowError::Validation(_)
                    | WorkflowError::AlreadySigned(_) => StatusCode::BAD_REQUEST,
                };
                (status, err.to_string())
            }
            ApiError::Database(sqlx::Error::RowNotFound) => {
                (StatusCode::NOT_FOUND, "record not found".to_string())
            }
            ApiError::Database(err) => {
                error!("database failure: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            ApiError::Internal(err) => {
                error!("request failed: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}
