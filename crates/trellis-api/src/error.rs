//! HTTP error mapping.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use trellis_access::AccessError;
use trellis_db::Database;

use crate::auth::AppState;

/// Errors returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Access decisions, including 401/403/404 on channels.
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("internal error")]
    Internal,
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("Internal error: {:#}", err);
        ApiError::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Access(AccessError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            ApiError::Access(AccessError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Access(AccessError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::Access(AccessError::ValidationFailed(_)) => StatusCode::BAD_REQUEST,
            ApiError::Access(AccessError::Storage(e)) => {
                error!("Storage error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            ApiError::Access(AccessError::Storage(_)) => "internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Unwraps a JSON body whose rejection was deferred by the handler, so
/// that authorization can be decided before the body is judged.
pub(crate) fn parse_body<T>(body: Result<T, String>) -> Result<T, ApiError> {
    body.map_err(|msg| AccessError::ValidationFailed(msg).into())
}

/// Turns an extracted body into a `Send`-able form for [`parse_body`].
pub(crate) fn defer_rejection<T>(
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, String> {
    body.map(|Json(value)| value).map_err(|e| e.body_text())
}

/// Runs blocking database work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
}
