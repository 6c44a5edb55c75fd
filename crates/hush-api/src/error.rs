//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<hush_core::Error> for ApiError {
  fn from(err: hush_core::Error) -> Self {
    use hush_core::{Error, user::ProfileRejection};

    let message = err.to_string();
    match err {
      Error::InvalidIdentity(_) | Error::InvalidProfile(_) => Self::BadRequest(message),
      Error::ProfileRejected { reason: ProfileRejection::Incomplete, .. } => Self::BadRequest(message),
      Error::MessageUnavailable { .. } => Self::NotFound(message),
      Error::AllocationExhausted { .. }
      | Error::ProfileRejected { reason: ProfileRejection::KeyVersionExhausted, .. } => {
        Self::Conflict(message)
      }
      Error::Store(source) => Self::Store(source),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => {
        error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
