//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use conflink_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] conflink_core::Error),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("missing or wrong webhook secret")]
  Unauthorized,
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Core(e) => match e.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
      },
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use conflink_core::{ConflictError, ValidationError};

  use super::*;

  #[test]
  fn kinds_map_to_statuses() {
    let validation: ApiError = conflink_core::Error::from(ValidationError::EmptyAlias).into();
    assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

    let conflict: ApiError =
      conflink_core::Error::from(ConflictError::AliasExists { alias: "a".into() }).into();
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    let not_found = ApiError::Core(conflink_core::Error::NotFound {
      channel_id: "CH1".into(),
      alias:      "a".into(),
    });
    assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
    assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
  }
}
