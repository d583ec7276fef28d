//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders as `{"error": {"kind": "...", "message": "..."}}`.
//! Internal failures are logged and replaced by a generic message.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use formtable_core::{ErrorClass, ErrorKind};
use serde_json::json;
use thiserror::Error;

use crate::auth::Role;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("authentication required")]
  Unauthorized,

  #[error("this operation requires the {} role", .0.as_str())]
  Forbidden(Role),

  #[error("{0}")]
  BadRequest(String),

  #[error(transparent)]
  Engine(#[from] formtable_engine::Error),
}

impl From<formtable_core::Error> for ApiError {
  fn from(err: formtable_core::Error) -> Self { Self::Engine(err.into()) }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::Validation => StatusCode::BAD_REQUEST,
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
    ErrorKind::Irreversible => StatusCode::CONFLICT,
    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, kind, message) = match &self {
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
      ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, ErrorKind::Validation.as_str(), m.clone()),
      ApiError::Engine(e) => {
        let kind = e.kind();
        let message = if kind == ErrorKind::Internal {
          tracing::error!(error = %e, "internal error");
          "internal error".to_string()
        } else {
          e.to_string()
        };
        (status_for(kind), kind.as_str(), message)
      }
    };

    let mut response = (status, Json(json!({ "error": { "kind": kind, "message": message } }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"formtable\""));
    }
    response
  }
}
