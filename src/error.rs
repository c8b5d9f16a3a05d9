//! Error taxonomy for the HTTP surface and the uniform `{ error, details? }` envelope.

use axum::{
  extract::rejection::JsonRejection,
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Failure reported by the text-generation capability.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
  pub message: String,
  /// HTTP status of the provider response, when one was received.
  pub status: Option<u16>,
}

impl UpstreamError {
  pub fn new(message: impl Into<String>) -> Self {
    Self { message: message.into(), status: None }
  }

  pub fn with_status(mut self, status: u16) -> Self {
    self.status = Some(status);
    self
  }
}

#[derive(Debug, Error)]
pub enum AppError {
  /// Malformed or missing request fields; no upstream call was made.
  #[error("{0}")]
  Validation(String),

  #[error("Text generation unavailable: {message}")]
  UpstreamUnavailable { message: String, detail: Option<String> },

  /// The model text could not be turned into the expected structure.
  #[error("Malformed model response: {0}")]
  MalformedResponse(String),

  #[error("Model response is missing required field `{0}`")]
  MissingField(&'static str),

  #[error("{0}")]
  NotFound(String),
}

impl AppError {
  pub fn status(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
      AppError::MalformedResponse(_) | AppError::MissingField(_) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
    }
  }

  fn details(&self) -> Option<String> {
    match self {
      AppError::UpstreamUnavailable { detail, .. } => detail.clone(),
      _ => None,
    }
  }
}

impl From<UpstreamError> for AppError {
  fn from(e: UpstreamError) -> Self {
    let detail = match e.status {
      Some(code) => Some(format!("provider status {code}: {}", e.message)),
      None => Some(e.message.clone()),
    };
    AppError::UpstreamUnavailable { message: e.message, detail }
  }
}

impl From<JsonRejection> for AppError {
  fn from(rejection: JsonRejection) -> Self {
    AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
  }
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = self.status();
    warn!(target: "ibprep_backend", %status, error = %self, "Request failed");
    let body = ErrorBody { error: self.to_string(), details: self.details() };
    (status, Json(body)).into_response()
  }
}
