//! Typed error kinds for the HTTP API boundary, and their status mapping.
//!
//! Internal code propagates [`anyhow::Error`] as usual (teacher convention);
//! call sites that need a specific HTTP status attach a [`Kind`] via
//! [`ApiError::kind`] / [`KindExt`]. Anything left untagged maps to
//! `internal` / 500, matching spec.md §7's propagation policy.

use std::fmt;

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

/// Error kinds surfaced at the API boundary (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
  Validation,
  Unauthenticated,
  Forbidden,
  NotFound,
  Conflict,
  Quota,
  NotImplemented,
  UpstreamUnavailable,
  Timeout,
  Internal,
}

impl Kind {
  pub fn status(self) -> StatusCode {
    match self {
      Kind::Validation => StatusCode::BAD_REQUEST,
      Kind::Unauthenticated => StatusCode::UNAUTHORIZED,
      Kind::Forbidden => StatusCode::FORBIDDEN,
      Kind::NotFound => StatusCode::NOT_FOUND,
      Kind::Conflict => StatusCode::CONFLICT,
      Kind::Quota => StatusCode::FORBIDDEN,
      Kind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
      Kind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
      Kind::Timeout => StatusCode::GATEWAY_TIMEOUT,
      Kind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn code(self) -> &'static str {
    match self {
      Kind::Validation => "validation",
      Kind::Unauthenticated => "unauthenticated",
      Kind::Forbidden => "forbidden",
      Kind::NotFound => "not-found",
      Kind::Conflict => "conflict",
      Kind::Quota => "quota",
      Kind::NotImplemented => "not-implemented",
      Kind::UpstreamUnavailable => "upstream-unavailable",
      Kind::Timeout => "timeout",
      Kind::Internal => "internal",
    }
  }
}

/// Error propagated out to the HTTP layer. Wraps an [`anyhow::Error`] with
/// an optional [`Kind`] and optional `details` payload (spec.md §7's
/// `{error, code?, details?}` body).
pub struct ApiError {
  pub kind: Kind,
  pub error: anyhow::Error,
  pub details: Option<serde_json::Value>,
}

impl ApiError {
  pub fn new(kind: Kind, error: impl Into<anyhow::Error>) -> Self {
    Self {
      kind,
      error: error.into(),
      details: None,
    }
  }

  pub fn with_details(
    mut self,
    details: serde_json::Value,
  ) -> Self {
    self.details = Some(details);
    self
  }

  pub fn validation(msg: impl fmt::Display) -> Self {
    Self::new(Kind::Validation, anyhow::anyhow!("{msg}"))
  }

  pub fn not_found(msg: impl fmt::Display) -> Self {
    Self::new(Kind::NotFound, anyhow::anyhow!("{msg}"))
  }

  pub fn conflict(msg: impl fmt::Display) -> Self {
    Self::new(Kind::Conflict, anyhow::anyhow!("{msg}"))
  }

  pub fn forbidden(msg: impl fmt::Display) -> Self {
    Self::new(Kind::Forbidden, anyhow::anyhow!("{msg}"))
  }

  pub fn unauthenticated(msg: impl fmt::Display) -> Self {
    Self::new(Kind::Unauthenticated, anyhow::anyhow!("{msg}"))
  }

  pub fn not_implemented(msg: impl fmt::Display) -> Self {
    Self::new(Kind::NotImplemented, anyhow::anyhow!("{msg}"))
  }

  pub fn upstream_unavailable(msg: impl fmt::Display) -> Self {
    Self::new(Kind::UpstreamUnavailable, anyhow::anyhow!("{msg}"))
  }

  pub fn timeout(msg: impl fmt::Display) -> Self {
    Self::new(Kind::Timeout, anyhow::anyhow!("{msg}"))
  }

  pub fn quota(msg: impl fmt::Display) -> Self {
    Self::new(Kind::Quota, anyhow::anyhow!("{msg}"))
  }
}

impl fmt::Debug for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?} ({:?})", self.error, self.kind)
  }
}

impl fmt::Display for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.error)
  }
}

impl std::error::Error for ApiError {}

/// Anything that isn't explicitly tagged with a [`Kind`] is `internal`,
/// matching spec.md §7 ("unexpected" -> 500).
impl From<anyhow::Error> for ApiError {
  fn from(error: anyhow::Error) -> Self {
    Self {
      kind: Kind::Internal,
      error,
      details: None,
    }
  }
}

#[derive(Serialize)]
struct ErrorBody {
  error: String,
  code: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    if self.kind == Kind::Internal {
      tracing::error!("internal error | {:#}", self.error);
    }
    let body = ErrorBody {
      error: format!("{:#}", self.error),
      code: self.kind.code(),
      details: self.details,
    };
    (self.kind.status(), Json(body)).into_response()
  }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Extension trait to tag an existing [`anyhow::Result`] with a [`Kind`]
/// at the call site, mirroring the teacher's `.context(...)` chaining.
pub trait KindExt<T> {
  fn kind(self, kind: Kind) -> ApiResult<T>;
}

impl<T, E: Into<anyhow::Error>> KindExt<T> for Result<T, E> {
  fn kind(self, kind: Kind) -> ApiResult<T> {
    self.map_err(|e| ApiError::new(kind, e.into()))
  }
}
