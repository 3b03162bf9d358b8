//! Bearer/query/session-cookie authentication (spec.md §6: "Authentication
//! is either a bearer token in `Authorization` or, for WebSocket upgrades,
//! a `token` query parameter"), plus the session cookie issued by
//! `POST /v1/auth/login`.
//!
//! There is no session table: the cookie simply carries the plain token
//! value, verified through the same [`glinr_store::Store::verify_token`]
//! path as the `Authorization` header, since a JWT/HMAC crate is not part
//! of the dependency stack this control plane ships with.

pub mod ratelimit;

use axum::{
  extract::{FromRequestParts, Query},
  http::{header, request::Parts},
};
use glinr_response::{ApiError, ApiResult};
use glinr_store::entities::Role;
use serde::Deserialize;

use crate::state;

/// Name of the session cookie issued by `POST /v1/auth/login`.
pub const SESSION_COOKIE: &str = "glinr_session";

/// The authenticated caller of the current request: the token's `name`
/// (used as the audit `actor`) and its [`Role`] (spec.md §6 roles table).
pub struct AuthContext {
  pub token_name: String,
  pub role: Role,
}

impl AuthContext {
  /// `admin` and `deployer` may mutate lifecycle/routes/certs; `viewer`
  /// is read-only (spec.md §6).
  pub fn require_write(&self) -> ApiResult<()> {
    match self.role {
      Role::Admin | Role::Deployer => Ok(()),
      Role::Viewer => Err(ApiError::forbidden("viewer role is read-only")),
    }
  }

  /// Token management and secret-bearing reads are `admin`-only.
  pub fn require_admin(&self) -> ApiResult<()> {
    match self.role {
      Role::Admin => Ok(()),
      _ => Err(ApiError::forbidden("admin role required")),
    }
  }
}

#[derive(Deserialize)]
struct TokenQuery {
  token: Option<String>,
}

impl<S> FromRequestParts<S> for AuthContext
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, axum_state: &S) -> Result<Self, Self::Rejection> {
    let plain = match bearer_token(parts) {
      Some(token) => Some(token),
      None => match query_token(parts, axum_state).await {
        Some(token) => Some(token),
        None => cookie_token(parts),
      },
    };

    let Some(plain) = plain else {
      return Err(ApiError::unauthenticated(
        "missing bearer token, query token, or session cookie",
      ));
    };

    let (token_name, role) = state::store()
      .verify_token(&plain)
      .await
      .map_err(|_| ApiError::unauthenticated("invalid or unknown token"))?;

    Ok(Self { token_name, role })
  }
}

fn bearer_token(parts: &Parts) -> Option<String> {
  let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  value.strip_prefix("Bearer ").map(str::to_string)
}

async fn query_token<S: Send + Sync>(parts: &mut Parts, state: &S) -> Option<String> {
  // A missing or unparsable query string just falls through to the next
  // auth source rather than rejecting outright.
  Query::<TokenQuery>::from_request_parts(parts, state)
    .await
    .ok()
    .and_then(|Query(q)| q.token)
}

fn cookie_token(parts: &Parts) -> Option<String> {
  let raw = parts.headers.get(header::COOKIE)?.to_str().ok()?;
  raw.split(';').find_map(|pair| {
    let (name, value) = pair.trim().split_once('=')?;
    (name == SESSION_COOKIE).then(|| value.to_string())
  })
}

/// Extracts the caller's remote address for [`ratelimit::AuthRateLimiter`],
/// honoring a reverse-proxy-set `X-Forwarded-For` the same way
/// `glinr_proxy`'s generated config would see it, falling back to the
/// direct peer address.
pub fn client_ip(headers: &axum::http::HeaderMap, peer: Option<std::net::SocketAddr>) -> String {
  if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
    if let Some(first) = forwarded.split(',').next() {
      return first.trim().to_string();
    }
  }
  peer.map(|a| a.ip().to_string()).unwrap_or_else(|| "unknown".to_string())
}
