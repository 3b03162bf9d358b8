//! `/v1/auth` (spec.md §6): exchanges a bearer token for a session cookie,
//! rate-limited per IP (spec.md §8 "Auth rate limit").

use axum::{
  Json,
  extract::ConnectInfo,
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use glinr_response::{ApiError, ApiResult};
use glinr_store::entities::Role;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::auth::{AuthContext, SESSION_COOKIE, client_ip, ratelimit::RateLimitDecision};
use crate::state;

#[derive(Deserialize)]
pub struct LoginBody {
  pub token: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
  name: String,
  role: Role,
}

pub async fn login(
  headers: HeaderMap,
  ConnectInfo(peer): ConnectInfo<SocketAddr>,
  Json(body): Json<LoginBody>,
) -> ApiResult<Response> {
  let ip = client_ip(&headers, Some(peer));
  let limiter = state::auth_rate_limiter();

  if let RateLimitDecision::Blocked(retry_after) = limiter.check(&ip).await {
    let mut response = ApiError::unauthenticated("too many failed login attempts").into_response();
    response.headers_mut().insert(
      header::RETRY_AFTER,
      retry_after.as_secs().to_string().parse().unwrap(),
    );
    return Ok(response);
  }

  let per_min = glinr_config::config().auth_rl_per_min;
  match state::store().verify_token(&body.token).await {
    Ok((name, role)) => {
      limiter.record_success(&ip).await;
      let cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Strict",
        body.token
      );
      let mut response = Json(LoginResponse { name, role }).into_response();
      response
        .headers_mut()
        .insert(header::SET_COOKIE, cookie.parse().unwrap());
      Ok(response)
    }
    Err(_) => {
      limiter.record_failure(&ip, per_min).await;
      Err(ApiError::unauthenticated("invalid token"))
    }
  }
}

pub async fn logout() -> impl IntoResponse {
  let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0");
  (
    StatusCode::OK,
    [(header::SET_COOKIE, cookie)],
  )
}

#[derive(Serialize)]
pub struct MeResponse {
  name: String,
  role: Role,
}

pub async fn me(auth: AuthContext) -> Json<MeResponse> {
  Json(MeResponse {
    name: auth.token_name,
    role: auth.role,
  })
}
