//! `/v1/tokens` (spec.md §6): admin-only token management. Tokens are
//! high-entropy random strings, not passwords — only the salted SHA-256
//! hash is ever persisted (spec.md §4.1 `VerifyToken`, SPEC_FULL.md §13).

use axum::{Json, extract::Path};
use glinr_store::entities::{AuditAction, Role, Token};
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::error::store_err;
use crate::state;

#[derive(Serialize)]
pub struct TokenSummary {
  name: String,
  role: Role,
  last_used_at: Option<i64>,
  created_at: i64,
}

impl From<Token> for TokenSummary {
  fn from(token: Token) -> Self {
    Self {
      name: token.name,
      role: token.role,
      last_used_at: token.last_used_at,
      created_at: token.created_at,
    }
  }
}

pub async fn list(auth: AuthContext) -> glinr_response::ApiResult<Json<Vec<TokenSummary>>> {
  auth.require_admin()?;
  let tokens = state::store().list_tokens().await.map_err(store_err)?;
  Ok(Json(tokens.into_iter().map(TokenSummary::from).collect()))
}

#[derive(Deserialize)]
pub struct CreateTokenBody {
  pub name: String,
  pub role: Role,
}

#[derive(Serialize)]
pub struct CreatedToken {
  name: String,
  role: Role,
  /// Plaintext, returned exactly once (spec.md §4.1: only the hash is
  /// ever persisted).
  token: String,
}

pub async fn create(
  auth: AuthContext,
  Json(body): Json<CreateTokenBody>,
) -> glinr_response::ApiResult<Json<CreatedToken>> {
  auth.require_admin()?;
  let store = state::store();
  let plain = glinr_crypto::random_hex_token();
  let salt = glinr_crypto::random_hex_token();
  let hash = glinr_crypto::hash_token(&plain, &salt);
  store
    .create_token(&body.name, &hash, &salt, body.role)
    .await
    .map_err(store_err)?;
  store
    .record_audit(
      &auth.token_name,
      AuditAction::TokenCreate,
      "token",
      &body.name,
      serde_json::json!({ "role": body.role.to_string() }),
    )
    .await
    .map_err(store_err)?;
  Ok(Json(CreatedToken {
    name: body.name,
    role: body.role,
    token: plain,
  }))
}

pub async fn delete(auth: AuthContext, Path(name): Path<String>) -> glinr_response::ApiResult<()> {
  auth.require_admin()?;
  let store = state::store();
  store.delete_token(&name).await.map_err(store_err)?;
  store
    .record_audit(&auth.token_name, AuditAction::TokenDelete, "token", &name, serde_json::json!({}))
    .await
    .map_err(store_err)?;
  Ok(())
}
