//! `/v1/routes` and the project-scoped `/v1/projects/:id/routes`
//! (spec.md §6): ingress declarations. Every mutation re-renders and
//! reloads the reverse-proxy config, since routes are exactly the input
//! `glinr_proxy::render` consumes (spec.md §4.7).

use axum::{Json, extract::Path};
use glinr_store::entities::{AuditAction, Route};
use glinr_store::route::NewRoute;
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::store_err;
use crate::proxy_reload::reload_proxy;
use crate::state;

pub async fn list_all(_auth: AuthContext) -> glinr_response::ApiResult<Json<Vec<Route>>> {
  Ok(Json(state::store().get_all_routes().await.map_err(store_err)?))
}

pub async fn list_for_service(
  _auth: AuthContext,
  Path(service_id): Path<i64>,
) -> glinr_response::ApiResult<Json<Vec<Route>>> {
  Ok(Json(
    state::store().list_routes(service_id).await.map_err(store_err)?,
  ))
}

#[derive(Deserialize)]
pub struct CreateRouteBody {
  pub domain: String,
  #[serde(default)]
  pub path: Option<String>,
  pub port: u16,
  #[serde(default)]
  pub tls: bool,
}

pub async fn create(
  auth: AuthContext,
  Path(service_id): Path<i64>,
  Json(body): Json<CreateRouteBody>,
) -> glinr_response::ApiResult<Json<Route>> {
  auth.require_write()?;
  let store = state::store();
  let route = store
    .create_route(NewRoute {
      service_id,
      domain: body.domain,
      path: body.path,
      port: body.port,
      tls: body.tls,
    })
    .await
    .map_err(store_err)?;
  store
    .record_audit(
      &auth.token_name,
      AuditAction::RouteCreate,
      "route",
      &route.id.to_string(),
      serde_json::json!({ "domain": route.domain }),
    )
    .await
    .map_err(store_err)?;
  if let Err(e) = reload_proxy().await {
    tracing::warn!(error = %e, "route created but proxy reload failed");
  }
  Ok(Json(route))
}

pub async fn get(_auth: AuthContext, Path(id): Path<i64>) -> glinr_response::ApiResult<Json<Route>> {
  Ok(Json(state::store().get_route(id).await.map_err(store_err)?))
}

pub async fn delete(auth: AuthContext, Path(id): Path<i64>) -> glinr_response::ApiResult<()> {
  auth.require_write()?;
  let store = state::store();
  store.delete_route(id).await.map_err(store_err)?;
  store
    .record_audit(
      &auth.token_name,
      AuditAction::RouteDelete,
      "route",
      &id.to_string(),
      serde_json::json!({}),
    )
    .await
    .map_err(store_err)?;
  if let Err(e) = reload_proxy().await {
    tracing::warn!(error = %e, "route deleted but proxy reload failed");
  }
  Ok(())
}
