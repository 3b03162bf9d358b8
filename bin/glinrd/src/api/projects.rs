//! `/v1/projects` (spec.md §6): project CRUD. Deletion cascades to
//! services and routes at the Store level (`ON DELETE CASCADE`) and tears
//! down the project's network fabric here, since the engine has no
//! foreign-key mechanism of its own.

use axum::{Json, extract::Path};
use glinr_store::entities::{AuditAction, Project};
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::error::store_err;
use crate::state;

pub async fn list(_auth: AuthContext) -> glinr_response::ApiResult<Json<Vec<Project>>> {
  Ok(Json(state::store().list_projects().await.map_err(store_err)?))
}

#[derive(Deserialize)]
pub struct CreateProjectBody {
  pub name: String,
  pub slug: String,
}

pub async fn create(
  auth: AuthContext,
  Json(body): Json<CreateProjectBody>,
) -> glinr_response::ApiResult<Json<Project>> {
  auth.require_write()?;
  let store = state::store();
  let project = store.create_project(&body.name, &body.slug).await.map_err(store_err)?;
  store
    .record_audit(
      &auth.token_name,
      AuditAction::ProjectCreate,
      "project",
      &project.id.to_string(),
      serde_json::json!({ "name": project.name, "slug": project.slug }),
    )
    .await
    .map_err(store_err)?;
  Ok(Json(project))
}

pub async fn get(
  _auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<Project>> {
  Ok(Json(state::store().get_project(id).await.map_err(store_err)?))
}

pub async fn delete(
  auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<()> {
  auth.require_admin()?;
  let store = state::store();
  store.delete_project(id).await.map_err(store_err)?;
  let _ = state::network_fabric().remove_network(id).await;
  store
    .record_audit(
      &auth.token_name,
      AuditAction::ProjectDelete,
      "project",
      &id.to_string(),
      serde_json::json!({}),
    )
    .await
    .map_err(store_err)?;
  Ok(())
}
