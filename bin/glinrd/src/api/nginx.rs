//! `/v1/nginx/*` (spec.md §6): the reverse-proxy's reload/status/config/
//! validate surface, thin wrappers over [`crate::proxy_reload`] and
//! [`glinr_proxy::Reloader`].

use axum::Json;
use glinr_proxy::ReloadStatus;

use crate::auth::AuthContext;
use crate::error::store_err;
use crate::proxy_reload::reload_proxy;
use crate::state;

pub async fn reload(auth: AuthContext) -> glinr_response::ApiResult<Json<ReloadStatus>> {
  auth.require_admin()?;
  reload_proxy().await?;
  Ok(Json(state::reloader().status().await))
}

pub async fn status(_auth: AuthContext) -> Json<ReloadStatus> {
  Json(state::reloader().status().await)
}

#[derive(serde::Serialize)]
pub struct ConfigBody {
  config: String,
}

/// `GET /v1/nginx/config` (spec.md §6): renders the current snapshot
/// without reloading, for inspection.
pub async fn config(_auth: AuthContext) -> glinr_response::ApiResult<Json<ConfigBody>> {
  let store = state::store();
  let routes = store.get_all_routes().await.map_err(store_err)?;
  let certs = store.list_certificates().await.map_err(store_err)?;

  let route_inputs: Vec<glinr_proxy::RouteInput> = routes
    .iter()
    .map(|r| glinr_proxy::RouteInput {
      domain: r.domain.clone(),
      path: r.path_or_root().to_string(),
      service_id: r.service_id,
      port: r.port,
      tls: r.tls,
    })
    .collect();
  let certs_dir = glinr_config::config().certs_dir();
  let mut certs_by_domain = std::collections::HashMap::new();
  for cert in certs
    .iter()
    .filter(|c| c.status == glinr_store::entities::CertificateStatus::Active)
  {
    let (cert_path, key_path) = glinr_proxy::cert_paths(&certs_dir, &cert.domain);
    certs_by_domain.insert(
      cert.domain.clone(),
      glinr_proxy::CertInput {
        cert_path: cert_path.to_string_lossy().into_owned(),
        key_path: key_path.to_string_lossy().into_owned(),
      },
    );
  }
  let challenge_dir = glinr_config::config().challenges_dir();
  let output = glinr_proxy::render(&route_inputs, &certs_by_domain, &challenge_dir.to_string_lossy());
  Ok(Json(ConfigBody { config: output.config }))
}

#[derive(serde::Serialize)]
pub struct ValidateBody {
  valid: bool,
  error: Option<String>,
}

pub async fn validate(auth: AuthContext) -> glinr_response::ApiResult<Json<ValidateBody>> {
  auth.require_admin()?;
  let valid = state::reloader().validate().await;
  let error = if valid {
    None
  } else {
    state::reloader().status().await.last_error
  };
  Ok(Json(ValidateBody { valid, error }))
}
