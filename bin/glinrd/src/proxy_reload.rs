//! Renders the current route/certificate snapshot and reloads the proxy
//! (spec.md §4.7, §5 "every reload observes a snapshot taken before
//! rendering"). Shared by the route handlers and the certificate
//! pipeline's own reload path ([`glinr_acme::CertificatePipeline::reload_proxy`]),
//! which cannot call back into this binary crate, so the two stay
//! independently grounded on the same `glinr_proxy::render` call.

use std::collections::HashMap;

use glinr_proxy::{CertInput, RouteInput};
use glinr_store::entities::{AuditAction, CertificateStatus};

use crate::error::{reload_err, store_err};
use crate::state;

/// Re-renders from the Store and reloads nginx, auditing the outcome
/// (spec.md §4.7 "Reload"). Called after every route mutation.
pub async fn reload_proxy() -> glinr_response::ApiResult<()> {
  let store = state::store();
  let routes = store.get_all_routes().await.map_err(store_err)?;
  let certs = store.list_certificates().await.map_err(store_err)?;

  let route_inputs: Vec<RouteInput> = routes
    .iter()
    .map(|r| RouteInput {
      domain: r.domain.clone(),
      path: r.path_or_root().to_string(),
      service_id: r.service_id,
      port: r.port,
      tls: r.tls,
    })
    .collect();

  let certs_dir = glinr_config::config().certs_dir();
  let mut certs_by_domain: HashMap<String, CertInput> = HashMap::new();
  for cert in certs.iter().filter(|c| c.status == CertificateStatus::Active) {
    let (cert_path, key_path) = glinr_proxy::cert_paths(&certs_dir, &cert.domain);
    certs_by_domain.insert(
      cert.domain.clone(),
      CertInput {
        cert_path: cert_path.to_string_lossy().into_owned(),
        key_path: key_path.to_string_lossy().into_owned(),
      },
    );
  }

  let challenge_dir = glinr_config::config().challenges_dir();
  let output = glinr_proxy::render(
    &route_inputs,
    &certs_by_domain,
    &challenge_dir.to_string_lossy(),
  );

  state::reloader()
    .reload(&output.config, &output.hash_hex, glinr_store::entities::now_ms())
    .await
    .map_err(reload_err)?;

  store
    .record_audit(
      "system",
      AuditAction::NginxReload,
      "proxy",
      "config",
      serde_json::json!({ "hash": output.hash_hex }),
    )
    .await
    .map_err(store_err)?;
  Ok(())
}
