//! Domain verification and DNS-provider resolution glue (spec.md §4.8):
//! bridges the durable `Domain`/`DomainVerification` rows in [`glinr_store`]
//! to the transport-agnostic algorithms in [`glinr_dns`].

use std::sync::Arc;

use glinr_dns::{CloudflareProvider, DnsProvider, PublicEdge};
use glinr_response::{ApiError, ApiResult};
use glinr_store::entities::{AuditAction, VerificationStatus};
use tracing::warn;

use crate::error::{provider_err, store_err};
use crate::state;

fn public_edge() -> PublicEdge {
  let edge = &glinr_config::config().public_edge;
  PublicEdge {
    host: edge.host.clone(),
    ipv4: edge.ipv4,
    ipv6: edge.ipv6,
  }
}

/// Builds the `DnsProvider` capability for a stored `DnsProvider` row,
/// shared by [`issue_verification`]'s auto-provisioning and
/// [`resolve_domain_config`]'s DNS-01 challenge mode.
fn build_provider(row: &glinr_store::entities::DnsProvider) -> ApiResult<Arc<dyn DnsProvider>> {
  match row.provider_type.as_str() {
    "cloudflare" => Ok(Arc::new(
      CloudflareProvider::from_config(&row.config_json).map_err(provider_err)?,
    )),
    other => Err(ApiError::validation(format!(
      "unsupported dns provider type: {other}"
    ))),
  }
}

/// Issues a fresh verification challenge for `domain` (spec.md §4.8
/// "Issuing a verification"), persisting the row as `pending`. Returns
/// `not-implemented` when DNS verification is disabled process-wide.
/// For `auto_manage` domains, immediately provisions the TXT challenge
/// record (and the A/CNAME target, when applicable) via the configured
/// DNS provider.
pub async fn issue_verification(domain: &str) -> ApiResult<glinr_store::entities::DomainVerification> {
  if !glinr_config::config().dns_verify_enabled {
    return Err(ApiError::not_implemented("DNS verification is disabled"));
  }

  let issued = glinr_dns::issue(domain, &public_edge());
  let method = match issued.method {
    glinr_dns::Method::Txt => glinr_store::entities::VerificationMethod::Txt,
    glinr_dns::Method::A => glinr_store::entities::VerificationMethod::A,
    glinr_dns::Method::Cname => glinr_store::entities::VerificationMethod::Cname,
  };
  let store = state::store();
  let verification = store
    .create_domain_verification(domain, method, &issued.token)
    .await
    .map_err(store_err)?;

  if let Ok(domain_row) = store.get_domain(domain).await {
    if domain_row.auto_manage {
      if let Some(provider_id) = domain_row.provider_id {
        if let Err(e) = auto_provision(domain, provider_id, &issued).await {
          warn!(domain, error = %e, "auto-managed dns provisioning failed");
        }
      }
    }
  }

  store
    .record_audit(
      "system",
      AuditAction::DomainVerifyIssue,
      "domain",
      domain,
      serde_json::json!({ "method": method.to_string() }),
    )
    .await
    .map_err(store_err)?;
  Ok(verification)
}

/// Creates the TXT challenge record plus the A/CNAME target record via
/// the domain's DNS provider (spec.md §4.8: "immediately call the DNS
/// provider to create the records").
async fn auto_provision(
  domain: &str,
  provider_id: i64,
  issued: &glinr_dns::IssuedVerification,
) -> ApiResult<()> {
  let store = state::store();
  let row = store.get_dns_provider(provider_id).await.map_err(store_err)?;
  let provider = build_provider(&row)?;

  provider
    .create_txt_record(&issued.txt_name, &issued.token)
    .await
    .map_err(provider_err)?;

  match (issued.method, &issued.target_hint) {
    (glinr_dns::Method::A, Some(target)) => {
      provider.create_a_record(domain, target).await.map_err(provider_err)?;
    }
    (glinr_dns::Method::Cname, Some(target)) => {
      provider
        .create_cname_record(domain, target)
        .await
        .map_err(provider_err)?;
    }
    _ => {}
  }
  Ok(())
}

/// Re-checks the latest pending/failed verification for `domain` against
/// live DNS (spec.md §4.8 "Checking a verification").
pub async fn check_verification(domain: &str) -> ApiResult<VerificationStatus> {
  let store = state::store();
  let verification = store
    .latest_verification(domain)
    .await
    .map_err(store_err)?
    .ok_or_else(|| glinr_response::ApiError::not_found(format!("no verification issued for {domain}")))?;

  let ok = glinr_dns::check(
    state::dns_resolver(),
    domain,
    &verification.challenge,
    &public_edge(),
  )
  .await;
  let status = if ok {
    VerificationStatus::Verified
  } else {
    VerificationStatus::Failed
  };
  store
    .set_verification_status(verification.id, status)
    .await
    .map_err(store_err)?;
  store
    .record_audit(
      "system",
      AuditAction::DomainVerifyCheck,
      "domain",
      domain,
      serde_json::json!({ "status": status.to_string() }),
    )
    .await
    .map_err(store_err)?;
  Ok(status)
}

/// Resolves the issuance/renewal `DomainConfig` for `domain` from its
/// durable `Domain` row (spec.md §4.9): DNS-01 when auto-managed with a
/// provider on file, else HTTP-01 when the public edge is reachable.
pub async fn resolve_domain_config(domain: &str) -> ApiResult<glinr_acme::DomainConfig> {
  let store = state::store();
  let auto_manage_provider = match store.get_domain(domain).await {
    Ok(row) => (row.auto_manage, row.provider_id),
    Err(glinr_store::StoreError::NotFound(_)) => (false, None),
    Err(e) => return Err(store_err(e)),
  };

  let dns_provider: Option<Arc<dyn DnsProvider>> = match auto_manage_provider {
    (true, Some(provider_id)) => {
      let row = store.get_dns_provider(provider_id).await.map_err(store_err)?;
      Some(build_provider(&row)?)
    }
    _ => None,
  };

  Ok(glinr_acme::DomainConfig {
    auto_manage: auto_manage_provider.0,
    dns_provider,
    public_edge_configured: glinr_config::config().public_edge.is_configured(),
  })
}
