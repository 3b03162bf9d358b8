//! Certificate renewal scheduler (spec.md §4.9 "Renewal scanner"): runs
//! once shortly after startup and then daily, driving
//! [`glinr_acme::CertificatePipeline::renew_scan`]. A no-op when no ACME
//! provider is wired ([`state::cert_pipeline`] is `None`).

use std::collections::HashMap;
use std::time::Duration;

use glinr_acme::DomainConfig;
use glinr_store::entities::{CertificateStatus, CertificateType};
use tracing::warn;

use crate::domain::resolve_domain_config;
use crate::state;

/// Delay before the first scan, giving the process time to settle after
/// startup (spec.md §4.9: renewal is a periodic background concern, not
/// something that needs to race the HTTP listener).
const INITIAL_DELAY: Duration = Duration::from_secs(5 * 60);
const SCAN_INTERVAL: Duration = Duration::from_secs(24 * 3_600);

/// Runs forever: one scan after [`INITIAL_DELAY`], then one every
/// [`SCAN_INTERVAL`]. Spawned as a background task from `main`, and a
/// no-op on processes with no ACME client configured.
pub async fn run() {
  let Some(pipeline) = state::cert_pipeline() else {
    return;
  };

  tokio::time::sleep(INITIAL_DELAY).await;
  loop {
    if let Err(e) = scan_once(pipeline).await {
      warn!(error = %e, "certificate renewal scan failed");
    }
    tokio::time::sleep(SCAN_INTERVAL).await;
  }
}

/// `renew_scan` takes a synchronous `Fn(&str) -> DomainConfig` since it
/// paces ACME calls sequentially without yielding per-domain I/O of its
/// own; the async `DomainConfig` resolution happens once, up front, into
/// a lookup table the closure can consult without awaiting.
async fn scan_once(pipeline: &glinr_acme::CertificatePipeline) -> glinr_response::ApiResult<()> {
  let certs = state::store()
    .list_certificates()
    .await
    .map_err(crate::error::store_err)?;

  let mut configs: HashMap<String, DomainConfig> = HashMap::new();
  for cert in certs
    .iter()
    .filter(|c| c.cert_type == CertificateType::Acme && c.status == CertificateStatus::Active)
  {
    if configs.contains_key(&cert.domain) {
      continue;
    }
    let config = resolve_domain_config(&cert.domain).await?;
    configs.insert(cert.domain.clone(), config);
  }

  let fallback = DomainConfig {
    auto_manage: false,
    dns_provider: None,
    public_edge_configured: glinr_config::config().public_edge.is_configured(),
  };

  pipeline
    .renew_scan(|domain| configs.get(domain).cloned().unwrap_or_else(|| fallback.clone()))
    .await
    .map_err(crate::error::acme_err)
}
