use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use glinr_dns::DnsProvider;
use glinr_proxy::{CertInput, Reloader, RouteInput};
use glinr_store::entities::{
  AuditAction, CertificateStatus, CertificateType, VerificationStatus, now_ms,
};
use glinr_store::Store;
use tracing::{info, warn};

use crate::challenge::ChallengeDir;
use crate::client::{AcmeClient, ChallengeMode, IssuedCertificate};
use crate::error::{AcmeError, AcmeResult};

/// 30 days, spec.md §4.9 "Renewal scanner" window.
const RENEWAL_WINDOW_MS: i64 = 30 * 24 * 3_600_000;
/// Pacing between renewals in a batch (spec.md §4.9 "Sleeps ~2s").
const RENEWAL_PACING: Duration = Duration::from_secs(2);

/// Outcome of a manual "renew by id" request (spec.md §4.9 "Manual API").
pub enum ManualRenewOutcome {
  NotImplemented,
  Renewed,
  Accepted { message: String },
}

#[derive(Clone)]
pub struct DomainConfig {
  pub auto_manage: bool,
  pub dns_provider: Option<Arc<dyn DnsProvider>>,
  pub public_edge_configured: bool,
}

/// Ties together domain verification, ACME issuance, encrypted storage,
/// and proxy reload (spec.md §4.9). One instance is process-global.
pub struct CertificatePipeline {
  store: Store,
  acme: Arc<dyn AcmeClient>,
  challenge_dir: Arc<ChallengeDir>,
  reloader: Arc<Reloader>,
  challenge_url_path: String,
  certs_dir: PathBuf,
}

impl CertificatePipeline {
  pub fn new(
    store: Store,
    acme: Arc<dyn AcmeClient>,
    challenge_dir: Arc<ChallengeDir>,
    reloader: Arc<Reloader>,
    challenge_url_path: impl Into<String>,
    certs_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      store,
      acme,
      challenge_dir,
      reloader,
      challenge_url_path: challenge_url_path.into(),
      certs_dir: certs_dir.into(),
    }
  }

  /// Runs the issuance flow for one domain (spec.md §4.9 steps 1-5),
  /// requiring a `verified` [`glinr_store::entities::DomainVerification`]
  /// row. Reload is invoked but its failure does not undo the issuance.
  pub async fn issue_for_domain(
    &self,
    domain: &str,
    config: &DomainConfig,
  ) -> AcmeResult<()> {
    let verification = self
      .store
      .latest_verification(domain)
      .await?
      .ok_or(AcmeError::NotVerified)?;
    if verification.status != VerificationStatus::Verified {
      return Err(AcmeError::NotVerified);
    }

    let mode = if config.auto_manage {
      match &config.dns_provider {
        Some(provider) => ChallengeMode::Dns01(provider.clone()),
        None if config.public_edge_configured => ChallengeMode::Http01(self.challenge_dir.clone()),
        None => return Err(AcmeError::NoChallengeMethod),
      }
    } else if config.public_edge_configured {
      ChallengeMode::Http01(self.challenge_dir.clone())
    } else {
      return Err(AcmeError::NoChallengeMethod);
    };

    let issued = self.acme.issue(domain, &mode).await?;
    self.persist_and_reload(domain, issued).await?;

    self
      .store
      .record_audit(
        "system",
        AuditAction::CertificateIssue,
        "certificate",
        domain,
        serde_json::json!({ "domain": domain }),
      )
      .await?;

    Ok(())
  }

  async fn persist_and_reload(
    &self,
    domain: &str,
    issued: IssuedCertificate,
  ) -> AcmeResult<()> {
    let encrypted_key = self
      .store
      .master_key
      .encrypt_str(&issued.pem_key)
      .map_err(AcmeError::Other)?;

    // Materialize the PEM files the renderer's `ssl_certificate`/
    // `ssl_certificate_key` directives point at before anything reloads
    // against them (spec.md §6 "Persisted state layout", §8 scenario 3).
    glinr_proxy::write_cert_files(
      &self.certs_dir,
      domain,
      &issued.pem_cert,
      Some(&issued.pem_chain),
      &issued.pem_key,
    )
    .await?;

    let now = now_ms();
    self
      .store
      .issue_certificate(glinr_store::certificate::NewCertificate {
        domain: domain.to_string(),
        cert_type: CertificateType::Acme,
        issuer: Some("acme".to_string()),
        not_before: Some(now),
        not_after: Some(now + 60 * 24 * 3_600_000),
        pem_cert: Some(issued.pem_cert),
        pem_chain: Some(issued.pem_chain),
        pem_key_enc: Some(encrypted_key.ciphertext_hex),
        pem_key_nonce: Some(encrypted_key.nonce_hex),
      })
      .await?;

    if let Err(e) = self.reload_proxy().await {
      warn!(%domain, error = %e, "proxy reload after certificate issuance failed");
    }
    Ok(())
  }

  /// Renders and reloads from the current route/certificate snapshot
  /// (spec.md §5 "every reload observes a snapshot ... taken before
  /// rendering").
  pub async fn reload_proxy(&self) -> anyhow::Result<()> {
    let routes = self.store.get_all_routes().await?;
    let certs = self.store.list_certificates().await?;
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
    let mut certs_by_domain: HashMap<String, CertInput> = HashMap::new();
    for cert in certs.iter().filter(|c| c.status == CertificateStatus::Active) {
      let (cert_path, key_path) = glinr_proxy::cert_paths(&self.certs_dir, &cert.domain);
      certs_by_domain.insert(
        cert.domain.clone(),
        CertInput {
          cert_path: cert_path.to_string_lossy().into_owned(),
          key_path: key_path.to_string_lossy().into_owned(),
        },
      );
    }
    let output = glinr_proxy::render(&route_inputs, &certs_by_domain, &self.challenge_url_path);
    self
      .reloader
      .reload(&output.config, &output.hash_hex, now_ms())
      .await?;
    self
      .store
      .record_audit(
        "system",
        AuditAction::NginxReload,
        "proxy",
        "config",
        serde_json::json!({ "hash": output.hash_hex }),
      )
      .await?;
    Ok(())
  }

  /// Daily (and once, 5 minutes after start) sweep over certificates
  /// within [`RENEWAL_WINDOW_MS`] of expiry (spec.md §4.9 "Renewal
  /// scanner"). `domain_config` resolves each eligible domain's current
  /// challenge mode, since auto-managed DNS is preferred fresh each time.
  pub async fn renew_scan<F>(&self, domain_config: F) -> AcmeResult<()>
  where
    F: Fn(&str) -> DomainConfig,
  {
    let expiring = self.store.list_certs_expiring_soon(RENEWAL_WINDOW_MS).await?;
    let total_scanned = expiring.len();
    let mut successful = 0usize;
    let mut outcomes = Vec::new();

    for (i, cert) in expiring.iter().enumerate() {
      if cert.cert_type != CertificateType::Acme {
        continue;
      }
      let config = domain_config(&cert.domain);
      match self.issue_for_domain(&cert.domain, &config).await {
        Ok(()) => {
          successful += 1;
          outcomes.push(serde_json::json!({ "domain": cert.domain, "ok": true }));
        }
        Err(e) => {
          warn!(domain = %cert.domain, error = %e, "certificate renewal failed");
          outcomes.push(serde_json::json!({ "domain": cert.domain, "ok": false, "error": e.to_string() }));
        }
      }
      if i + 1 < expiring.len() {
        tokio::time::sleep(RENEWAL_PACING).await;
      }
    }

    if let Err(e) = self.reload_proxy().await {
      warn!(error = %e, "batched reload after renewal scan failed");
    }

    self
      .store
      .record_audit(
        "system",
        AuditAction::CertificateRenew,
        "certificate",
        "batch",
        serde_json::json!({
          "total_scanned": total_scanned,
          "eligible": outcomes.len(),
          "successful": successful,
          "outcomes": outcomes,
        }),
      )
      .await?;
    info!(total_scanned, successful, "certificate renewal scan complete");
    Ok(())
  }

  /// Manual "renew certificate by id" (spec.md §4.9 "Manual API").
  pub async fn manual_renew(
    &self,
    cert_id: i64,
    config: Option<&DomainConfig>,
  ) -> AcmeResult<ManualRenewOutcome> {
    let cert = self.store.get_certificate(cert_id).await?;
    match cert.cert_type {
      CertificateType::Acme => match config {
        None => Ok(ManualRenewOutcome::NotImplemented),
        Some(config) => {
          self.issue_for_domain(&cert.domain, config).await?;
          Ok(ManualRenewOutcome::Renewed)
        }
      },
      CertificateType::Manual | CertificateType::Custom => Ok(ManualRenewOutcome::Accepted {
        message: "manual and custom certificates are renewed by re-uploading, not automatically"
          .to_string(),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use glinr_crypto::MasterKey;
  use glinr_store::entities::VerificationMethod;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct FakeAcme {
    calls: AtomicUsize,
  }

  #[async_trait]
  impl AcmeClient for FakeAcme {
    async fn issue(&self, domain: &str, _mode: &ChallengeMode) -> AcmeResult<IssuedCertificate> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(IssuedCertificate {
        pem_cert: format!("cert-for-{domain}"),
        pem_chain: "chain".to_string(),
        pem_key: "key".to_string(),
      })
    }
  }

  fn test_pipeline() -> (CertificatePipeline, Arc<FakeAcme>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open_in_memory(MasterKey::generate()).unwrap();
    let acme = Arc::new(FakeAcme { calls: AtomicUsize::new(0) });
    let challenge_dir = Arc::new(ChallengeDir::new(dir.path().join("challenges")));
    let config_path = dir.path().join("nginx.conf");
    let reloader = Arc::new(Reloader::new(config_path, "true", "true"));
    let pipeline = CertificatePipeline::new(
      store,
      acme.clone(),
      challenge_dir,
      reloader,
      "/challenges".to_string(),
      dir.path().join("certs"),
    );
    (pipeline, acme, dir)
  }

  #[tokio::test]
  async fn issuance_requires_verified_domain() {
    let (pipeline, _acme, _dir) = test_pipeline();
    let config = DomainConfig {
      auto_manage: false,
      dns_provider: None,
      public_edge_configured: true,
    };
    let err = pipeline.issue_for_domain("ex.test", &config).await.unwrap_err();
    assert!(matches!(err, AcmeError::NotVerified));
  }

  #[tokio::test]
  async fn issuance_persists_active_certificate() {
    let (pipeline, acme, _dir) = test_pipeline();
    pipeline
      .store
      .create_domain_verification("ex.test", VerificationMethod::A, "tok")
      .await
      .unwrap();
    let verification = pipeline.store.latest_verification("ex.test").await.unwrap().unwrap();
    pipeline
      .store
      .set_verification_status(verification.id, VerificationStatus::Verified)
      .await
      .unwrap();

    let config = DomainConfig {
      auto_manage: false,
      dns_provider: None,
      public_edge_configured: true,
    };
    pipeline.issue_for_domain("ex.test", &config).await.unwrap();

    assert_eq!(acme.calls.load(Ordering::SeqCst), 1);
    let active = pipeline.store.get_active_certificate("ex.test").await.unwrap().unwrap();
    assert_eq!(active.status, CertificateStatus::Active);
    assert_eq!(active.pem_cert.unwrap(), "cert-for-ex.test");
  }

  /// spec.md §8 scenario 3: a manual upload (simulated here through ACME
  /// issuance, same `persist_and_reload` path) must materialize real
  /// files so a subsequent render+validate cycle has something to
  /// validate against.
  #[tokio::test]
  async fn issuance_materializes_cert_files_before_reload() {
    let (pipeline, _acme, dir) = test_pipeline();
    pipeline
      .store
      .create_domain_verification("ex.test", VerificationMethod::A, "tok")
      .await
      .unwrap();
    let verification = pipeline.store.latest_verification("ex.test").await.unwrap().unwrap();
    pipeline
      .store
      .set_verification_status(verification.id, VerificationStatus::Verified)
      .await
      .unwrap();

    let config = DomainConfig {
      auto_manage: false,
      dns_provider: None,
      public_edge_configured: true,
    };
    pipeline.issue_for_domain("ex.test", &config).await.unwrap();

    let (cert_path, key_path) = glinr_proxy::cert_paths(&dir.path().join("certs"), "ex.test");
    assert!(cert_path.exists(), "fullchain.pem was not written to disk");
    assert!(key_path.exists(), "privkey.pem was not written to disk");
    let cert_contents = std::fs::read_to_string(&cert_path).unwrap();
    assert!(cert_contents.contains("cert-for-ex.test"));
    assert!(cert_contents.contains("chain"));

    // The reload the pipeline runs as part of issuance is the proof this
    // isn't a file written after the fact: `reload()` uses `true`/`true`
    // as its validate/reload commands, but the render it produced now
    // references paths that genuinely exist.
    let status = pipeline.reloader.status().await;
    assert!(status.healthy);
  }
}
