//! `/v1/certificates` (spec.md §6, §4.9): certificate CRUD plus the manual
//! renew action. `acme`-typed creation is asynchronous — it enqueues a
//! `cert_issue` job and returns the job for the caller to poll (spec.md
//! §4.6); `manual`/`custom` creation is synchronous, the PEM material is
//! supplied directly by the caller.

use axum::{Json, extract::Path};
use glinr_store::certificate::NewCertificate;
use glinr_store::entities::{AuditAction, Certificate, CertificateType, Job, JobType};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::error::{acme_err, store_err};
use crate::state;

pub async fn list(_auth: AuthContext) -> glinr_response::ApiResult<Json<Vec<Certificate>>> {
  Ok(Json(state::store().list_certificates().await.map_err(store_err)?))
}

#[derive(Deserialize)]
pub struct CreateCertificateBody {
  pub domain: String,
  pub cert_type: CertificateType,
  #[serde(default)]
  pub pem_cert: Option<String>,
  #[serde(default)]
  pub pem_chain: Option<String>,
  #[serde(default)]
  pub pem_key: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum CreateCertificateResponse {
  Issued(Certificate),
  Queued(Job),
}

/// `POST /v1/certificates` (spec.md §6). `acme` certificates are issued
/// asynchronously through the job queue (spec.md §4.6); `manual`/`custom`
/// certificates are uploaded and activated immediately (spec.md §4.9
/// "Manual API", `certificate_upload` audit action).
pub async fn create(
  auth: AuthContext,
  Json(body): Json<CreateCertificateBody>,
) -> glinr_response::ApiResult<Json<CreateCertificateResponse>> {
  auth.require_write()?;
  let store = state::store();

  match body.cert_type {
    CertificateType::Acme => {
      let job_id = Uuid::new_v4().to_string();
      let job = store
        .create_job(&job_id, JobType::CertIssue, serde_json::json!({ "domain": body.domain }))
        .await
        .map_err(store_err)?;
      state::job_queue().enqueue(job_id);
      Ok(Json(CreateCertificateResponse::Queued(job)))
    }
    cert_type @ (CertificateType::Manual | CertificateType::Custom) => {
      let pem_cert = body
        .pem_cert
        .ok_or_else(|| glinr_response::ApiError::validation("pem_cert is required for manual/custom certificates"))?;
      let pem_key = body
        .pem_key
        .ok_or_else(|| glinr_response::ApiError::validation("pem_key is required for manual/custom certificates"))?;
      let pem_chain = body.pem_chain;

      // Materialize the on-disk files the renderer's ssl_certificate
      // directives reference (spec.md §6 "Persisted state layout") before
      // anything tries to reload against them (spec.md §8 scenario 3).
      glinr_proxy::write_cert_files(
        &glinr_config::config().certs_dir(),
        &body.domain,
        &pem_cert,
        pem_chain.as_deref(),
        &pem_key,
      )
      .await
      .map_err(|e| glinr_response::ApiError::new(glinr_response::Kind::Internal, anyhow::Error::from(e)))?;

      let encrypted = store
        .master_key
        .encrypt_str(&pem_key)
        .map_err(|e| glinr_response::ApiError::new(glinr_response::Kind::Internal, e))?;
      let cert = store
        .issue_certificate(NewCertificate {
          domain: body.domain.clone(),
          cert_type,
          issuer: Some("manual".to_string()),
          not_before: None,
          not_after: None,
          pem_cert: Some(pem_cert),
          pem_chain,
          pem_key_enc: Some(encrypted.ciphertext_hex),
          pem_key_nonce: Some(encrypted.nonce_hex),
        })
        .await
        .map_err(store_err)?;
      store
        .record_audit(
          &auth.token_name,
          AuditAction::CertificateUpload,
          "certificate",
          &cert.id.to_string(),
          serde_json::json!({ "domain": cert.domain }),
        )
        .await
        .map_err(store_err)?;

      if let Err(e) = crate::proxy_reload::reload_proxy().await {
        warn!(domain = %cert.domain, error = ?e, "proxy reload after certificate upload failed");
      }
      Ok(Json(CreateCertificateResponse::Issued(cert)))
    }
  }
}

pub async fn get(
  _auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<Json<Certificate>> {
  Ok(Json(state::store().get_certificate(id).await.map_err(store_err)?))
}

pub async fn delete(auth: AuthContext, Path(id): Path<i64>) -> glinr_response::ApiResult<()> {
  auth.require_admin()?;
  state::store().delete_certificate(id).await.map_err(store_err)
}

#[derive(Serialize)]
#[serde(tag = "status")]
pub enum RenewResponse {
  #[serde(rename = "not-implemented")]
  NotImplemented,
  #[serde(rename = "renewed")]
  Renewed,
  #[serde(rename = "accepted")]
  Accepted { message: String },
}

/// `POST /v1/certificates/:id/renew` (spec.md §4.9 "Manual API"): 501 for
/// `acme` certificates when no ACME provider is wired, 200 when it is, 202
/// for `manual`/`custom` certificates.
pub async fn renew(
  auth: AuthContext,
  Path(id): Path<i64>,
) -> glinr_response::ApiResult<(axum::http::StatusCode, Json<RenewResponse>)> {
  auth.require_write()?;
  let store = state::store();
  let cert = store.get_certificate(id).await.map_err(store_err)?;

  let Some(pipeline) = state::cert_pipeline() else {
    return match cert.cert_type {
      CertificateType::Acme => Ok((
        axum::http::StatusCode::NOT_IMPLEMENTED,
        Json(RenewResponse::NotImplemented),
      )),
      CertificateType::Manual | CertificateType::Custom => Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(RenewResponse::Accepted {
          message: "manual and custom certificates are renewed by re-uploading, not automatically".to_string(),
        }),
      )),
    };
  };

  let config = crate::domain::resolve_domain_config(&cert.domain).await?;
  let outcome = pipeline.manual_renew(id, Some(&config)).await.map_err(acme_err)?;
  let (status, body) = match outcome {
    glinr_acme::ManualRenewOutcome::NotImplemented => {
      (axum::http::StatusCode::NOT_IMPLEMENTED, RenewResponse::NotImplemented)
    }
    glinr_acme::ManualRenewOutcome::Renewed => (axum::http::StatusCode::OK, RenewResponse::Renewed),
    glinr_acme::ManualRenewOutcome::Accepted { message } => {
      (axum::http::StatusCode::ACCEPTED, RenewResponse::Accepted { message })
    }
  };
  Ok((status, Json(body)))
}
