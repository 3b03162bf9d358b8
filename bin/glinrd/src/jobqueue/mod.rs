//! Background job queue (spec.md §4.6): an in-process FIFO with
//! Store-backed durability, typed dispatch per [`JobType`], and
//! exponential-backoff retry for transient failures.

use std::sync::Arc;
use std::time::Duration;

use glinr_response::{ApiError, ApiResult, Kind};
use glinr_store::entities::{Job, JobStatus, JobType};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::build;
use crate::domain;
use crate::error::{acme_err, store_err};
use crate::state;

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_START: Duration = Duration::from_secs(2);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// FIFO handle. Cloned senders feed a fixed pool of worker tasks spawned
/// at construction, mirroring the teacher's `tokio::spawn`-a-pool-at-
/// startup convention rather than spawning one task per job.
pub struct JobQueue {
  tx: mpsc::UnboundedSender<String>,
}

impl JobQueue {
  /// Spawns `workers` tasks draining a shared receiver (spec.md §4.6
  /// "bounded worker pool").
  pub fn spawn(workers: usize) -> Self {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let rx = Arc::new(Mutex::new(rx));
    for _ in 0..workers.max(1) {
      let rx = rx.clone();
      tokio::spawn(async move {
        loop {
          let next = rx.lock().await.recv().await;
          match next {
            Some(job_id) => run_job(job_id).await,
            None => break,
          }
        }
      });
    }
    Self { tx }
  }

  /// Enqueues a previously-created job row for execution. The job must
  /// already exist in the Store (spec.md §4.6: enqueue persists first,
  /// then notifies the worker pool).
  pub fn enqueue(&self, job_id: impl Into<String>) {
    let job_id = job_id.into();
    if self.tx.send(job_id.clone()).is_err() {
      warn!(job_id, "job queue worker pool is gone, job will not run");
    }
  }
}

fn is_retryable(err: &ApiError) -> bool {
  matches!(err.kind, Kind::UpstreamUnavailable | Kind::Timeout)
}

async fn run_job(job_id: String) {
  let store = state::store();
  let job = match store.get_job(&job_id).await {
    Ok(job) => job,
    Err(e) => {
      warn!(job_id, error = %e, "job vanished before it could run");
      return;
    }
  };

  let start_progress = if job.job_type == JobType::CertIssue { 10 } else { 0 };
  if let Err(e) = store
    .set_job_progress(&job_id, JobStatus::Running, start_progress)
    .await
  {
    warn!(job_id, error = %e, "failed to mark job running");
    return;
  }

  let mut delay = BACKOFF_START;
  for attempt in 1..=MAX_ATTEMPTS {
    match execute(&job).await {
      Ok(()) => {
        if job.job_type == JobType::CertIssue {
          let _ = store.set_job_progress(&job_id, JobStatus::Running, 90).await;
        }
        if let Err(e) = store.set_job_progress(&job_id, JobStatus::Succeeded, 100).await {
          warn!(job_id, error = %e, "failed to mark job succeeded");
        }
        return;
      }
      Err(err) if is_retryable(&err) && attempt < MAX_ATTEMPTS => {
        warn!(job_id, attempt, error = %err, "job failed, retrying");
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(BACKOFF_CAP);
      }
      Err(err) => {
        let _ = store.fail_job(&job_id, &err.to_string()).await;
        return;
      }
    }
  }
}

async fn execute(job: &Job) -> ApiResult<()> {
  match job.job_type {
    JobType::Build => execute_build(job).await,
    JobType::CertIssue => execute_cert_issue(job).await,
    JobType::CertRenew => execute_cert_renew(job).await,
  }
}

async fn execute_build(job: &Job) -> ApiResult<()> {
  let build_id = job
    .data
    .get("build_id")
    .and_then(|v| v.as_i64())
    .ok_or_else(|| ApiError::validation("build job is missing build_id"))?;

  let store = state::store();
  let record = store.get_build(build_id).await.map_err(store_err)?;
  match build::executor().build(&record).await {
    Ok(output) => {
      store
        .set_build_status(
          build_id,
          JobStatus::Succeeded,
          Some(&output.commit_sha),
          Some(&output.image_tag),
        )
        .await
        .map_err(store_err)?;
      Ok(())
    }
    Err(err) => {
      store
        .set_build_status(build_id, JobStatus::Failed, None, None)
        .await
        .map_err(store_err)?;
      Err(err)
    }
  }
}

async fn execute_cert_issue(job: &Job) -> ApiResult<()> {
  let domain_name = job
    .data
    .get("domain")
    .and_then(|v| v.as_str())
    .ok_or_else(|| ApiError::validation("cert_issue job is missing domain"))?;

  let pipeline = state::cert_pipeline()
    .ok_or_else(|| ApiError::upstream_unavailable("acme is not configured on this process"))?;
  let config = domain::resolve_domain_config(domain_name).await?;
  pipeline
    .issue_for_domain(domain_name, &config)
    .await
    .map_err(acme_err)
}

async fn execute_cert_renew(job: &Job) -> ApiResult<()> {
  let cert_id = job
    .data
    .get("cert_id")
    .and_then(|v| v.as_i64())
    .ok_or_else(|| ApiError::validation("cert_renew job is missing cert_id"))?;

  let store = state::store();
  let pipeline = state::cert_pipeline()
    .ok_or_else(|| ApiError::upstream_unavailable("acme is not configured on this process"))?;
  let cert = store.get_certificate(cert_id).await.map_err(store_err)?;
  let config = domain::resolve_domain_config(&cert.domain).await?;
  pipeline
    .manual_renew(cert_id, Some(&config))
    .await
    .map(|_| ())
    .map_err(acme_err)
}
