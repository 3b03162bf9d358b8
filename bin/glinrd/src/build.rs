//! Build surface (SPEC_FULL.md §10): the `Build` row's CRUD and the
//! `build` job type's queue lifecycle are real; the step that would
//! invoke an actual image builder is a capability interface whose
//! production implementation is an external collaborator this control
//! plane does not ship.

use std::sync::OnceLock;

use async_trait::async_trait;
use glinr_response::{ApiError, ApiResult};
use glinr_store::entities::Build;

pub struct BuildOutput {
  pub commit_sha: String,
  pub image_tag: String,
}

#[async_trait]
pub trait BuildExecutor: Send + Sync {
  async fn build(&self, build: &Build) -> ApiResult<BuildOutput>;
}

struct NotImplementedExecutor;

#[async_trait]
impl BuildExecutor for NotImplementedExecutor {
  async fn build(&self, _build: &Build) -> ApiResult<BuildOutput> {
    Err(ApiError::not_implemented(
      "image builds are not implemented by this control plane",
    ))
  }
}

/// Lazily defaults to the not-implemented executor, the way
/// [`crate::state::network_fabric`] and friends derive from other
/// process-global singletons rather than requiring an explicit init call.
pub fn executor() -> &'static dyn BuildExecutor {
  static EXECUTOR: OnceLock<Box<dyn BuildExecutor>> = OnceLock::new();
  EXECUTOR
    .get_or_init(|| Box::new(NotImplementedExecutor))
    .as_ref()
}

#[cfg(test)]
mod tests {
  use super::*;
  use glinr_store::entities::JobStatus;

  fn sample_build() -> Build {
    Build {
      id: 1,
      project_id: 1,
      service_id: 0,
      git_url: "https://example.com/repo.git".to_string(),
      git_ref: "main".to_string(),
      commit_sha: None,
      image_tag: None,
      context_path: ".".to_string(),
      dockerfile: "Dockerfile".to_string(),
      status: JobStatus::Running,
      triggered_by: "admin".to_string(),
      created_at: 0,
      updated_at: 0,
    }
  }

  #[tokio::test]
  async fn default_executor_is_not_implemented() {
    let err = executor().build(&sample_build()).await.unwrap_err();
    assert_eq!(err.kind, glinr_response::Kind::NotImplemented);
  }
}
