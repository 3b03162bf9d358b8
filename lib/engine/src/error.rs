use glinr_response::{ApiError, Kind};

/// Failure taxonomy for the container engine adapter (spec.md §4.2): every
/// engine error carries the underlying message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("not found: {0}")]
  NotFound(String),
  #[error("conflict: {0}")]
  Conflict(String),
  #[error("timeout: {0}")]
  Timeout(String),
  #[error("engine unavailable: {0}")]
  Unavailable(String),
  #[error("engine error: {0}")]
  Other(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<bollard::errors::Error> for EngineError {
  fn from(err: bollard::errors::Error) -> Self {
    match &err {
      bollard::errors::Error::DockerResponseServerError { status_code, message } => {
        match *status_code {
          404 => EngineError::NotFound(message.clone()),
          409 => EngineError::Conflict(message.clone()),
          _ => EngineError::Other(err.to_string()),
        }
      }
      bollard::errors::Error::RequestTimeoutError => {
        EngineError::Timeout(err.to_string())
      }
      _ => EngineError::Other(err.to_string()),
    }
  }
}

impl From<EngineError> for ApiError {
  fn from(err: EngineError) -> Self {
    match err {
      EngineError::NotFound(msg) => ApiError::not_found(msg),
      EngineError::Conflict(msg) => ApiError::conflict(msg),
      EngineError::Timeout(msg) => ApiError::timeout(msg),
      EngineError::Unavailable(msg) => ApiError::upstream_unavailable(msg),
      EngineError::Other(msg) => ApiError::new(Kind::Internal, anyhow::anyhow!(msg)),
    }
  }
}
