use thiserror::Error;

/// Store error taxonomy (spec.md §4.1).
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("{0} not found")]
  NotFound(String),
  #[error("conflict: {0}")]
  Conflict(String),
  #[error("invariant violation: {0}")]
  Invariant(String),
  #[error("store operation timed out after {0:?}")]
  Timeout(std::time::Duration),
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    match &e {
      rusqlite::Error::QueryReturnedNoRows => {
        StoreError::NotFound("row".to_string())
      }
      rusqlite::Error::SqliteFailure(err, msg) => {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
          StoreError::Conflict(
            msg.clone().unwrap_or_else(|| "unique violation".to_string()),
          )
        } else {
          StoreError::Other(anyhow::anyhow!(e.to_string()))
        }
      }
      _ => StoreError::Other(anyhow::anyhow!(e.to_string())),
    }
  }
}
