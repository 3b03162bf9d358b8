#[derive(Debug, thiserror::Error)]
pub enum AcmeError {
  #[error("domain is not verified")]
  NotVerified,
  #[error("no challenge method available for domain")]
  NoChallengeMethod,
  #[error("acme account error: {0}")]
  Account(String),
  #[error("acme order error: {0}")]
  Order(String),
  #[error("certificate key generation failed: {0}")]
  KeyGen(String),
  #[error("challenge provisioning failed: {0}")]
  Challenge(String),
  #[error("failed to write certificate files: {0}")]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Store(#[from] glinr_store::StoreError),
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

pub type AcmeResult<T> = Result<T, AcmeError>;
