//! Free-function conversions from foreign error types to [`ApiError`].
//!
//! Neither `StoreError`, `glinr_dns::ProviderError`, `glinr_acme::AcmeError`
//! nor `glinr_proxy::ReloadError` is local to this crate, and neither is
//! `ApiError` — the orphan rule blocks a direct `impl From<..> for ApiError`
//! here, unlike `glinr_engine::EngineError` (local to `lib/engine`, which
//! depends on `glinr_response`). Call sites use `.map_err(store_err)?`
//! instead of `?` alone.

use glinr_acme::AcmeError;
use glinr_dns::ProviderError;
use glinr_proxy::ReloadError;
use glinr_response::{ApiError, Kind};
use glinr_store::StoreError;

pub fn store_err(e: StoreError) -> ApiError {
  match e {
    StoreError::NotFound(msg) => ApiError::not_found(msg),
    StoreError::Conflict(msg) => ApiError::conflict(msg),
    StoreError::Invariant(msg) => ApiError::validation(msg),
    StoreError::Timeout(d) => ApiError::timeout(format!("store operation timed out after {d:?}")),
    StoreError::Other(e) => ApiError::new(Kind::Internal, e),
  }
}

pub fn provider_err(e: ProviderError) -> ApiError {
  match e {
    ProviderError::Request(msg) => ApiError::upstream_unavailable(msg),
    ProviderError::Rejected(msg) => ApiError::upstream_unavailable(msg),
    ProviderError::Config(msg) => ApiError::validation(msg),
  }
}

pub fn acme_err(e: AcmeError) -> ApiError {
  match e {
    AcmeError::NotVerified => ApiError::validation("domain is not verified"),
    AcmeError::NoChallengeMethod => ApiError::validation("no challenge method available for domain"),
    AcmeError::Account(msg) | AcmeError::Order(msg) | AcmeError::Challenge(msg) => {
      ApiError::upstream_unavailable(msg)
    }
    AcmeError::KeyGen(msg) => ApiError::new(Kind::Internal, anyhow::anyhow!(msg)),
    AcmeError::Io(e) => ApiError::new(Kind::Internal, anyhow::Error::from(e)),
    AcmeError::Store(e) => store_err(e),
    AcmeError::Other(e) => ApiError::new(Kind::Internal, e),
  }
}

pub fn reload_err(e: ReloadError) -> ApiError {
  match e {
    ReloadError::Io(e) => ApiError::new(Kind::Internal, anyhow::Error::from(e)),
    ReloadError::ValidationFailed(msg) => ApiError::new(Kind::Internal, anyhow::anyhow!(msg)),
    ReloadError::ReloadFailed(msg) => ApiError::new(Kind::Internal, anyhow::anyhow!(msg)),
  }
}
