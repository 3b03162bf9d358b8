//! Certificate pipeline (spec.md §4.9): ACME account/order/CSR flow,
//! encrypted-at-rest persistence, and the renewal scanner. Domain
//! verification itself lives in `glinr_dns`; this crate consumes a
//! verified [`glinr_store::entities::DomainVerification`] row as its
//! issuance precondition.

mod challenge;
mod client;
mod error;
mod pipeline;

pub use challenge::ChallengeDir;
pub use client::{AcmeClient, ChallengeMode, InstantAcmeClient, IssuedCertificate};
pub use error::{AcmeError, AcmeResult};
pub use pipeline::{CertificatePipeline, DomainConfig, ManualRenewOutcome};
