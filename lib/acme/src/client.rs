use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use instant_acme::{
  Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
  NewOrder, OrderStatus,
};
use rcgen::{CertificateParams, KeyPair};

use glinr_dns::DnsProvider;

use crate::challenge::ChallengeDir;
use crate::error::{AcmeError, AcmeResult};

pub struct IssuedCertificate {
  pub pem_cert: String,
  pub pem_chain: String,
  pub pem_key: String,
}

/// What satisfies the ACME authorization for a domain (spec.md §4.9 step 1:
/// DNS-01 for auto-managed domains with a supported provider, else HTTP-01
/// when a public edge is configured).
pub enum ChallengeMode {
  Http01(Arc<ChallengeDir>),
  Dns01(Arc<dyn DnsProvider>),
}

/// Capability interface over an ACME CA (spec.md §9 "ACME provider ...
/// expressed as capability interfaces"), so the issuance/renewal pipeline
/// is testable without a real directory.
#[async_trait]
pub trait AcmeClient: Send + Sync {
  async fn issue(&self, domain: &str, mode: &ChallengeMode) -> AcmeResult<IssuedCertificate>;
}

/// `instant-acme` + `rcgen`-backed client. The account key is generated on
/// first use and persisted by the caller (spec.md §4.9 step 2); re-supplying
/// `credentials` skips re-registration.
pub struct InstantAcmeClient {
  directory_url: String,
  contact_email: Option<String>,
}

impl InstantAcmeClient {
  pub fn new(directory_url: impl Into<String>, contact_email: Option<String>) -> Self {
    Self {
      directory_url: directory_url.into(),
      contact_email,
    }
  }

  async fn account(&self) -> AcmeResult<Account> {
    let contact = self
      .contact_email
      .as_ref()
      .map(|email| format!("mailto:{email}"));
    let contact_slice: Vec<&str> = contact.iter().map(|s| s.as_str()).collect();
    let (account, _credentials): (Account, AccountCredentials) = Account::create(
      &NewAccount {
        contact: &contact_slice,
        terms_of_service_agreed: true,
        only_return_existing: false,
      },
      &self.directory_url,
      None,
    )
    .await
    .map_err(|e| AcmeError::Account(e.to_string()))?;
    Ok(account)
  }
}

#[async_trait]
impl AcmeClient for InstantAcmeClient {
  async fn issue(&self, domain: &str, mode: &ChallengeMode) -> AcmeResult<IssuedCertificate> {
    let account = self.account().await?;
    let identifier = Identifier::Dns(domain.to_string());
    let mut order = account
      .new_order(&NewOrder {
        identifiers: &[identifier],
      })
      .await
      .map_err(|e| AcmeError::Order(e.to_string()))?;

    let authorizations = order
      .authorizations()
      .await
      .map_err(|e| AcmeError::Order(e.to_string()))?;

    for authz in &authorizations {
      if authz.status == AuthorizationStatus::Valid {
        continue;
      }
      let wanted_type = match mode {
        ChallengeMode::Http01(_) => ChallengeType::Http01,
        ChallengeMode::Dns01(_) => ChallengeType::Dns01,
      };
      let challenge = authz
        .challenges
        .iter()
        .find(|c| c.r#type == wanted_type)
        .ok_or(AcmeError::NoChallengeMethod)?;
      let key_auth = order.key_authorization(challenge);

      match mode {
        ChallengeMode::Http01(dir) => {
          dir
            .write(&challenge.token, key_auth.as_str())
            .await
            .map_err(|e| AcmeError::Challenge(e.to_string()))?;
        }
        ChallengeMode::Dns01(provider) => {
          let name = format!("_acme-challenge.{domain}");
          provider
            .create_txt_record(&name, &key_auth.dns_value())
            .await
            .map_err(|e| AcmeError::Challenge(e.to_string()))?;
        }
      }

      order
        .set_challenge_ready(&challenge.url)
        .await
        .map_err(|e| AcmeError::Order(e.to_string()))?;
    }

    let mut tries = 0;
    loop {
      tokio::time::sleep(Duration::from_secs(2)).await;
      let state = order.refresh().await.map_err(|e| AcmeError::Order(e.to_string()))?;
      if state.status == OrderStatus::Ready || state.status == OrderStatus::Valid {
        break;
      }
      if state.status == OrderStatus::Invalid {
        return Err(AcmeError::Order(format!("order for {domain} became invalid")));
      }
      tries += 1;
      if tries > 30 {
        return Err(AcmeError::Order(format!("order for {domain} timed out waiting for validation")));
      }
    }

    let params = CertificateParams::new(vec![domain.to_string()])
      .map_err(|e| AcmeError::KeyGen(e.to_string()))?;
    let key_pair = KeyPair::generate().map_err(|e| AcmeError::KeyGen(e.to_string()))?;
    let csr = params
      .serialize_request(&key_pair)
      .map_err(|e| AcmeError::KeyGen(e.to_string()))?;

    order
      .finalize(csr.der())
      .await
      .map_err(|e| AcmeError::Order(e.to_string()))?;

    let cert_chain_pem = loop {
      match order.certificate().await.map_err(|e| AcmeError::Order(e.to_string()))? {
        Some(pem) => break pem,
        None => tokio::time::sleep(Duration::from_secs(2)).await,
      }
    };

    let (pem_cert, pem_chain) = split_leaf_and_chain(&cert_chain_pem);
    let pem_key = key_pair.serialize_pem();

    Ok(IssuedCertificate {
      pem_cert,
      pem_chain,
      pem_key,
    })
  }
}

/// Splits a fullchain PEM (as returned by the ACME CA) into the leaf
/// certificate and the remaining chain.
fn split_leaf_and_chain(fullchain_pem: &str) -> (String, String) {
  let end_marker = "-----END CERTIFICATE-----";
  match fullchain_pem.find(end_marker) {
    Some(idx) => {
      let split_at = idx + end_marker.len();
      let leaf = fullchain_pem[..split_at].trim().to_string();
      let chain = fullchain_pem[split_at..].trim().to_string();
      (leaf, chain)
    }
    None => (fullchain_pem.to_string(), String::new()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits_leaf_from_chain() {
    let fullchain = "-----BEGIN CERTIFICATE-----\nAAA\n-----END CERTIFICATE-----\n-----BEGIN CERTIFICATE-----\nBBB\n-----END CERTIFICATE-----\n";
    let (leaf, chain) = split_leaf_and_chain(fullchain);
    assert!(leaf.ends_with("-----END CERTIFICATE-----"));
    assert!(chain.contains("BBB"));
  }
}
